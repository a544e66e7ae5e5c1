//! Error types for the RetroWeb gate.

use thiserror::Error;

/// Main error type for gate operations.
///
/// Admission checks never fail; these errors come from setup (configuration,
/// policy validation) and from the HTTP server itself.
#[derive(Error, Debug)]
pub enum GateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rate limit policy with a zero quota, zero window or empty name
    #[error("Invalid rate limit policy: {0}")]
    InvalidPolicy(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for GateError {
    fn from(err: config::ConfigError) -> Self {
        GateError::Config(err.to_string())
    }
}

/// Result type alias for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;
