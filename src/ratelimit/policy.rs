//! Rate limit policies.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{GateError, Result};

/// A named quota: at most `max_requests` per `window_ms` milliseconds.
///
/// Policies are validated on construction, so a `Policy` in hand always has a
/// non-empty name and a positive quota and window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy")]
pub struct Policy {
    name: String,
    max_requests: u32,
    window_ms: u64,
}

/// Unvalidated form used for deserialization.
#[derive(Debug, Deserialize)]
struct RawPolicy {
    name: String,
    max_requests: u32,
    window_ms: u64,
}

impl TryFrom<RawPolicy> for Policy {
    type Error = GateError;

    fn try_from(raw: RawPolicy) -> Result<Self> {
        Policy::new(raw.name, raw.max_requests, raw.window_ms)
    }
}

impl Policy {
    /// Create a new policy.
    pub fn new(name: impl Into<String>, max_requests: u32, window_ms: u64) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(GateError::InvalidPolicy("policy name must not be empty".to_string()));
        }
        if max_requests == 0 {
            return Err(GateError::InvalidPolicy(format!(
                "policy '{}': max_requests must be greater than zero",
                name
            )));
        }
        if window_ms == 0 {
            return Err(GateError::InvalidPolicy(format!(
                "policy '{}': window_ms must be greater than zero",
                name
            )));
        }
        Ok(Self {
            name,
            max_requests,
            window_ms,
        })
    }

    /// Create a policy with a window of `window`, truncated to whole milliseconds.
    pub fn with_window(name: impl Into<String>, max_requests: u32, window: Duration) -> Result<Self> {
        let name = name.into();
        let window_ms = u64::try_from(window.as_millis()).map_err(|_| {
            GateError::InvalidPolicy(format!("policy '{}': window of {:?} is too long", name, window))
        })?;
        Self::new(name, max_requests, window_ms)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Quota per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}/{}ms)", self.name, self.max_requests, self.window_ms)
    }
}
