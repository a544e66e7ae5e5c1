//! Table keys.

/// A key that uniquely identifies a tracked window.
///
/// Keys combine the policy name with the caller identifier, so a client hitting
/// two differently limited routes gets an independent counter for each.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey {
    /// Name of the policy the window belongs to
    pub policy: String,
    /// Caller identifier, typically a client address
    pub identifier: String,
}

impl LimitKey {
    pub fn new(policy: &str, identifier: &str) -> Self {
        Self {
            policy: policy.to_string(),
            identifier: identifier.to_string(),
        }
    }
}

impl std::fmt::Display for LimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.policy, self.identifier)
    }
}
