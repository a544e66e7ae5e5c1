//! Rate limit policy rules and route matching.
//!
//! This module loads the named policies and maps each request's method and
//! path to one of them, so expensive or mutating routes can carry a stricter
//! quota than general reads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::policy::Policy;
use crate::error::{GateError, Result};

/// Raw rules document as it appears on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesDocument {
    /// Policy applied when no route matches
    pub default_policy: String,
    /// Named policies
    pub policies: Vec<Policy>,
    /// Route rules, in priority order for equally specific matches
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

/// Routes requests under a path prefix to a named policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    /// Path prefix to match, on segment boundaries
    pub path_prefix: String,
    /// HTTP methods to match (if empty, matches any method)
    #[serde(default)]
    pub methods: Vec<String>,
    /// Name of the policy to apply
    pub policy: String,
}

impl RouteRule {
    fn matches(&self, method: &str, path: &str) -> bool {
        let method_matches =
            self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method));

        method_matches && prefix_matches(&self.path_prefix, path)
    }
}

/// `/api` matches `/api` and `/api/chat` but not `/apiary`.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// A validated set of policies plus the routes that select between them.
#[derive(Debug, Clone)]
pub struct PolicySet {
    policies: HashMap<String, Policy>,
    default_policy: String,
    routes: Vec<RouteRule>,
}

impl PolicySet {
    /// Build a policy set, checking every policy reference.
    pub fn new(document: RulesDocument) -> Result<Self> {
        let mut policies = HashMap::with_capacity(document.policies.len());
        for policy in document.policies {
            let name = policy.name().to_string();
            if policies.insert(name.clone(), policy).is_some() {
                return Err(GateError::Config(format!("duplicate policy '{}'", name)));
            }
        }

        if !policies.contains_key(&document.default_policy) {
            return Err(GateError::Config(format!(
                "default policy '{}' is not defined",
                document.default_policy
            )));
        }

        for route in &document.routes {
            if !policies.contains_key(&route.policy) {
                return Err(GateError::Config(format!(
                    "route '{}' references undefined policy '{}'",
                    route.path_prefix, route.policy
                )));
            }
        }

        Ok(Self {
            policies,
            default_policy: document.default_policy,
            routes: document.routes,
        })
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit policies");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let document: RulesDocument = serde_yaml::from_str(yaml)
            .map_err(|e| GateError::Config(format!("Failed to parse rate limit policies: {}", e)))?;
        Self::new(document)
    }

    /// Look up a policy by name.
    pub fn get(&self, name: &str) -> Option<&Policy> {
        self.policies.get(name)
    }

    /// The fallback policy.
    pub fn default_policy(&self) -> &Policy {
        // Presence is checked in `new`.
        &self.policies[&self.default_policy]
    }

    /// Number of named policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Pick the policy for a request.
    ///
    /// The longest matching prefix wins. Among equally long prefixes a rule
    /// that lists methods beats one that does not, then earlier rules win.
    pub fn resolve(&self, method: &str, path: &str) -> &Policy {
        let mut best: Option<(&RouteRule, (usize, bool))> = None;

        for route in self.routes.iter().filter(|r| r.matches(method, path)) {
            let rank = (
                route.path_prefix.trim_end_matches('/').len(),
                !route.methods.is_empty(),
            );
            match best {
                Some((_, best_rank)) if best_rank >= rank => {}
                _ => best = Some((route, rank)),
            }
        }

        best.and_then(|(route, _)| self.policies.get(&route.policy))
            .unwrap_or_else(|| self.default_policy())
    }
}

impl Default for PolicySet {
    /// General API traffic gets 100 requests a minute, chat generation 20 and
    /// mutating methods 30.
    fn default() -> Self {
        let minute = 60_000;
        let policies = [("api", 100), ("chat", 20), ("mutation", 30)]
            .into_iter()
            .map(|(name, max)| (name.to_string(), builtin(name, max, minute)))
            .collect();

        Self {
            policies,
            default_policy: "api".to_string(),
            routes: vec![
                RouteRule {
                    path_prefix: "/api/chat".to_string(),
                    methods: Vec::new(),
                    policy: "chat".to_string(),
                },
                RouteRule {
                    path_prefix: "/api".to_string(),
                    methods: ["POST", "PUT", "PATCH", "DELETE"]
                        .iter()
                        .map(|m| m.to_string())
                        .collect(),
                    policy: "mutation".to_string(),
                },
            ],
        }
    }
}

fn builtin(name: &str, max_requests: u32, window_ms: u64) -> Policy {
    match Policy::new(name, max_requests, window_ms) {
        Ok(policy) => policy,
        Err(e) => unreachable!("built-in policy is valid: {}", e),
    }
}
