//! Axum middleware that admits or rejects requests before they reach handlers.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use ipnet::IpNet;
use parking_lot::RwLock;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, warn};

use super::headers::{apply_quota_headers, rate_limited_response};
use crate::ratelimit::{PolicySet, RateLimiter};

/// Identifier used when a request carries no client address at all.
pub const ANONYMOUS_IDENTIFIER: &str = "anonymous";

/// Shared state for the rate limit middleware.
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<RateLimiter>,
    rules: Arc<RwLock<PolicySet>>,
    trusted_proxies: Arc<[IpNet]>,
}

impl RateLimitState {
    pub fn new(limiter: Arc<RateLimiter>, rules: PolicySet) -> Self {
        Self {
            limiter,
            rules: Arc::new(RwLock::new(rules)),
            trusted_proxies: Arc::from(Vec::new()),
        }
    }

    /// Honour forwarding headers from peers inside these networks.
    pub fn with_trusted_proxies(mut self, proxies: Vec<IpNet>) -> Self {
        self.trusted_proxies = Arc::from(proxies);
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn trusted_proxies(&self) -> &[IpNet] {
        &self.trusted_proxies
    }

    /// Snapshot of the current rules.
    pub fn rules(&self) -> PolicySet {
        self.rules.read().clone()
    }

    /// Replace the rules. Existing windows keep counting under their policy name.
    pub fn set_rules(&self, rules: PolicySet) {
        *self.rules.write() = rules;
    }

    pub(crate) fn with_rules<T>(&self, f: impl FnOnce(&PolicySet) -> T) -> T {
        f(&self.rules.read())
    }
}

fn is_trusted(ip: &IpAddr, trusted_proxies: &[IpNet]) -> bool {
    trusted_proxies.iter().any(|net| net.contains(ip))
}

/// Work out who is calling.
///
/// Forwarding headers are only believed when the connection itself comes from
/// a trusted proxy. In that case the client is the nearest `X-Forwarded-For`
/// hop that is not a trusted proxy, then `X-Real-IP`. Everyone else is keyed
/// on the peer address, so rotating the headers gains nothing.
pub fn client_identifier(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_proxies: &[IpNet],
) -> String {
    let Some(peer) = peer.map(|addr| addr.ip()) else {
        return ANONYMOUS_IDENTIFIER.to_string();
    };
    if !is_trusted(&peer, trusted_proxies) {
        return peer.to_string();
    }

    forwarded_client(headers, trusted_proxies)
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<IpAddr>().ok())
        })
        .unwrap_or(peer)
        .to_string()
}

/// Walk `X-Forwarded-For` from the nearest hop outwards, skipping our own proxies.
/// A malformed entry makes the whole header untrustworthy.
fn forwarded_client(headers: &HeaderMap, trusted_proxies: &[IpNet]) -> Option<IpAddr> {
    let value = headers.get("x-forwarded-for")?.to_str().ok()?;
    let hops = value
        .split(',')
        .map(|hop| hop.trim().parse::<IpAddr>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    hops.iter()
        .rev()
        .find(|hop| !is_trusted(hop, trusted_proxies))
        .or_else(|| hops.first())
        .copied()
}

/// Rate limit every request passing through.
///
/// Install with `axum::middleware::from_fn_with_state(state, rate_limit)`.
/// Rejected requests get a 429 and never reach the inner service; admitted
/// ones get the quota headers added to whatever the inner service returns.
pub async fn rate_limit(State(state): State<RateLimitState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identifier = client_identifier(request.headers(), peer, state.trusted_proxies());
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();

    let decision = state.with_rules(|rules| {
        let policy = rules.resolve(&method, &path);
        state.limiter.check(&identifier, policy)
    });

    if !decision.allowed {
        warn!(
            identifier = %identifier,
            method = %method,
            path = %path,
            reset_at_ms = decision.reset_at_ms,
            "Rejecting rate limited request"
        );
        return rate_limited_response(&decision, state.limiter.now_ms());
    }

    debug!(
        identifier = %identifier,
        remaining = decision.remaining,
        "Request admitted"
    );

    let mut response = next.run(request).await;
    apply_quota_headers(response.headers_mut(), &decision);
    response
}
