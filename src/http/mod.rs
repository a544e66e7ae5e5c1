//! HTTP integration: middleware, admission service and server.

mod headers;
mod middleware;
mod server;
mod service;

pub use headers::{
    apply_quota_headers, rate_limited_response, RATE_LIMITED_MESSAGE, X_RATELIMIT_LIMIT,
    X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use middleware::{client_identifier, rate_limit, RateLimitState, ANONYMOUS_IDENTIFIER};
pub use server::HttpServer;
pub use service::{router, ApiError, CheckRequest, CheckResponse};
