//! Admission service endpoints.
//!
//! Lets an upstream HTTP layer ask for a decision over the network instead of
//! embedding the middleware: `POST /v1/ratelimit` returns the decision and the
//! same headers the middleware would set.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::headers::apply_quota_headers;
use super::middleware::RateLimitState;
use crate::ratelimit::Decision;

/// Body of an admission request.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckRequest {
    /// Caller identifier, typically the client address
    pub identifier: String,
    /// Policy to apply by name; takes precedence over `method`/`path`
    #[serde(default)]
    pub policy: Option<String>,
    /// Request method used for route matching
    #[serde(default)]
    pub method: Option<String>,
    /// Request path used for route matching
    #[serde(default)]
    pub path: Option<String>,
}

/// Body of an admission response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    #[serde(flatten)]
    pub decision: Decision,
    /// Name of the policy that was applied
    pub policy: String,
    /// Seconds until the window resets
    pub retry_after: u64,
}

/// Errors returned by the admission endpoint.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    UnknownPolicy(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::UnknownPolicy(name) => {
                (StatusCode::NOT_FOUND, format!("unknown policy '{}'", name))
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Build the admission service router.
pub fn router(state: RateLimitState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/ratelimit", post(check))
        .with_state(state)
}

async fn health(State(state): State<RateLimitState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "trackedKeys": state.limiter().len(),
    }))
}

async fn check(
    State(state): State<RateLimitState>,
    Json(req): Json<CheckRequest>,
) -> Result<Response, ApiError> {
    if req.identifier.trim().is_empty() {
        warn!("Received rate limit request with empty identifier");
        return Err(ApiError::BadRequest("identifier is required".to_string()));
    }

    let (decision, policy) = state.with_rules(|rules| {
        let policy = match &req.policy {
            Some(name) => rules
                .get(name)
                .ok_or_else(|| ApiError::UnknownPolicy(name.clone()))?,
            None => rules.resolve(
                req.method.as_deref().unwrap_or("GET"),
                req.path.as_deref().unwrap_or("/"),
            ),
        };
        let decision = state.limiter().check(&req.identifier, policy);
        Ok::<_, ApiError>((decision, policy.name().to_string()))
    })?;

    info!(
        identifier = %req.identifier,
        policy = %policy,
        allowed = decision.allowed,
        remaining = decision.remaining,
        "Rate limit decision made"
    );

    let retry_after = decision.retry_after_secs(state.limiter().now_ms());
    let status = if decision.allowed {
        StatusCode::OK
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };
    let body = CheckResponse {
        decision,
        policy,
        retry_after,
    };

    let mut response = (status, Json(body)).into_response();
    apply_quota_headers(response.headers_mut(), &decision);
    if !decision.allowed {
        response
            .headers_mut()
            .insert(axum::http::header::RETRY_AFTER, retry_after.into());
    }
    Ok(response)
}
