//! Authentication middleware
//!
//! Bearer API key for the send and status endpoints. Webhook receivers
//! are not behind it.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ApiError;
use crate::server::AppState;

/// API key authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if validate_api_key(provided, state.api_key.as_deref()) {
        Ok(next.run(request).await)
    } else {
        warn!(path = %request.uri().path(), "Rejected request without a valid API key");
        Err(ApiError::AuthFailed)
    }
}

/// No configured key means the endpoints are open
pub fn validate_api_key(provided: Option<&str>, expected: Option<&str>) -> bool {
    match (provided, expected) {
        (Some(p), Some(e)) => p == e,
        (_, None) => true,
        (None, Some(_)) => false,
    }
}
