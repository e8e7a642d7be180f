//! Error types for relay-api

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use relay_core::ProviderError;
use relay_sync::SyncError;

/// relay-api error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication failed")]
    AuthFailed,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;

/// Error body returned by the send and status endpoints
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AuthFailed => StatusCode::UNAUTHORIZED,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Sync(SyncError::Caller(_)) => StatusCode::BAD_REQUEST,
            ApiError::Sync(SyncError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Sync(SyncError::Provider(e)) => provider_status(e),
        }
    }

    fn kind(&self) -> Option<&'static str> {
        match self {
            ApiError::Sync(SyncError::Provider(e)) => Some(e.kind()),
            _ => None,
        }
    }
}

fn provider_status(error: &ProviderError) -> StatusCode {
    match error {
        ProviderError::InvalidRecipient(_) | ProviderError::MediaRejected(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ProviderError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        ProviderError::Network(_) => StatusCode::GATEWAY_TIMEOUT,
        ProviderError::AuthFailure(_) | ProviderError::NotFound(_) | ProviderError::Unknown(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            kind: self.kind(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
