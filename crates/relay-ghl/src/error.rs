//! Error types for relay-ghl

use thiserror::Error;

/// relay-ghl error type
///
/// Raised while building the client; API calls report
/// `relay_core::CrmError`.
#[derive(Error, Debug)]
pub enum GhlError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, GhlError>;
