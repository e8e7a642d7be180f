//! Error types for relay-tallbob

use thiserror::Error;

/// relay-tallbob error type
///
/// Raised while building the client or parsing webhook bodies; API calls
/// report `relay_core::ProviderError`.
#[derive(Error, Debug)]
pub enum TallBobError {
    #[error("Tall Bob credentials not set")]
    CredentialsNotSet,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid webhook payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TallBobError>;
