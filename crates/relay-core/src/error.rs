//! Error types for relay-core
//!
//! `Error` covers configuration and startup problems. `ProviderError` and
//! `CrmError` are the failure taxonomies of the two gateway traits and are
//! shared by every crate that talks to them.

use thiserror::Error;

/// Main error type for relay-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for relay-core
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by the SMS/MMS provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider authentication failed: {0}")]
    AuthFailure(String),

    #[error("Provider rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Media rejected: {0}")]
    MediaRejected(String),

    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Provider network error: {0}")]
    Network(String),

    #[error("Provider error: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Stable label used in API responses and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthFailure(_) => "auth_failure",
            Self::RateLimited(_) => "rate_limited",
            Self::InvalidRecipient(_) => "invalid_recipient",
            Self::MediaRejected(_) => "media_rejected",
            Self::NotFound(_) => "not_found",
            Self::Network(_) => "network",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Failure reported by the CRM
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrmError {
    #[error("CRM unavailable: {0}")]
    Unavailable(String),

    #[error("CRM rejected credentials: {0}")]
    Unauthorized(String),

    #[error("CRM validation error: {0}")]
    Validation(String),

    #[error("Campaign not found: {0}")]
    CampaignNotFound(String),

    #[error("No CRM location available")]
    NoLocation,

    #[error("Unexpected CRM response: {0}")]
    InvalidResponse(String),
}

/// Result alias for provider calls
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Result alias for CRM calls
pub type CrmResult<T> = std::result::Result<T, CrmError>;
