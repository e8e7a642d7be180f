//! Error types for relay-sync

use relay_core::ProviderError;
use thiserror::Error;

/// Errors surfaced to callers of the engine
///
/// CRM failures never appear here; they are folded into `SyncResult`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Invalid request: {0}")]
    Caller(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SyncError>;
