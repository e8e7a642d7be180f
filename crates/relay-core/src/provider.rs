//! SMS/MMS provider gateway trait
//!
//! Implemented by `relay-tallbob` for the real provider and by
//! `testing::FakeProvider` in tests.

use async_trait::async_trait;

use crate::error::ProviderResult;
use crate::model::{MessageStatus, ProviderMessageResult};

/// Outbound SMS to the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsSend {
    pub to: String,
    pub from: String,
    pub body: String,
    /// Correlation token, forwarded unchanged so retries are detectable provider-side
    pub reference: String,
}

/// Outbound MMS to the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmsSend {
    pub to: String,
    pub from: String,
    pub body: String,
    pub media_url: String,
    pub subject: Option<String>,
    pub reference: String,
}

/// Provider gateway
///
/// Owns provider authentication and request/response logging. Calls are
/// bounded by the client's configured timeout; a timeout surfaces as
/// `ProviderError::Network` and is never retried here.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Send an SMS
    async fn send_sms(&self, message: &SmsSend) -> ProviderResult<ProviderMessageResult>;

    /// Send an MMS; fails with `MediaRejected` when the media URL is refused
    async fn send_mms(&self, message: &MmsSend) -> ProviderResult<ProviderMessageResult>;

    /// Look up a message; fails with `NotFound` for unknown IDs
    async fn get_message_status(&self, provider_message_id: &str) -> ProviderResult<MessageStatus>;

    /// Register a webhook target
    ///
    /// Registering the same URL and events twice must succeed.
    async fn register_webhook(&self, callback_url: &str, event_types: &[String]) -> ProviderResult<()>;
}
