//! Tall Bob webhook payloads
//!
//! Converts raw webhook bodies into `relay_core::InboundWebhookEvent`.
//! Fields the provider omits default to empty so a sparse payload still
//! reaches the engine, which decides whether it can act on it.

use serde::Deserialize;

use relay_core::{DeliveryStatus, InboundEventType, InboundWebhookEvent};

use crate::error::Result;

/// Message-received webhook body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingPayload {
    #[serde(rename = "type", alias = "eventType", default)]
    pub event_type: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default, alias = "message")]
    pub body: String,
    #[serde(default)]
    pub media: Option<Vec<String>>,
    #[serde(default)]
    pub received_at: Option<String>,
}

impl From<IncomingPayload> for InboundWebhookEvent {
    fn from(payload: IncomingPayload) -> Self {
        InboundWebhookEvent::MessageReceived {
            event_type: InboundEventType::parse(&payload.event_type),
            from: payload.from,
            to: payload.to,
            body: payload.body,
            media: payload.media.unwrap_or_default(),
            received_at: payload.received_at,
        }
    }
}

/// Delivery receipt body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPayload {
    #[serde(alias = "messageId", alias = "message_id", alias = "id", default)]
    pub provider_message_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl From<DeliveryPayload> for InboundWebhookEvent {
    fn from(payload: DeliveryPayload) -> Self {
        InboundWebhookEvent::DeliveryReceipt {
            provider_message_id: payload.provider_message_id,
            status: DeliveryStatus::parse(&payload.status),
            timestamp: payload.timestamp,
        }
    }
}

/// Parse a message-received webhook body
pub fn parse_incoming(body: &[u8]) -> Result<InboundWebhookEvent> {
    let payload: IncomingPayload = serde_json::from_slice(body)?;
    Ok(payload.into())
}

/// Parse a delivery receipt body
pub fn parse_delivery(body: &[u8]) -> Result<InboundWebhookEvent> {
    let payload: DeliveryPayload = serde_json::from_slice(body)?;
    Ok(payload.into())
}
