//! Data model shared by the gateways and the sync engine

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ============================================================================
// Outbound
// ============================================================================

/// Validated outbound send request
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundSendRequest {
    pub to: String,
    pub from: String,
    pub body: String,
    pub media_url: Option<String>,
    /// MMS subject line (ignored for SMS)
    pub subject: Option<String>,
    pub location_id: Option<String>,
    pub contact_id: Option<String>,
    pub add_to_campaign: bool,
    pub campaign_id: Option<String>,
    /// Correlation token forwarded to the provider unchanged
    pub reference: Option<String>,
}

impl OutboundSendRequest {
    /// Minimal request with the three required fields
    pub fn new(to: impl Into<String>, from: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            from: from.into(),
            body: body.into(),
            media_url: None,
            subject: None,
            location_id: None,
            contact_id: None,
            add_to_campaign: false,
            campaign_id: None,
            reference: None,
        }
    }

    pub fn with_media_url(mut self, media_url: impl Into<String>) -> Self {
        self.media_url = Some(media_url.into());
        self
    }

    pub fn with_location(mut self, location_id: impl Into<String>) -> Self {
        self.location_id = Some(location_id.into());
        self
    }

    pub fn with_contact(mut self, contact_id: impl Into<String>) -> Self {
        self.contact_id = Some(contact_id.into());
        self
    }

    pub fn with_campaign(mut self, campaign_id: impl Into<String>) -> Self {
        self.add_to_campaign = true;
        self.campaign_id = Some(campaign_id.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// MMS when a media URL is present, SMS otherwise
    pub fn message_type(&self) -> MessageType {
        if self.media_url.is_some() {
            MessageType::Mms
        } else {
            MessageType::Sms
        }
    }
}

/// Result of a provider send; immutable once returned
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderMessageResult {
    pub provider_message_id: String,
    pub provider_status: Option<String>,
    pub raw: JsonValue,
}

/// Provider-side status of a previously sent message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageStatus {
    pub status: String,
    pub delivered_at: Option<String>,
    pub raw: JsonValue,
}

// ============================================================================
// Inbound
// ============================================================================

/// Provider webhook event type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEventType {
    /// `message_received_sms`
    ReceivedSms,
    /// `message_received_mms`
    ReceivedMms,
    /// Any other event type, acknowledged without processing
    Other(String),
}

impl InboundEventType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "message_received_sms" => Self::ReceivedSms,
            "message_received_mms" => Self::ReceivedMms,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ReceivedSms => "message_received_sms",
            Self::ReceivedMms => "message_received_mms",
            Self::Other(raw) => raw,
        }
    }

    /// Only received messages are projected into the CRM
    pub fn is_message_received(&self) -> bool {
        matches!(self, Self::ReceivedSms | Self::ReceivedMms)
    }
}

/// Event delivered by a provider webhook
#[derive(Debug, Clone, PartialEq)]
pub enum InboundWebhookEvent {
    MessageReceived {
        event_type: InboundEventType,
        from: String,
        to: String,
        body: String,
        media: Vec<String>,
        received_at: Option<String>,
    },
    DeliveryReceipt {
        provider_message_id: String,
        status: DeliveryStatus,
        timestamp: Option<String>,
    },
}

/// Delivery status carried by a receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Undeliverable,
    Other(String),
}

impl DeliveryStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "delivered" => Self::Delivered,
            "undeliverable" | "undelivered" | "failed" => Self::Undeliverable,
            _ => Self::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Delivered => "delivered",
            Self::Undeliverable => "undeliverable",
            Self::Other(raw) => raw,
        }
    }

    /// Terminal statuses are final; nothing polls for later transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Undeliverable)
    }
}

// ============================================================================
// CRM
// ============================================================================

/// A CRM location (sub-account)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A CRM contact as seen by this relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmContact {
    pub id: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
}

/// Whether an upsert created a contact or matched an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Created,
    Found,
}

/// Outcome of `CrmGateway::upsert_contact`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactUpsert {
    pub contact: CrmContact,
    pub action: UpsertAction,
}

/// Custom field written on contact upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomField {
    pub key: String,
    pub value: String,
}

impl CustomField {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Conversation channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    #[serde(rename = "SMS")]
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "SMS",
        }
    }
}

/// Transient handle on a CRM contact's conversation
///
/// Lives for one request only; the CRM is the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrmConversationRef {
    pub contact_id: String,
    pub conversation_id: String,
    pub location_id: String,
}

/// Where an appended message goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationTarget {
    Conversation(CrmConversationRef),
    Contact { contact_id: String, location_id: String },
}

impl ConversationTarget {
    pub fn contact_id(&self) -> &str {
        match self {
            Self::Conversation(conversation) => &conversation.contact_id,
            Self::Contact { contact_id, .. } => contact_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageType {
    #[serde(rename = "SMS")]
    Sms,
    #[serde(rename = "MMS")]
    Mms,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "SMS",
            Self::Mms => "MMS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Message appended to a CRM conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrmMessage {
    pub body: String,
    pub message_type: MessageType,
    pub media_urls: Vec<String>,
    pub direction: Direction,
    pub provider_message_id: Option<String>,
    pub timestamp: Option<String>,
}
