//! Wire types for the LeadConnector API

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct GhlLocation {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LocationsResponse {
    #[serde(default)]
    pub locations: Vec<GhlLocation>,
}

/// Custom field entries use snake_case `field_value` on the wire
#[derive(Debug, Serialize)]
pub struct CustomFieldValue {
    pub key: String,
    pub field_value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertContactRequest {
    pub location_id: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_fields: Vec<CustomFieldValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GhlContact {
    pub id: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertContactResponse {
    /// `true` when the upsert created the contact
    #[serde(rename = "new", default)]
    pub created: bool,
    pub contact: GhlContact,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhlConversation {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchConversationsResponse {
    #[serde(default)]
    pub conversations: Vec<GhlConversation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub location_id: String,
    pub contact_id: String,
}

/// Create responses come either wrapped (`{"conversation": {...}}`) or flat
#[derive(Debug, Deserialize)]
pub struct CreateConversationResponse {
    #[serde(default)]
    pub conversation: Option<GhlConversation>,
    #[serde(default)]
    pub id: Option<String>,
}

impl CreateConversationResponse {
    pub fn conversation_id(self) -> Option<String> {
        self.conversation.map(|c| c.id).or(self.id)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    pub message: String,
    pub attachments: Vec<String>,
    pub direction: String,
    /// Provider message ID, stored as the CRM's external reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}
