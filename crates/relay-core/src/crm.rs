//! CRM gateway trait

use async_trait::async_trait;

use crate::error::CrmResult;
use crate::model::{
    Channel, ContactUpsert, ConversationTarget, CrmConversationRef, CrmMessage, CustomField,
    LocationRef,
};
use crate::phone::NormalizedPhoneNumber;

/// CRM gateway
///
/// `upsert_contact` must be backed by the CRM's own atomic
/// find-or-create primitive: concurrent calls for the same
/// (phone, location) pair never yield two contacts.
#[async_trait]
pub trait CrmGateway: Send + Sync {
    /// List the locations visible to the configured credentials
    async fn list_locations(&self) -> CrmResult<Vec<LocationRef>>;

    /// Find or create the contact for a phone number within a location
    async fn upsert_contact(
        &self,
        phone: &NormalizedPhoneNumber,
        location_id: &str,
        custom_fields: &[CustomField],
    ) -> CrmResult<ContactUpsert>;

    /// Idempotent per (contact, location, channel)
    async fn create_or_get_conversation(
        &self,
        contact_id: &str,
        location_id: &str,
        channel: Channel,
    ) -> CrmResult<CrmConversationRef>;

    /// Append a message to a conversation
    async fn append_message(&self, target: &ConversationTarget, message: &CrmMessage) -> CrmResult<()>;

    /// Enroll a contact in a campaign
    async fn add_to_campaign(&self, contact_id: &str, campaign_id: &str, location_id: &str) -> CrmResult<()>;
}
