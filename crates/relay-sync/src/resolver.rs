//! Phone number to CRM conversation resolution

use std::sync::Arc;

use tracing::{debug, info};

use relay_core::{
    Channel, CrmConversationRef, CrmError, CrmGateway, CrmResult, CustomField,
    NormalizedPhoneNumber, UpsertAction,
};

/// A contact/conversation pair obtained for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContact {
    pub phone: NormalizedPhoneNumber,
    pub conversation: CrmConversationRef,
    pub action: UpsertAction,
}

/// Maps a normalized phone number to exactly one CRM contact and conversation
///
/// Nothing is cached between calls; the CRM stays the source of truth.
#[derive(Clone)]
pub struct ContactResolver {
    crm: Arc<dyn CrmGateway>,
    location_ids: Vec<String>,
}

impl ContactResolver {
    /// `location_ids` is the preferred location order; empty means
    /// "ask the CRM"
    pub fn new(crm: Arc<dyn CrmGateway>, location_ids: Vec<String>) -> Self {
        Self { crm, location_ids }
    }

    /// Pick the location for a message that did not name one
    ///
    /// The first configured id wins. Without configuration the CRM listing
    /// is sorted by id so the choice does not depend on listing order.
    pub async fn select_location(&self) -> CrmResult<String> {
        if let Some(id) = self.location_ids.first() {
            return Ok(id.clone());
        }

        let mut locations = self.crm.list_locations().await?;
        locations.sort_by(|a, b| a.id.cmp(&b.id));

        if locations.len() > 1 {
            debug!(
                "{} CRM locations available, using {}",
                locations.len(),
                locations[0].id
            );
        }

        locations
            .into_iter()
            .next()
            .map(|l| l.id)
            .ok_or(CrmError::NoLocation)
    }

    /// Upsert the contact for `phone` and get its SMS conversation
    pub async fn resolve(
        &self,
        phone: &NormalizedPhoneNumber,
        location_id: &str,
        custom_fields: &[CustomField],
    ) -> CrmResult<ResolvedContact> {
        let upsert = self
            .crm
            .upsert_contact(phone, location_id, custom_fields)
            .await?;

        let conversation = self
            .crm
            .create_or_get_conversation(&upsert.contact.id, location_id, Channel::Sms)
            .await?;

        info!(
            contact_id = %upsert.contact.id,
            conversation_id = %conversation.conversation_id,
            action = ?upsert.action,
            "Resolved contact"
        );

        Ok(ResolvedContact {
            phone: phone.clone(),
            conversation,
            action: upsert.action,
        })
    }
}
