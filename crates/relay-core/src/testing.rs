//! In-memory gateway fakes for tests
//!
//! Enabled with the `test-util` feature. `FakeProvider` records every call
//! and can be told to fail; `InMemoryCrm` keeps contacts, conversations and
//! messages behind one lock so upserts are atomic, like the real CRM
//! primitive.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::crm::CrmGateway;
use crate::error::{CrmError, CrmResult, ProviderError, ProviderResult};
use crate::model::{
    Channel, ContactUpsert, ConversationTarget, CrmContact, CrmConversationRef, CrmMessage,
    CustomField, LocationRef, MessageStatus, ProviderMessageResult, UpsertAction,
};
use crate::phone::NormalizedPhoneNumber;
use crate::provider::{MmsSend, ProviderGateway, SmsSend};

/// A call observed by `FakeProvider`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Sms(SmsSend),
    Mms(MmsSend),
    Status(String),
    RegisterWebhook { url: String, event_types: Vec<String> },
}

#[derive(Debug, Default)]
struct ProviderState {
    calls: Vec<ProviderCall>,
    failure: Option<ProviderError>,
    next_id: u64,
    statuses: HashMap<String, MessageStatus>,
}

/// Scriptable provider
#[derive(Debug, Default)]
pub struct FakeProvider {
    state: Mutex<ProviderState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent send and status call fails with `error`
    pub fn failing(error: ProviderError) -> Self {
        Self {
            state: Mutex::new(ProviderState {
                failure: Some(error),
                ..Default::default()
            }),
        }
    }

    pub async fn set_failure(&self, error: Option<ProviderError>) {
        self.state.lock().await.failure = error;
    }

    pub async fn set_status(&self, provider_message_id: &str, status: MessageStatus) {
        self.state
            .lock()
            .await
            .statuses
            .insert(provider_message_id.to_string(), status);
    }

    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().await.calls.clone()
    }

    async fn record_send(&self, call: ProviderCall) -> ProviderResult<ProviderMessageResult> {
        let mut state = self.state.lock().await;
        state.calls.push(call);

        if let Some(error) = state.failure.clone() {
            return Err(error);
        }

        state.next_id += 1;
        let id = format!("tb_msg_{}", state.next_id);
        Ok(ProviderMessageResult {
            provider_message_id: id.clone(),
            provider_status: Some("queued".to_string()),
            raw: serde_json::json!({ "messageId": id, "status": "queued" }),
        })
    }
}

#[async_trait]
impl ProviderGateway for FakeProvider {
    async fn send_sms(&self, message: &SmsSend) -> ProviderResult<ProviderMessageResult> {
        self.record_send(ProviderCall::Sms(message.clone())).await
    }

    async fn send_mms(&self, message: &MmsSend) -> ProviderResult<ProviderMessageResult> {
        self.record_send(ProviderCall::Mms(message.clone())).await
    }

    async fn get_message_status(&self, provider_message_id: &str) -> ProviderResult<MessageStatus> {
        let mut state = self.state.lock().await;
        state.calls.push(ProviderCall::Status(provider_message_id.to_string()));

        if let Some(error) = state.failure.clone() {
            return Err(error);
        }

        state
            .statuses
            .get(provider_message_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(provider_message_id.to_string()))
    }

    async fn register_webhook(&self, callback_url: &str, event_types: &[String]) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(ProviderCall::RegisterWebhook {
            url: callback_url.to_string(),
            event_types: event_types.to_vec(),
        });
        Ok(())
    }
}

/// Which CRM operation a scripted failure applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrmOperation {
    ListLocations,
    UpsertContact,
    Conversation,
    AppendMessage,
    AddToCampaign,
}

/// A message stored by `InMemoryCrm`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub target: ConversationTarget,
    pub message: CrmMessage,
}

#[derive(Debug, Default)]
struct CrmState {
    locations: Vec<LocationRef>,
    contacts: HashMap<(String, String), CrmContact>,
    conversations: HashMap<(String, String, Channel), CrmConversationRef>,
    messages: Vec<StoredMessage>,
    enrollments: Vec<(String, String, String)>,
    campaigns: Vec<String>,
    failures: HashMap<CrmOperation, CrmError>,
    calls: usize,
    next_id: u64,
}

/// In-memory CRM
#[derive(Debug, Default)]
pub struct InMemoryCrm {
    state: Mutex<CrmState>,
    latency: Option<Duration>,
}

impl InMemoryCrm {
    /// CRM with the given location ids, in listing order
    pub fn with_locations(ids: &[&str]) -> Self {
        let state = CrmState {
            locations: ids
                .iter()
                .map(|id| LocationRef {
                    id: id.to_string(),
                    name: None,
                })
                .collect(),
            ..Default::default()
        };

        Self {
            state: Mutex::new(state),
            latency: None,
        }
    }

    /// Hold the lock for `latency` inside each call, widening race windows
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn add_campaign(&self, campaign_id: &str) {
        self.state.lock().await.campaigns.push(campaign_id.to_string());
    }

    pub async fn fail(&self, operation: CrmOperation, error: CrmError) {
        self.state.lock().await.failures.insert(operation, error);
    }

    /// Total number of gateway calls received
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.calls
    }

    pub async fn contacts(&self) -> Vec<CrmContact> {
        self.state.lock().await.contacts.values().cloned().collect()
    }

    pub async fn conversations(&self) -> Vec<CrmConversationRef> {
        self.state.lock().await.conversations.values().cloned().collect()
    }

    pub async fn messages(&self) -> Vec<StoredMessage> {
        self.state.lock().await.messages.clone()
    }

    pub async fn enrollments(&self) -> Vec<(String, String, String)> {
        self.state.lock().await.enrollments.clone()
    }

    async fn enter(&self, operation: CrmOperation) -> CrmResult<tokio::sync::MutexGuard<'_, CrmState>> {
        let mut state = self.state.lock().await;
        state.calls += 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = state.failures.get(&operation).cloned() {
            return Err(error);
        }

        Ok(state)
    }
}

#[async_trait]
impl CrmGateway for InMemoryCrm {
    async fn list_locations(&self) -> CrmResult<Vec<LocationRef>> {
        let state = self.enter(CrmOperation::ListLocations).await?;
        Ok(state.locations.clone())
    }

    async fn upsert_contact(
        &self,
        phone: &NormalizedPhoneNumber,
        location_id: &str,
        _custom_fields: &[CustomField],
    ) -> CrmResult<ContactUpsert> {
        let mut state = self.enter(CrmOperation::UpsertContact).await?;
        let key = (phone.as_str().to_string(), location_id.to_string());

        if let Some(contact) = state.contacts.get(&key) {
            return Ok(ContactUpsert {
                contact: contact.clone(),
                action: UpsertAction::Found,
            });
        }

        state.next_id += 1;
        let contact = CrmContact {
            id: format!("contact_{}", state.next_id),
            phone: Some(phone.as_str().to_string()),
            location_id: Some(location_id.to_string()),
        };
        state.contacts.insert(key, contact.clone());

        Ok(ContactUpsert {
            contact,
            action: UpsertAction::Created,
        })
    }

    async fn create_or_get_conversation(
        &self,
        contact_id: &str,
        location_id: &str,
        channel: Channel,
    ) -> CrmResult<CrmConversationRef> {
        let mut state = self.enter(CrmOperation::Conversation).await?;
        let key = (contact_id.to_string(), location_id.to_string(), channel);

        if let Some(conversation) = state.conversations.get(&key) {
            return Ok(conversation.clone());
        }

        let conversation = CrmConversationRef {
            contact_id: contact_id.to_string(),
            conversation_id: format!("conv_{}", uuid::Uuid::new_v4().simple()),
            location_id: location_id.to_string(),
        };
        state.conversations.insert(key, conversation.clone());
        Ok(conversation)
    }

    async fn append_message(&self, target: &ConversationTarget, message: &CrmMessage) -> CrmResult<()> {
        let mut state = self.enter(CrmOperation::AppendMessage).await?;
        state.messages.push(StoredMessage {
            target: target.clone(),
            message: message.clone(),
        });
        Ok(())
    }

    async fn add_to_campaign(&self, contact_id: &str, campaign_id: &str, location_id: &str) -> CrmResult<()> {
        let mut state = self.enter(CrmOperation::AddToCampaign).await?;

        if !state.campaigns.iter().any(|c| c == campaign_id) {
            return Err(CrmError::CampaignNotFound(campaign_id.to_string()));
        }

        state.enrollments.push((
            contact_id.to_string(),
            campaign_id.to_string(),
            location_id.to_string(),
        ));
        Ok(())
    }
}
