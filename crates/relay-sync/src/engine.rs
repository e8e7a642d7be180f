//! Sync engine
//!
//! Each request is a two-step saga: the first step (provider send, or
//! contact resolution for inbound) decides the outcome, the second step is
//! best-effort and never undoes the first. Nothing is held between
//! requests.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use relay_core::{
    ConversationTarget, CrmError, CrmGateway, CrmMessage, CrmResult, CustomField,
    DeliveryStatus, Direction, InboundEventType, InboundWebhookEvent, MessageStatus, MessageType,
    MmsSend, NormalizedPhoneNumber, OutboundSendRequest, PhoneNormalizer, ProviderError,
    ProviderGateway, ProviderMessageResult, ProviderResult, SmsSend, UpsertAction,
};

use crate::error::{Result, SyncError};
use crate::resolver::ContactResolver;

/// Terminal state of an outbound send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundState {
    /// Required fields missing; nothing was called
    Rejected,
    /// The provider refused the message or could not be reached
    SendFailed,
    /// Sent and mirrored into the CRM
    Synced,
    /// Sent; no CRM location to mirror into
    SyncSkipped,
    /// Sent; mirroring into the CRM failed
    SyncFailed,
}

/// Outcome of a best-effort step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Skipped(String),
    Failed(String),
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    fn skipped(reason: &str) -> Self {
        Self::Skipped(reason.to_string())
    }
}

/// Result of `SyncEngine::send_and_sync`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    /// True only when the provider send and the CRM append both succeeded
    pub synced: bool,
    pub state: OutboundState,
    pub crm: StepOutcome,
    pub campaign: StepOutcome,
    /// Set for `Rejected` and `SendFailed`
    #[serde(skip)]
    pub error: Option<SyncError>,
}

impl SyncResult {
    fn not_sent(state: OutboundState, error: SyncError) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            synced: false,
            state,
            crm: StepOutcome::skipped("message not sent"),
            campaign: StepOutcome::skipped("message not sent"),
            error: Some(error),
        }
    }

    /// `Err` when the send did not happen
    pub fn into_result(mut self) -> Result<Self> {
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

/// What the engine did with one webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    Synced {
        contact_id: String,
        conversation_id: String,
        action: UpsertAction,
    },
    /// Event type the engine does not project into the CRM
    Ignored(String),
    DeliveryRecorded(DeliveryStatus),
    Failed(String),
}

/// Acknowledgment returned to the provider for every webhook
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub outcome: InboundOutcome,
}

impl WebhookAck {
    pub fn new(outcome: InboundOutcome) -> Self {
        let error = match &outcome {
            InboundOutcome::Failed(message) => Some(message.clone()),
            _ => None,
        };

        Self {
            received: true,
            timestamp: Utc::now().to_rfc3339(),
            error,
            outcome,
        }
    }

    /// Acknowledge a webhook that could not be processed
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(InboundOutcome::Failed(message.into()))
    }
}

/// Bidirectional provider/CRM synchronization
#[derive(Clone)]
pub struct SyncEngine {
    provider: Arc<dyn ProviderGateway>,
    crm: Arc<dyn CrmGateway>,
    resolver: ContactResolver,
    normalizer: PhoneNormalizer,
}

impl SyncEngine {
    pub fn new(
        provider: Arc<dyn ProviderGateway>,
        crm: Arc<dyn CrmGateway>,
        normalizer: PhoneNormalizer,
        location_ids: Vec<String>,
    ) -> Self {
        let resolver = ContactResolver::new(crm.clone(), location_ids);
        Self {
            provider,
            crm,
            resolver,
            normalizer,
        }
    }

    pub fn normalizer(&self) -> &PhoneNormalizer {
        &self.normalizer
    }

    /// Send a message through the provider and mirror it into the CRM
    ///
    /// A provider failure is terminal and no CRM call is made. CRM and
    /// campaign failures are reported in the result without affecting
    /// `success`.
    pub async fn send_and_sync(&self, request: OutboundSendRequest) -> SyncResult {
        if let Err(e) = validate(&request) {
            warn!("Rejected send request: {}", e);
            return SyncResult::not_sent(OutboundState::Rejected, e);
        }

        let to = self.normalizer.normalize(&request.to);
        if to.is_empty() {
            let e = SyncError::Caller(format!("'to' has no digits: {}", request.to));
            warn!("Rejected send request: {}", e);
            return SyncResult::not_sent(OutboundState::Rejected, e);
        }

        let reference = request
            .reference
            .clone()
            .unwrap_or_else(|| default_reference(request.contact_id.as_deref()));

        info!(
            to = %to,
            message_type = request.message_type().as_str(),
            reference = %reference,
            "Sending message"
        );

        let sent = match self.dispatch(&request, &to, reference).await {
            Ok(sent) => sent,
            Err(e) => {
                error!(kind = e.kind(), "Provider send failed: {}", e);
                return SyncResult::not_sent(OutboundState::SendFailed, e.into());
            }
        };

        info!(provider_message_id = %sent.provider_message_id, "Message sent");

        let (crm, contact_id) = self
            .mirror_outbound(&request, &to, &sent.provider_message_id)
            .await;
        let campaign = self.enroll(&request, contact_id.as_deref()).await;

        let state = match crm {
            StepOutcome::Completed => OutboundState::Synced,
            StepOutcome::Skipped(_) => OutboundState::SyncSkipped,
            StepOutcome::Failed(_) => OutboundState::SyncFailed,
        };

        SyncResult {
            success: true,
            provider_message_id: Some(sent.provider_message_id),
            synced: crm.is_completed(),
            state,
            crm,
            campaign,
            error: None,
        }
    }

    async fn dispatch(
        &self,
        request: &OutboundSendRequest,
        to: &NormalizedPhoneNumber,
        reference: String,
    ) -> ProviderResult<ProviderMessageResult> {
        match &request.media_url {
            Some(media_url) => {
                let mms = MmsSend {
                    to: to.to_string(),
                    from: request.from.clone(),
                    body: request.body.clone(),
                    media_url: media_url.clone(),
                    subject: request.subject.clone(),
                    reference,
                };
                self.provider.send_mms(&mms).await
            }
            None => {
                let sms = SmsSend {
                    to: to.to_string(),
                    from: request.from.clone(),
                    body: request.body.clone(),
                    reference,
                };
                self.provider.send_sms(&sms).await
            }
        }
    }

    /// Append the sent message to the CRM; returns the contact when known
    async fn mirror_outbound(
        &self,
        request: &OutboundSendRequest,
        to: &NormalizedPhoneNumber,
        provider_message_id: &str,
    ) -> (StepOutcome, Option<String>) {
        let Some(location_id) = request.location_id.as_deref() else {
            debug!("No location on request, CRM sync skipped");
            return (StepOutcome::skipped("no location"), request.contact_id.clone());
        };

        // A known contact is appended to directly; the CRM picks its conversation
        let target = match request.contact_id.as_deref() {
            Some(contact_id) => ConversationTarget::Contact {
                contact_id: contact_id.to_string(),
                location_id: location_id.to_string(),
            },
            None => match self.resolver.resolve(to, location_id, &[]).await {
                Ok(resolved) => ConversationTarget::Conversation(resolved.conversation),
                Err(e) => {
                    warn!("CRM contact resolution failed: {}", e);
                    return (StepOutcome::Failed(e.to_string()), None);
                }
            },
        };

        let message = CrmMessage {
            body: request.body.clone(),
            message_type: request.message_type(),
            media_urls: request.media_url.iter().cloned().collect(),
            direction: Direction::Outbound,
            provider_message_id: Some(provider_message_id.to_string()),
            timestamp: Some(Utc::now().to_rfc3339()),
        };

        let contact_id = target.contact_id().to_string();

        match self.crm.append_message(&target, &message).await {
            Ok(()) => {
                info!(contact_id = %contact_id, "Outbound message synced to CRM");
                (StepOutcome::Completed, Some(contact_id))
            }
            Err(e) => {
                warn!(contact_id = %contact_id, "CRM append failed: {}", e);
                (StepOutcome::Failed(e.to_string()), Some(contact_id))
            }
        }
    }

    async fn enroll(&self, request: &OutboundSendRequest, contact_id: Option<&str>) -> StepOutcome {
        if !request.add_to_campaign {
            return StepOutcome::skipped("not requested");
        }
        let Some(campaign_id) = request.campaign_id.as_deref() else {
            return StepOutcome::skipped("no campaign id");
        };
        let Some(location_id) = request.location_id.as_deref() else {
            return StepOutcome::skipped("no location");
        };
        let Some(contact_id) = contact_id else {
            return StepOutcome::skipped("contact unknown");
        };

        match self
            .crm
            .add_to_campaign(contact_id, campaign_id, location_id)
            .await
        {
            Ok(()) => StepOutcome::Completed,
            Err(e) => {
                warn!(campaign_id, "Campaign enrollment failed: {}", e);
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    /// Handle one provider webhook
    ///
    /// Always acknowledges; processing failures are reported in the ack's
    /// `error` field instead of a failure status.
    pub async fn handle_webhook(&self, event: InboundWebhookEvent) -> WebhookAck {
        match event {
            InboundWebhookEvent::MessageReceived {
                event_type,
                from,
                to,
                body,
                media,
                received_at,
            } => {
                if !event_type.is_message_received() {
                    debug!(event_type = event_type.as_str(), "Ignoring webhook event");
                    return WebhookAck::new(InboundOutcome::Ignored(event_type.as_str().to_string()));
                }

                info!(event_type = event_type.as_str(), from = %from, to = %to, "Inbound message");

                match self.sync_inbound(&event_type, &from, body, media, received_at).await {
                    Ok(outcome) => WebhookAck::new(outcome),
                    Err(e) => {
                        error!(from = %from, "Inbound sync failed: {}", e);
                        WebhookAck::failed(e.to_string())
                    }
                }
            }
            InboundWebhookEvent::DeliveryReceipt {
                provider_message_id,
                status,
                timestamp,
            } => self.handle_delivery_receipt(&provider_message_id, status, timestamp.as_deref()),
        }
    }

    async fn sync_inbound(
        &self,
        event_type: &InboundEventType,
        from: &str,
        body: String,
        media: Vec<String>,
        received_at: Option<String>,
    ) -> CrmResult<InboundOutcome> {
        let phone = self.normalizer.normalize(from);
        if phone.is_empty() {
            return Err(CrmError::Validation(format!("sender has no digits: {:?}", from)));
        }

        let location_id = self.resolver.select_location().await?;

        let now = Utc::now().to_rfc3339();
        let custom_fields = [
            CustomField::new("last_incoming_message", body.as_str()),
            CustomField::new("last_message_date", now.as_str()),
        ];
        let resolved = self
            .resolver
            .resolve(&phone, &location_id, &custom_fields)
            .await?;

        let message_type = if media.is_empty() {
            MessageType::Sms
        } else {
            MessageType::Mms
        };
        let message = CrmMessage {
            body,
            message_type,
            media_urls: media,
            direction: Direction::Inbound,
            provider_message_id: None,
            timestamp: received_at.or(Some(now)),
        };

        let conversation = resolved.conversation;
        let outcome = InboundOutcome::Synced {
            contact_id: conversation.contact_id.clone(),
            conversation_id: conversation.conversation_id.clone(),
            action: resolved.action,
        };

        self.crm
            .append_message(&ConversationTarget::Conversation(conversation), &message)
            .await?;

        info!(
            event_type = event_type.as_str(),
            outcome = ?outcome,
            "Inbound message synced to CRM"
        );
        Ok(outcome)
    }

    /// Record a delivery receipt; terminal statuses are final
    pub fn handle_delivery_receipt(
        &self,
        provider_message_id: &str,
        status: DeliveryStatus,
        timestamp: Option<&str>,
    ) -> WebhookAck {
        if status.is_terminal() {
            info!(
                provider_message_id,
                status = status.as_str(),
                timestamp,
                "Delivery receipt"
            );
        } else {
            debug!(
                provider_message_id,
                status = status.as_str(),
                timestamp,
                "Intermediate delivery status"
            );
        }

        WebhookAck::new(InboundOutcome::DeliveryRecorded(status))
    }

    /// Look up a message's delivery status at the provider
    pub async fn message_status(&self, provider_message_id: &str) -> Result<MessageStatus> {
        if provider_message_id.trim().is_empty() {
            return Err(SyncError::Caller("message id is required".to_string()));
        }

        match self.provider.get_message_status(provider_message_id).await {
            Ok(status) => Ok(status),
            Err(ProviderError::NotFound(_)) => {
                Err(SyncError::NotFound(format!("message {}", provider_message_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Point the provider's webhooks at `callback_url`
    pub async fn register_webhook(&self, callback_url: &str, event_types: &[String]) -> Result<()> {
        self.provider
            .register_webhook(callback_url, event_types)
            .await?;
        info!(callback_url, "Webhook registered for {:?}", event_types);
        Ok(())
    }
}

fn validate(request: &OutboundSendRequest) -> Result<()> {
    let missing: Vec<&str> = [
        ("to", &request.to),
        ("from", &request.from),
        ("message", &request.body),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| name)
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SyncError::Caller(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

/// Correlation token used when the caller supplies none
fn default_reference(contact_id: Option<&str>) -> String {
    format!(
        "ghl_{}_{}",
        contact_id.unwrap_or("unknown"),
        Utc::now().timestamp_millis()
    )
}
