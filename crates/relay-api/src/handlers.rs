//! HTTP API handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use relay_core::OutboundSendRequest;
use relay_sync::{OutboundState, StepOutcome, SyncResult, WebhookAck};

use crate::error::{ApiError, Result};
use crate::server::AppState;

const PROVIDER_NAME: &str = "Tall Bob";

// ============================================================================
// Request/Response types
// ============================================================================

/// Outbound send payload
///
/// Everything is optional here; required fields are checked by the engine
/// so a missing field becomes a caller error rather than a decode failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub to: Option<String>,
    pub from: Option<String>,
    #[serde(alias = "body")]
    pub message: Option<String>,
    pub media_url: Option<String>,
    pub subject: Option<String>,
    pub location_id: Option<String>,
    pub contact_id: Option<String>,
    pub add_to_campaign: Option<bool>,
    pub campaign_id: Option<String>,
    pub reference: Option<String>,
}

impl From<SendRequest> for OutboundSendRequest {
    fn from(req: SendRequest) -> Self {
        OutboundSendRequest {
            to: req.to.unwrap_or_default(),
            from: req.from.unwrap_or_default(),
            body: req.message.unwrap_or_default(),
            media_url: non_empty(req.media_url),
            subject: non_empty(req.subject),
            location_id: non_empty(req.location_id),
            contact_id: non_empty(req.contact_id),
            add_to_campaign: req.add_to_campaign.unwrap_or(false),
            campaign_id: non_empty(req.campaign_id),
            reference: non_empty(req.reference),
        }
    }
}

/// CRM-initiated send payload; campaigns are not available on this path
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaySendRequest {
    pub to: Option<String>,
    pub from: Option<String>,
    #[serde(alias = "body")]
    pub message: Option<String>,
    pub media_url: Option<String>,
    pub location_id: Option<String>,
    pub contact_id: Option<String>,
}

impl From<RelaySendRequest> for SendRequest {
    fn from(req: RelaySendRequest) -> Self {
        SendRequest {
            to: req.to,
            from: req.from,
            message: req.message,
            media_url: req.media_url,
            location_id: req.location_id,
            contact_id: req.contact_id,
            ..Default::default()
        }
    }
}

/// Send response payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    pub message_id: Option<String>,
    pub provider: &'static str,
    pub synced: bool,
    pub state: OutboundState,
    pub crm: StepOutcome,
    pub campaign: StepOutcome,
}

impl From<SyncResult> for SendResponse {
    fn from(result: SyncResult) -> Self {
        SendResponse {
            success: result.success,
            message_id: result.provider_message_id,
            provider: PROVIDER_NAME,
            synced: result.synced,
            state: result.state,
            crm: result.crm,
            campaign: result.campaign,
        }
    }
}

/// Status response payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub message_id: String,
    pub status: String,
    pub delivered_at: Option<String>,
    pub details: JsonValue,
}

/// Health response payload
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Decode a JSON body regardless of its Content-Type
///
/// Decode failures surface as `ApiError::InvalidRequest` so callers get the
/// same JSON error body as every other rejected send.
fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        debug!("Rejected send body: {}", e);
        ApiError::InvalidRequest(e.to_string())
    })
}

// ============================================================================
// Handler functions
// ============================================================================

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Send through the provider and mirror into the CRM
pub async fn send_and_sync(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SendResponse>> {
    let req: SendRequest = decode_json(&body)?;
    send(&state, req).await
}

/// Send requested by the CRM
pub async fn relay_send(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SendResponse>> {
    let req: RelaySendRequest = decode_json(&body)?;
    send(&state, req.into()).await
}

async fn send(state: &AppState, req: SendRequest) -> Result<Json<SendResponse>> {
    debug!("Send request: {:?}", req);

    let result = state.engine.send_and_sync(req.into()).await.into_result()?;
    Ok(Json(result.into()))
}

/// Provider delivery status for a message
pub async fn message_status(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<Json<StatusResponse>> {
    let status = state.engine.message_status(&message_id).await?;

    Ok(Json(StatusResponse {
        message_id,
        status: status.status,
        delivered_at: status.delivered_at,
        details: status.raw,
    }))
}

/// Message-received webhook; acknowledged with 200 whatever happens
pub async fn incoming_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<WebhookAck>) {
    let ack = match relay_tallbob::parse_incoming(&body) {
        Ok(event) => state.engine.handle_webhook(event).await,
        Err(e) => {
            warn!("Unreadable incoming webhook: {}", e);
            WebhookAck::failed(e.to_string())
        }
    };

    info!(error = ?ack.error, "Incoming webhook acknowledged");
    (StatusCode::OK, Json(ack))
}

/// Delivery receipt webhook; acknowledged with 200 whatever happens
pub async fn delivery_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<WebhookAck>) {
    let ack = match relay_tallbob::parse_delivery(&body) {
        Ok(event) => state.engine.handle_webhook(event).await,
        Err(e) => {
            warn!("Unreadable delivery receipt: {}", e);
            WebhookAck::failed(e.to_string())
        }
    };

    (StatusCode::OK, Json(ack))
}
