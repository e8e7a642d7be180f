//! Tall Bob API client

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use relay_core::{
    MessageStatus, MmsSend, ProviderError, ProviderGateway, ProviderMessageResult, ProviderResult,
    SmsSend, TallBobConfig,
};

use crate::error::{Result, TallBobError};

/// Tall Bob API client
#[derive(Clone)]
pub struct TallBobClient {
    client: Client,
    api_username: String,
    api_key: String,
    base_url: Url,
}

impl fmt::Debug for TallBobClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TallBobClient")
            .field("api_username", &self.api_username)
            .field("api_key", &relay_core::mask_secret(&self.api_key))
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

/// Which call a response belongs to; status codes mean different things per call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    SendSms,
    SendMms,
    Status,
    RegisterWebhook,
}

#[derive(Debug, Serialize)]
struct SmsPayload<'a> {
    to: &'a str,
    message: &'a str,
    from: &'a str,
    reference: &'a str,
}

#[derive(Debug, Serialize)]
struct MmsPayload<'a> {
    to: &'a str,
    message: &'a str,
    from: &'a str,
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    reference: &'a str,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    url: &'a str,
    event_type: &'a str,
}

impl TallBobClient {
    /// Create a client from configuration
    pub fn new(config: &TallBobConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(TallBobError::CredentialsNotSet);
        }
        if config.base_url.is_empty() {
            return Err(TallBobError::Config("Tall Bob base URL not set".to_string()));
        }

        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| TallBobError::Config(format!("Invalid Tall Bob base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(TallBobError::Config(format!(
                "Tall Bob base URL cannot carry a path: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_username: config.api_username.clone(),
            api_key: config.api_key.clone(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Append path segments to the base URL
    ///
    /// Each segment is percent-encoded, so a caller-supplied ID stays one
    /// segment and cannot climb to a sibling endpoint.
    fn endpoint(&self, segments: &[&str]) -> ProviderResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Unknown(format!("Invalid base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send one request and return the status and body
    ///
    /// Request and response are logged at debug level; credentials travel
    /// only in the auth header and are never logged.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        payload: Option<&impl Serialize>,
    ) -> ProviderResult<(StatusCode, String)> {
        let owned_path = url.path().to_string();
        let path = owned_path.as_str();

        let mut request = self
            .client
            .request(method.clone(), url)
            .basic_auth(&self.api_username, Some(&self.api_key))
            .header("Accept", "application/json");

        if let Some(payload) = payload {
            debug!(
                method = %method,
                path,
                body = %serde_json::to_string(payload).unwrap_or_default(),
                "Tall Bob request"
            );
            request = request.json(payload);
        } else {
            debug!(method = %method, path, "Tall Bob request");
        }

        let response = request.send().await.map_err(|e| {
            error!(method = %method, path, error = %e, "Tall Bob request failed");
            transport_error(&e)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| transport_error(&e))?;

        debug!(status = status.as_u16(), path, body = %body, "Tall Bob response");

        Ok((status, body))
    }

    async fn send(
        &self,
        segments: &[&str],
        payload: &impl Serialize,
        operation: Operation,
    ) -> ProviderResult<ProviderMessageResult> {
        let url = self.endpoint(segments)?;
        let (status, body) = self.execute(Method::POST, url, Some(payload)).await?;

        if !status.is_success() {
            let err = classify(status, &body, operation);
            warn!(status = status.as_u16(), kind = err.kind(), "Tall Bob send rejected");
            return Err(err);
        }

        parse_send_response(&body)
    }
}

#[async_trait]
impl ProviderGateway for TallBobClient {
    async fn send_sms(&self, message: &SmsSend) -> ProviderResult<ProviderMessageResult> {
        info!("Sending SMS to {}", message.to);

        let payload = SmsPayload {
            to: &message.to,
            message: &message.body,
            from: &message.from,
            reference: &message.reference,
        };

        self.send(&["v2", "sms", "send"], &payload, Operation::SendSms).await
    }

    async fn send_mms(&self, message: &MmsSend) -> ProviderResult<ProviderMessageResult> {
        info!("Sending MMS to {} with media", message.to);

        let payload = MmsPayload {
            to: &message.to,
            message: &message.body,
            from: &message.from,
            url: &message.media_url,
            subject: message.subject.as_deref(),
            reference: &message.reference,
        };

        self.send(&["v2", "mms", "send"], &payload, Operation::SendMms).await
    }

    async fn get_message_status(&self, provider_message_id: &str) -> ProviderResult<MessageStatus> {
        debug!("Getting status for message ID: {}", provider_message_id);

        let id = provider_message_id.trim();
        if id.is_empty() || id == "." || id == ".." {
            return Err(ProviderError::NotFound(provider_message_id.to_string()));
        }

        let url = self.endpoint(&["v2", "messages", id])?;
        let (status, body) = self.execute(Method::GET, url, None::<&()>).await?;

        if !status.is_success() {
            return Err(match classify(status, &body, Operation::Status) {
                ProviderError::NotFound(_) => ProviderError::NotFound(provider_message_id.to_string()),
                other => other,
            });
        }

        parse_status_response(&body)
    }

    async fn register_webhook(&self, callback_url: &str, event_types: &[String]) -> ProviderResult<()> {
        for event_type in event_types {
            info!("Registering webhook {} for {}", callback_url, event_type);

            let payload = WebhookPayload {
                url: callback_url,
                event_type,
            };
            let url = self.endpoint(&["v2", "webhooks"])?;
            let (status, body) = self.execute(Method::POST, url, Some(&payload)).await?;

            if status.is_success() {
                continue;
            }
            if is_duplicate_registration(status, &body) {
                debug!("Webhook for {} already registered", event_type);
                continue;
            }

            return Err(classify(status, &body, Operation::RegisterWebhook));
        }

        Ok(())
    }
}

fn transport_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Network(format!("request timed out: {}", err))
    } else {
        ProviderError::Network(err.to_string())
    }
}

/// Map a non-success response to the provider error taxonomy
fn classify(status: StatusCode, body: &str, operation: Operation) -> ProviderError {
    let detail = format!("{} - {}", status, body);
    let lower = body.to_ascii_lowercase();
    let mentions_media = ["media", "url", "file", "image", "size", "format"]
        .iter()
        .any(|word| lower.contains(word));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthFailure(detail),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(detail),
        StatusCode::PAYLOAD_TOO_LARGE | StatusCode::UNSUPPORTED_MEDIA_TYPE
            if operation == Operation::SendMms =>
        {
            ProviderError::MediaRejected(detail)
        }
        StatusCode::NOT_FOUND if operation == Operation::Status => ProviderError::NotFound(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => match operation {
            Operation::SendMms if mentions_media => ProviderError::MediaRejected(detail),
            Operation::SendSms | Operation::SendMms => ProviderError::InvalidRecipient(detail),
            _ => ProviderError::Unknown(detail),
        },
        s if s.is_server_error() => ProviderError::Network(detail),
        _ => ProviderError::Unknown(detail),
    }
}

fn is_duplicate_registration(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::CONFLICT {
        return true;
    }
    let lower = body.to_ascii_lowercase();
    matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY)
        && (lower.contains("already exists") || lower.contains("already registered"))
}

fn first_string(raw: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match raw.get(key) {
        Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Extract the provider message ID; a response without one is an error,
/// never a fabricated ID
fn parse_send_response(body: &str) -> ProviderResult<ProviderMessageResult> {
    let raw: JsonValue = serde_json::from_str(body)
        .map_err(|e| ProviderError::Unknown(format!("Failed to parse response: {} - {}", e, body)))?;

    let provider_message_id = first_string(&raw, &["messageId", "message_id", "id"])
        .ok_or_else(|| ProviderError::Unknown(format!("Response carried no message ID: {}", body)))?;

    Ok(ProviderMessageResult {
        provider_message_id,
        provider_status: first_string(&raw, &["status"]),
        raw,
    })
}

fn parse_status_response(body: &str) -> ProviderResult<MessageStatus> {
    let raw: JsonValue = serde_json::from_str(body)
        .map_err(|e| ProviderError::Unknown(format!("Failed to parse response: {} - {}", e, body)))?;

    Ok(MessageStatus {
        status: first_string(&raw, &["status"]).unwrap_or_else(|| "unknown".to_string()),
        delivered_at: first_string(&raw, &["deliveredAt", "delivered_at"]),
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config(base_url: &str) -> TallBobConfig {
        TallBobConfig {
            base_url: base_url.to_string(),
            api_username: "user".to_string(),
            api_key: "secret-key".to_string(),
            timeout_secs: 5,
        }
    }

    fn sms() -> SmsSend {
        SmsSend {
            to: "61499000100".to_string(),
            from: "TestSender".to_string(),
            body: "hi".to_string(),
            reference: "ghl_c1_1700000000000".to_string(),
        }
    }

    #[test]
    fn test_client_requires_credentials() {
        let mut cfg = config("https://api.tallbob.com");
        cfg.api_key.clear();
        assert!(matches!(TallBobClient::new(&cfg), Err(TallBobError::CredentialsNotSet)));
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = TallBobClient::new(&config("https://api.tallbob.com/")).unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("secret-key"));
        assert_eq!(client.base_url(), "https://api.tallbob.com");
    }

    #[tokio::test]
    async fn test_send_sms_forwards_caller_values() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/sms/send")
            .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
            .match_body(Matcher::Json(serde_json::json!({
                "to": "61499000100",
                "message": "hi",
                "from": "TestSender",
                "reference": "ghl_c1_1700000000000"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"messageId":"tb_123","status":"queued"}"#)
            .create_async()
            .await;

        let client = TallBobClient::new(&config(&server.url())).unwrap();
        let result = client.send_sms(&sms()).await.unwrap();

        assert_eq!(result.provider_message_id, "tb_123");
        assert_eq!(result.provider_status.as_deref(), Some("queued"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_mms_uses_mms_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/mms/send")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "url": "https://example.com/a.jpg",
                "subject": "A walk in the park"
            })))
            .with_status(200)
            .with_body(r#"{"id":"tb_mms_1"}"#)
            .create_async()
            .await;

        let client = TallBobClient::new(&config(&server.url())).unwrap();
        let message = MmsSend {
            to: "61499000100".to_string(),
            from: "TestSender".to_string(),
            body: "pic".to_string(),
            media_url: "https://example.com/a.jpg".to_string(),
            subject: Some("A walk in the park".to_string()),
            reference: "ref".to_string(),
        };
        let result = client.send_mms(&message).await.unwrap();

        assert_eq!(result.provider_message_id, "tb_mms_1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_without_message_id_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v2/sms/send")
            .with_status(200)
            .with_body(r#"{"status":"queued"}"#)
            .create_async()
            .await;

        let client = TallBobClient::new(&config(&server.url())).unwrap();
        let err = client.send_sms(&sms()).await.unwrap_err();
        assert_eq!(err.kind(), "unknown");
    }

    #[tokio::test]
    async fn test_send_error_taxonomy() {
        let cases = [
            (401, "{}", "auth_failure"),
            (429, "{}", "rate_limited"),
            (400, r#"{"error":"invalid number"}"#, "invalid_recipient"),
            (503, "unavailable", "network"),
        ];

        for (status, body, kind) in cases {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("POST", "/v2/sms/send")
                .with_status(status)
                .with_body(body)
                .create_async()
                .await;

            let client = TallBobClient::new(&config(&server.url())).unwrap();
            let err = client.send_sms(&sms()).await.unwrap_err();
            assert_eq!(err.kind(), kind, "status {}", status);
        }
    }

    #[tokio::test]
    async fn test_get_status_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/messages/missing")
            .with_status(404)
            .create_async()
            .await;

        let client = TallBobClient::new(&config(&server.url())).unwrap();
        let err = client.get_message_status("missing").await.unwrap_err();
        assert_eq!(err, ProviderError::NotFound("missing".to_string()));
    }

    #[tokio::test]
    async fn test_get_status_parses_fields() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/messages/tb_1")
            .with_status(200)
            .with_body(r#"{"status":"delivered","deliveredAt":"2026-01-01T00:00:00Z"}"#)
            .create_async()
            .await;

        let client = TallBobClient::new(&config(&server.url())).unwrap();
        let status = client.get_message_status("tb_1").await.unwrap();
        assert_eq!(status.status, "delivered");
        assert_eq!(status.delivered_at.as_deref(), Some("2026-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_get_status_keeps_id_in_one_segment() {
        let mut server = mockito::Server::new_async().await;
        let webhooks = server
            .mock("GET", "/v2/webhooks")
            .with_status(200)
            .with_body("[]")
            .expect(0)
            .create_async()
            .await;
        let message = server
            .mock("GET", "/v2/messages/..%2Fwebhooks")
            .with_status(404)
            .create_async()
            .await;

        let client = TallBobClient::new(&config(&server.url())).unwrap();
        let err = client.get_message_status("../webhooks").await.unwrap_err();

        assert_eq!(err, ProviderError::NotFound("../webhooks".to_string()));
        message.assert_async().await;
        webhooks.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_status_rejects_dot_ids_without_request() {
        let mut server = mockito::Server::new_async().await;
        let any = server
            .mock("GET", Matcher::Any)
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let client = TallBobClient::new(&config(&server.url())).unwrap();
        for id in ["..", ".", "  "] {
            let err = client.get_message_status(id).await.unwrap_err();
            assert_eq!(err.kind(), "not_found", "id {:?}", id);
        }
        any.assert_async().await;
    }

    #[tokio::test]
    async fn test_request_timeout_is_network_error() {
        // Accepts connections but never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let mut cfg = config(&base_url);
        cfg.timeout_secs = 1;
        let client = TallBobClient::new(&cfg).unwrap();

        let err = client.send_sms(&sms()).await.unwrap_err();
        match err {
            ProviderError::Network(detail) => assert!(detail.contains("timed out"), "{}", detail),
            other => panic!("expected network error, got {:?}", other),
        }
        drop(listener);
    }

    #[tokio::test]
    async fn test_register_webhook_tolerates_duplicates() {
        let mut server = mockito::Server::new_async().await;
        let received = server
            .mock("POST", "/v2/webhooks")
            .match_body(Matcher::PartialJson(serde_json::json!({"event_type": "message.received"})))
            .with_status(409)
            .with_body(r#"{"error":"webhook already exists"}"#)
            .create_async()
            .await;
        let delivered = server
            .mock("POST", "/v2/webhooks")
            .match_body(Matcher::PartialJson(serde_json::json!({"event_type": "message.delivered"})))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        let client = TallBobClient::new(&config(&server.url())).unwrap();
        let events = vec!["message.received".to_string(), "message.delivered".to_string()];
        client
            .register_webhook("https://relay.example.com/webhooks/tallbob/incoming", &events)
            .await
            .unwrap();

        received.assert_async().await;
        delivered.assert_async().await;
    }

    #[test]
    fn test_classify_media_rejection() {
        let err = classify(StatusCode::BAD_REQUEST, r#"{"error":"media file too large"}"#, Operation::SendMms);
        assert!(matches!(err, ProviderError::MediaRejected(_)));

        let err = classify(StatusCode::PAYLOAD_TOO_LARGE, "", Operation::SendMms);
        assert!(matches!(err, ProviderError::MediaRejected(_)));

        let err = classify(StatusCode::BAD_REQUEST, r#"{"error":"bad number"}"#, Operation::SendMms);
        assert!(matches!(err, ProviderError::InvalidRecipient(_)));
    }

    #[test]
    fn test_duplicate_registration_detection() {
        assert!(is_duplicate_registration(StatusCode::CONFLICT, ""));
        assert!(is_duplicate_registration(StatusCode::BAD_REQUEST, "Webhook already exists"));
        assert!(!is_duplicate_registration(StatusCode::BAD_REQUEST, "bad url"));
    }
}
