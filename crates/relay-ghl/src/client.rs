//! HighLevel (LeadConnector) API client

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use relay_core::{
    Channel, ContactUpsert, ConversationTarget, CrmContact, CrmConversationRef, CrmError,
    CrmGateway, CrmMessage, CrmResult, CustomField, Direction, GhlConfig, LocationRef,
    NormalizedPhoneNumber, UpsertAction,
};

use crate::error::{GhlError, Result};
use crate::models::*;

/// HighLevel API client
#[derive(Clone)]
pub struct GhlClient {
    client: Client,
    base_url: String,
}

impl fmt::Debug for GhlClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GhlClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GhlClient {
    /// Create a new client
    ///
    /// The token and API version are installed as default headers.
    pub fn new(config: &GhlConfig) -> Result<Self> {
        if config.token.is_empty() {
            return Err(GhlError::Configuration(
                "private integration token not set".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| GhlError::InvalidHeader(e.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            "Version",
            HeaderValue::from_str(&config.api_version)
                .map_err(|e| GhlError::InvalidHeader(e.to_string()))?,
        );
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        info!("HighLevel client initialized for: {}", base_url);

        Ok(Self { client, base_url })
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        payload: Option<&impl Serialize>,
    ) -> CrmResult<(StatusCode, String)> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method.clone(), &url);

        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        debug!(method = %method, path, "HighLevel request");

        let response = request.send().await.map_err(|e| {
            error!(method = %method, path, error = %e, "HighLevel request failed");
            CrmError::Unavailable(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CrmError::Unavailable(e.to_string()))?;

        debug!(status = status.as_u16(), path, body = %body, "HighLevel response");
        Ok((status, body))
    }

    /// Send a request and decode a successful JSON response
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        payload: Option<&impl Serialize>,
    ) -> CrmResult<T> {
        let (status, body) = self.execute(method, path, query, payload).await?;

        if !status.is_success() {
            warn!("HighLevel request failed: {} - {}", status, body);
            return Err(classify(status, &body));
        }

        decode(&body)
    }

    async fn search_conversation(&self, contact_id: &str, location_id: &str) -> CrmResult<Option<String>> {
        let response: SearchConversationsResponse = self
            .call(
                Method::GET,
                "/conversations/search",
                &[("locationId", location_id), ("contactId", contact_id)],
                None::<&()>,
            )
            .await?;

        Ok(response.conversations.into_iter().next().map(|c| c.id))
    }
}

#[async_trait]
impl CrmGateway for GhlClient {
    async fn list_locations(&self) -> CrmResult<Vec<LocationRef>> {
        let response: LocationsResponse = self
            .call(Method::GET, "/locations/search", &[], None::<&()>)
            .await?;

        info!("Fetched {} locations", response.locations.len());

        Ok(response
            .locations
            .into_iter()
            .map(|l| LocationRef { id: l.id, name: l.name })
            .collect())
    }

    async fn upsert_contact(
        &self,
        phone: &NormalizedPhoneNumber,
        location_id: &str,
        custom_fields: &[CustomField],
    ) -> CrmResult<ContactUpsert> {
        let request = UpsertContactRequest {
            location_id: location_id.to_string(),
            // The CRM matches on E.164
            phone: format!("+{}", phone),
            custom_fields: custom_fields
                .iter()
                .map(|f| CustomFieldValue {
                    key: f.key.clone(),
                    field_value: f.value.clone(),
                })
                .collect(),
        };

        let response: UpsertContactResponse = self
            .call(Method::POST, "/contacts/upsert", &[], Some(&request))
            .await?;

        let action = if response.created {
            UpsertAction::Created
        } else {
            UpsertAction::Found
        };
        debug!("Upserted contact {} ({:?})", response.contact.id, action);

        Ok(ContactUpsert {
            contact: CrmContact {
                id: response.contact.id,
                phone: response.contact.phone,
                location_id: response
                    .contact
                    .location_id
                    .or_else(|| Some(location_id.to_string())),
            },
            action,
        })
    }

    async fn create_or_get_conversation(
        &self,
        contact_id: &str,
        location_id: &str,
        channel: Channel,
    ) -> CrmResult<CrmConversationRef> {
        let conversation_ref = |conversation_id: String| CrmConversationRef {
            contact_id: contact_id.to_string(),
            conversation_id,
            location_id: location_id.to_string(),
        };

        if let Some(id) = self.search_conversation(contact_id, location_id).await? {
            return Ok(conversation_ref(id));
        }

        debug!("Creating {} conversation for contact {}", channel.as_str(), contact_id);

        let request = CreateConversationRequest {
            location_id: location_id.to_string(),
            contact_id: contact_id.to_string(),
        };
        let (status, body) = self
            .execute(Method::POST, "/conversations/", &[], Some(&request))
            .await?;

        if status.is_success() {
            let created: CreateConversationResponse = decode(&body)?;
            let id = created.conversation_id().ok_or_else(|| {
                CrmError::InvalidResponse(format!("conversation id missing: {}", body))
            })?;
            return Ok(conversation_ref(id));
        }

        // A concurrent request created it first; the CRM keeps one per contact
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            if let Some(id) = self.search_conversation(contact_id, location_id).await? {
                return Ok(conversation_ref(id));
            }
        }

        Err(classify(status, &body))
    }

    async fn append_message(&self, target: &ConversationTarget, message: &CrmMessage) -> CrmResult<()> {
        let (conversation_id, contact_id) = match target {
            ConversationTarget::Conversation(c) => (Some(c.conversation_id.clone()), Some(c.contact_id.clone())),
            ConversationTarget::Contact { contact_id, .. } => (None, Some(contact_id.clone())),
        };

        let (path, direction) = match message.direction {
            Direction::Inbound => ("/conversations/messages/inbound", "inbound"),
            Direction::Outbound => ("/conversations/messages/outbound", "outbound"),
        };

        let payload = MessagePayload {
            message_type: message.message_type.as_str().to_string(),
            conversation_id,
            contact_id,
            message: message.body.clone(),
            attachments: message.media_urls.clone(),
            direction: direction.to_string(),
            alt_id: message.provider_message_id.clone(),
            date: message.timestamp.clone(),
        };

        let (status, body) = self.execute(Method::POST, path, &[], Some(&payload)).await?;
        if !status.is_success() {
            warn!("Append message failed: {} - {}", status, body);
            return Err(classify(status, &body));
        }

        debug!("Appended {} message for contact {}", direction, target.contact_id());
        Ok(())
    }

    async fn add_to_campaign(&self, contact_id: &str, campaign_id: &str, location_id: &str) -> CrmResult<()> {
        let path = format!("/contacts/{}/campaigns/{}", contact_id, campaign_id);
        let (status, body) = self
            .execute(Method::POST, &path, &[], Some(&serde_json::json!({})))
            .await?;

        if status == StatusCode::NOT_FOUND {
            return Err(CrmError::CampaignNotFound(campaign_id.to_string()));
        }
        if !status.is_success() {
            return Err(classify(status, &body));
        }

        info!("Added contact {} to campaign {} in {}", contact_id, campaign_id, location_id);
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> CrmResult<T> {
    serde_json::from_str(body)
        .map_err(|e| CrmError::InvalidResponse(format!("{} - {}", e, body)))
}

/// Map a non-success response to the CRM error taxonomy
fn classify(status: StatusCode, body: &str) -> CrmError {
    let detail = format!("{} - {}", status, body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CrmError::Unauthorized(detail),
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            CrmError::Validation(detail)
        }
        _ => CrmError::Unavailable(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use relay_core::{MessageType, PhoneNormalizer};

    fn client(base_url: &str) -> GhlClient {
        GhlClient::new(&GhlConfig {
            token: "pit-token".to_string(),
            base_url: base_url.to_string(),
            timeout_secs: 5,
            ..Default::default()
        })
        .unwrap()
    }

    fn phone() -> NormalizedPhoneNumber {
        PhoneNormalizer::default().normalize("0499000100")
    }

    #[test]
    fn test_client_requires_token() {
        let result = GhlClient::new(&GhlConfig::default());
        assert!(matches!(result, Err(GhlError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_list_locations() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/locations/search")
            .match_header("authorization", "Bearer pit-token")
            .match_header("version", "2021-07-28")
            .with_status(200)
            .with_body(r#"{"locations":[{"id":"loc_1","name":"Main"},{"id":"loc_2"}]}"#)
            .create_async()
            .await;

        let locations = client(&server.url()).list_locations().await.unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].id, "loc_1");
        assert_eq!(locations[0].name.as_deref(), Some("Main"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upsert_contact_reports_action() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/contacts/upsert")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(serde_json::json!({
                    "locationId": "loc_1",
                    "phone": "+61499000100"
                })),
                Matcher::Regex(r#""field_value":"hello""#.to_string()),
            ]))
            .with_status(201)
            .with_body(r#"{"new":true,"contact":{"id":"c_1","phone":"+61499000100"}}"#)
            .create_async()
            .await;

        let fields = vec![CustomField::new("last_incoming_message", "hello")];
        let upsert = client(&server.url())
            .upsert_contact(&phone(), "loc_1", &fields)
            .await
            .unwrap();

        assert_eq!(upsert.action, UpsertAction::Created);
        assert_eq!(upsert.contact.id, "c_1");
        assert_eq!(upsert.contact.location_id.as_deref(), Some("loc_1"));
    }

    #[tokio::test]
    async fn test_upsert_existing_contact_is_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/contacts/upsert")
            .with_status(200)
            .with_body(r#"{"new":false,"contact":{"id":"c_1"}}"#)
            .create_async()
            .await;

        let upsert = client(&server.url())
            .upsert_contact(&phone(), "loc_1", &[])
            .await
            .unwrap();
        assert_eq!(upsert.action, UpsertAction::Found);
    }

    #[tokio::test]
    async fn test_existing_conversation_is_reused() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/conversations/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("locationId".into(), "loc_1".into()),
                Matcher::UrlEncoded("contactId".into(), "c_1".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"conversations":[{"id":"conv_9"}]}"#)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/conversations/")
            .expect(0)
            .create_async()
            .await;

        let conversation = client(&server.url())
            .create_or_get_conversation("c_1", "loc_1", Channel::Sms)
            .await
            .unwrap();

        assert_eq!(conversation.conversation_id, "conv_9");
        assert_eq!(conversation.contact_id, "c_1");
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_conflicting_create_searches_again() {
        let mut server = mockito::Server::new_async().await;
        let first_search = server
            .mock("GET", "/conversations/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"conversations":[]}"#)
            .expect(1)
            .create_async()
            .await;
        let second_search = server
            .mock("GET", "/conversations/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"conversations":[{"id":"conv_x"}]}"#)
            .expect(1)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/conversations/")
            .with_status(409)
            .with_body(r#"{"message":"Conversation already exists"}"#)
            .expect(1)
            .create_async()
            .await;

        let conversation = client(&server.url())
            .create_or_get_conversation("c_1", "loc_1", Channel::Sms)
            .await
            .unwrap();

        assert_eq!(conversation.conversation_id, "conv_x");
        assert_eq!(conversation.contact_id, "c_1");
        first_search.assert_async().await;
        create.assert_async().await;
        second_search.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_conversation_is_created() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/conversations/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"conversations":[]}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/conversations/")
            .with_status(201)
            .with_body(r#"{"success":true,"conversation":{"id":"conv_new"}}"#)
            .create_async()
            .await;

        let conversation = client(&server.url())
            .create_or_get_conversation("c_1", "loc_1", Channel::Sms)
            .await
            .unwrap();
        assert_eq!(conversation.conversation_id, "conv_new");
    }

    #[tokio::test]
    async fn test_append_outbound_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/conversations/messages/outbound")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "type": "MMS",
                "conversationId": "conv_1",
                "message": "hi",
                "altId": "tb_1"
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let target = ConversationTarget::Conversation(CrmConversationRef {
            contact_id: "c_1".to_string(),
            conversation_id: "conv_1".to_string(),
            location_id: "loc_1".to_string(),
        });
        let message = CrmMessage {
            body: "hi".to_string(),
            message_type: MessageType::Mms,
            media_urls: vec!["https://example.com/a.jpg".to_string()],
            direction: Direction::Outbound,
            provider_message_id: Some("tb_1".to_string()),
            timestamp: None,
        };

        client(&server.url()).append_message(&target, &message).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_append_failure_maps_to_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/conversations/messages/inbound")
            .with_status(503)
            .create_async()
            .await;

        let target = ConversationTarget::Contact {
            contact_id: "c_1".to_string(),
            location_id: "loc_1".to_string(),
        };
        let message = CrmMessage {
            body: "hi".to_string(),
            message_type: MessageType::Sms,
            media_urls: vec![],
            direction: Direction::Inbound,
            provider_message_id: None,
            timestamp: None,
        };

        let err = client(&server.url()).append_message(&target, &message).await.unwrap_err();
        assert!(matches!(err, CrmError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_unknown_campaign() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/contacts/c_1/campaigns/camp_x")
            .with_status(404)
            .create_async()
            .await;

        let err = client(&server.url())
            .add_to_campaign("c_1", "camp_x", "loc_1")
            .await
            .unwrap_err();
        assert_eq!(err, CrmError::CampaignNotFound("camp_x".to_string()));
    }

    #[test]
    fn test_classify() {
        assert!(matches!(classify(StatusCode::UNAUTHORIZED, ""), CrmError::Unauthorized(_)));
        assert!(matches!(classify(StatusCode::UNPROCESSABLE_ENTITY, ""), CrmError::Validation(_)));
        assert!(matches!(classify(StatusCode::BAD_GATEWAY, ""), CrmError::Unavailable(_)));
        assert!(matches!(classify(StatusCode::TOO_MANY_REQUESTS, ""), CrmError::Unavailable(_)));
    }
}
