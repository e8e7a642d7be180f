//! HTTP API Server
//!
//! Starts and manages the axum-based HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, Method, header},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use relay_core::ApiConfig;
use relay_sync::SyncEngine;

use crate::routes::routes;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    /// Bearer key for protected routes; open when `None`
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(engine: SyncEngine, api_key: Option<String>) -> Self {
        Self {
            engine: Arc::new(engine),
            api_key,
        }
    }
}

/// Build the router with CORS and per-request tracing
pub fn build_router(state: AppState, config: &ApiConfig) -> Router {
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        info_span!(
            "http_request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = %Uuid::new_v4(),
        )
    });

    Router::new()
        .merge(routes(state.clone()))
        .layer(cors_layer(config.allowed_origins.as_deref()))
        .layer(trace)
        .with_state(state)
}

fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let Some(origins) = allowed_origins.filter(|o| !o.is_empty() && !o.iter().any(|o| o == "*"))
    else {
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Start the HTTP API server; returns after Ctrl+C
pub async fn start_server(config: &ApiConfig, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state, config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("HTTP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use relay_core::testing::{CrmOperation, FakeProvider, InMemoryCrm};
    use relay_core::{CrmError, MessageStatus, PhoneNormalizer, ProviderError};
    use tower::ServiceExt;

    fn make_app(provider: Arc<FakeProvider>, crm: Arc<InMemoryCrm>, api_key: Option<&str>) -> Router {
        let engine = SyncEngine::new(provider, crm, PhoneNormalizer::default(), vec![]);
        let state = AppState::new(engine, api_key.map(String::from));
        build_router(state, &ApiConfig::default())
    }

    fn post_json(uri: &str, body: &str) -> Request {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 64)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = make_app(Arc::new(FakeProvider::new()), Arc::new(InMemoryCrm::default()), None);
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "OK");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_send_without_crm_ids() {
        let crm = Arc::new(InMemoryCrm::with_locations(&["loc_a"]));
        let app = make_app(Arc::new(FakeProvider::new()), crm.clone(), None);

        let resp = app
            .oneshot(post_json(
                "/api/send-and-sync",
                r#"{"to":"61499000100","from":"TestSender","message":"hi"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["synced"], false);
        assert_eq!(json["messageId"], "tb_msg_1");
        assert_eq!(json["provider"], "Tall Bob");
        assert_eq!(crm.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_relay_send_missing_fields() {
        let provider = Arc::new(FakeProvider::new());
        let app = make_app(provider.clone(), Arc::new(InMemoryCrm::default()), None);

        let resp = app
            .oneshot(post_json(
                "/webhooks/send-message",
                r#"{"to":"61499000100","message":"hi","from":""}"#,
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("from"));
        assert!(provider.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_send_bodies_get_json_errors() {
        let provider = Arc::new(FakeProvider::new());

        for uri in ["/api/send-and-sync", "/webhooks/send-message"] {
            let no_content_type = Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::from(r#"{"to":"61499000100","from":"TestSender","message":"hi"}"#))
                .unwrap();
            let truncated = post_json(uri, r#"{"to":"61499000100","from":"#);
            let numeric_to = post_json(uri, r#"{"to":61499000100,"from":"TestSender","message":"hi"}"#);

            let app = make_app(provider.clone(), Arc::new(InMemoryCrm::default()), None);
            let resp = app.oneshot(no_content_type).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{} without content-type", uri);

            for request in [truncated, numeric_to] {
                let app = make_app(provider.clone(), Arc::new(InMemoryCrm::default()), None);
                let resp = app.oneshot(request).await.unwrap();

                assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
                let json = body_json(resp).await;
                assert_eq!(json["success"], false);
                assert!(json["error"].as_str().unwrap().starts_with("Invalid request"));
            }
        }

        // Only the two well-formed bodies reached the provider
        assert_eq!(provider.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_provider_failure_status() {
        let provider = Arc::new(FakeProvider::failing(ProviderError::RateLimited(
            "slow down".to_string(),
        )));
        let app = make_app(provider, Arc::new(InMemoryCrm::default()), None);

        let resp = app
            .oneshot(post_json(
                "/api/send-and-sync",
                r#"{"to":"61499000100","from":"TestSender","message":"hi"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(resp).await;
        assert_eq!(json["kind"], "rate_limited");
    }

    #[tokio::test]
    async fn test_incoming_webhook_syncs_contact() {
        let crm = Arc::new(InMemoryCrm::with_locations(&["loc_a"]));
        let app = make_app(Arc::new(FakeProvider::new()), crm.clone(), None);

        let resp = app
            .oneshot(post_json(
                "/webhooks/tallbob/incoming",
                r#"{"type":"message_received_sms","from":"0499000100","to":"61400000000","body":"hello"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["received"], true);
        assert!(json.get("error").is_none());
        assert_eq!(crm.contacts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_incoming_webhook_always_acknowledges() {
        let crm = Arc::new(InMemoryCrm::with_locations(&["loc_a"]));
        crm.fail(
            CrmOperation::AppendMessage,
            CrmError::Unavailable("down".to_string()),
        )
        .await;
        let provider = Arc::new(FakeProvider::new());

        let bodies = [
            "not json",
            "",
            r#"{"type":"message_received_sms","from":"0499000100","body":"hello"}"#,
        ];

        for body in bodies {
            let app = make_app(provider.clone(), crm.clone(), Some("secret"));
            let resp = app
                .oneshot(post_json("/webhooks/tallbob/incoming", body))
                .await
                .unwrap();

            assert_eq!(resp.status(), StatusCode::OK, "body: {:?}", body);
            let json = body_json(resp).await;
            assert_eq!(json["received"], true);
            assert!(json["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_delivery_webhook() {
        let app = make_app(Arc::new(FakeProvider::new()), Arc::new(InMemoryCrm::default()), None);

        let resp = app
            .oneshot(post_json(
                "/webhooks/tallbob/delivery",
                r#"{"messageId":"tb_msg_1","status":"delivered"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["received"], true);
    }

    #[tokio::test]
    async fn test_api_key_required() {
        let provider = Arc::new(FakeProvider::new());
        let crm = Arc::new(InMemoryCrm::default());
        let body = r#"{"to":"61499000100","from":"TestSender","message":"hi"}"#;

        let app = make_app(provider.clone(), crm.clone(), Some("secret"));
        let resp = app.oneshot(post_json("/api/send-and-sync", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(provider.calls().await.is_empty());

        let mut request = post_json("/api/send-and-sync", body);
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        let app = make_app(provider.clone(), crm, Some("secret"));
        let resp = app.oneshot(request).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_message_status() {
        let provider = Arc::new(FakeProvider::new());
        provider
            .set_status(
                "tb_msg_7",
                MessageStatus {
                    status: "delivered".to_string(),
                    delivered_at: Some("2026-01-01T00:00:05Z".to_string()),
                    raw: serde_json::json!({"status": "delivered"}),
                },
            )
            .await;

        let app = make_app(provider.clone(), Arc::new(InMemoryCrm::default()), None);
        let resp = app
            .oneshot(Request::builder().uri("/api/status/tb_msg_7").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["messageId"], "tb_msg_7");
        assert_eq!(json["deliveredAt"], "2026-01-01T00:00:05Z");

        let app = make_app(provider, Arc::new(InMemoryCrm::default()), None);
        let resp = app
            .oneshot(Request::builder().uri("/api/status/unknown").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
