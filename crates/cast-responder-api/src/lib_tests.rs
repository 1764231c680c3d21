//! Tests for routing, middleware and the webhook handler.

use super::*;
use async_trait::async_trait;
use axum::{body::Body, http::StatusCode};
use cast_responder_core::{
    compute_signature, CastHash, CastPublisher, DownstreamError, PublishedCast, ReactionKind,
    ReplyGenerator, SignatureVerifier,
};
use http_body_util::BodyExt;
use tower::ServiceExt;

const SECRET: &str = "router-secret";

// ============================================================================
// Test doubles
// ============================================================================

struct EchoGenerator;

#[async_trait]
impl ReplyGenerator for EchoGenerator {
    async fn generate_reply(&self, text: &str) -> Result<String, DownstreamError> {
        Ok(format!("echo: {}", text))
    }
}

struct StaticPublisher;

#[async_trait]
impl CastPublisher for StaticPublisher {
    async fn publish_reply(
        &self,
        _parent: &CastHash,
        _text: &str,
    ) -> Result<PublishedCast, DownstreamError> {
        Ok(PublishedCast {
            hash: CastHash::new("0xreply").unwrap(),
        })
    }

    async fn publish_reaction(
        &self,
        _target: &CastHash,
        _kind: ReactionKind,
    ) -> Result<(), DownstreamError> {
        Ok(())
    }
}

fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.webhook.signing_secret = SECRET.to_string();
    config.bot.username = "mienfoo.eth".to_string();
    config.bot.fid = 191;
    config.server.max_body_size = 1024;
    config
}

fn test_router(config: ServiceConfig) -> Router {
    let pipeline = MentionPipeline::new(
        SignatureVerifier::new(config.webhook.signing_secret.clone()),
        config.bot_identity(),
        config.pipeline_config(),
        Arc::new(EchoGenerator),
        Arc::new(StaticPublisher),
    );
    create_router(AppState::new(config, Arc::new(pipeline)))
}

fn signed_post(path: &str, body: &str) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header(
            SIGNATURE_HEADER,
            compute_signature(SECRET.as_bytes(), body.as_bytes()),
        )
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_mentioning_cast_is_answered() {
    let body = r#"{"type":"cast.created","data":{"hash":"0xabc","text":"@mienfoo.eth hi","author":{"fid":5,"username":"alice"}}}"#;

    let response = test_router(test_config())
        .oneshot(signed_post("/webhook", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "success");
    assert_eq!(json["reply_hash"], "0xreply");
}

#[tokio::test]
async fn test_custom_endpoint_path_is_served() {
    let mut config = test_config();
    config.webhook.endpoint_path = "/hooks/neynar".to_string();
    let body = r#"{"type":"follow.created","data":{}}"#;

    let response = test_router(config)
        .oneshot(signed_post("/hooks/neynar", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ignored");
    assert_eq!(json["reason"], "wrong-event-type");
}

#[tokio::test]
async fn test_unsupported_method_rejected_with_allow_header() {
    for method in ["PUT", "DELETE", "PATCH"] {
        let request = axum::http::Request::builder()
            .method(method)
            .uri("/webhook")
            .body(Body::empty())
            .unwrap();

        let response = test_router(test_config()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);
        assert_eq!(response.headers()[header::ALLOW], "GET, POST");
        let json = json_body(response).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], 405);
    }
}

#[tokio::test]
async fn test_get_on_webhook_path_serves_health() {
    let request = axum::http::Request::builder()
        .uri("/webhook")
        .body(Body::empty())
        .unwrap();

    let response = test_router(test_config()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["pipeline"]["rate_window_capacity"], 30);
}

#[tokio::test]
async fn test_health_endpoint() {
    let request = axum::http::Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = test_router(test_config()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["environment"], "development");
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let body = format!(
        r#"{{"type":"cast.created","data":{{"hash":"0x1","text":"{}"}}}}"#,
        "x".repeat(2048)
    );

    let response = test_router(test_config())
        .oneshot(signed_post("/webhook", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_missing_signature_is_unauthorized() {
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/webhook")
        .body(Body::from(r#"{"type":"cast.created","data":{"hash":"0x1"}}"#))
        .unwrap();

    let response = test_router(test_config()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Correlation IDs
// ============================================================================

#[tokio::test]
async fn test_supplied_correlation_id_is_echoed() {
    let supplied = "6f9619ff-8b86-4d01-b42d-00cf4fc964ff";
    let request = axum::http::Request::builder()
        .uri("/health")
        .header(CORRELATION_HEADER, supplied)
        .body(Body::empty())
        .unwrap();

    let response = test_router(test_config()).oneshot(request).await.unwrap();

    assert_eq!(response.headers()[CORRELATION_HEADER], supplied);
}

#[tokio::test]
async fn test_correlation_id_generated_when_absent_or_invalid() {
    for supplied in [None, Some("not-a-uuid")] {
        let mut builder = axum::http::Request::builder().uri("/health");
        if let Some(value) = supplied {
            builder = builder.header(CORRELATION_HEADER, value);
        }
        let request = builder.body(Body::empty()).unwrap();

        let response = test_router(test_config()).oneshot(request).await.unwrap();

        let header = response.headers()[CORRELATION_HEADER].to_str().unwrap();
        assert!(header.parse::<CorrelationId>().is_ok());
    }
}

#[tokio::test]
async fn test_error_body_carries_same_correlation_id_as_header() {
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/webhook")
        .body(Body::from("{}"))
        .unwrap();

    let response = test_router(test_config()).oneshot(request).await.unwrap();

    let header = response.headers()[CORRELATION_HEADER]
        .to_str()
        .unwrap()
        .to_string();
    let json = json_body(response).await;
    assert_eq!(json["correlation_id"], header);
}
