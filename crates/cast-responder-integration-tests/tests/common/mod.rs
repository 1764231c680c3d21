//! Common test utilities for cast-responder integration tests
//!
//! This module provides:
//! - Recording mocks for the reply generator and cast publisher
//! - A router factory wired like the production service
//! - Builders for signed webhook deliveries

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use cast_responder_api::{create_router, AppState, ServiceConfig};
use cast_responder_core::{
    compute_signature, CastHash, CastPublisher, DownstreamError, MentionPipeline, PublishedCast,
    ReactionKind, ReplyGenerator, SignatureVerifier, SIGNATURE_HEADER,
};
use http_body_util::BodyExt;
use std::sync::{Arc, Mutex};

pub const SIGNING_SECRET: &str = "integration-secret";
pub const BOT_USERNAME: &str = "mienfoo.eth";
pub const BOT_FID: u64 = 191;

// ============================================================================
// Mock Reply Generator
// ============================================================================

/// Generator that records prompts and answers with a fixed reply
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct MockGenerator {
    prompts: Arc<Mutex<Vec<String>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockGenerator {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    #[allow(dead_code)]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ReplyGenerator for MockGenerator {
    async fn generate_reply(&self, text: &str) -> Result<String, DownstreamError> {
        self.prompts.lock().unwrap().push(text.to_string());

        if *self.fail.lock().unwrap() {
            return Err(DownstreamError::HttpStatus {
                service: "generator".to_string(),
                status: 503,
                message: "model overloaded at 10.1.2.3".to_string(),
            });
        }

        Ok(format!("reply to: {}", text))
    }
}

// ============================================================================
// Mock Cast Publisher
// ============================================================================

/// Publisher that records replies and reactions
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct MockPublisher {
    replies: Arc<Mutex<Vec<(String, String)>>>,
    reactions: Arc<Mutex<Vec<(String, ReactionKind)>>>,
}

impl MockPublisher {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    /// `(parent hash, text)` of every published reply
    #[allow(dead_code)]
    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn reactions(&self) -> Vec<(String, ReactionKind)> {
        self.reactions.lock().unwrap().clone()
    }
}

#[async_trait]
impl CastPublisher for MockPublisher {
    async fn publish_reply(
        &self,
        parent: &CastHash,
        text: &str,
    ) -> Result<PublishedCast, DownstreamError> {
        let mut replies = self.replies.lock().unwrap();
        replies.push((parent.to_string(), text.to_string()));

        Ok(PublishedCast {
            hash: CastHash::new(format!("0xreply{}", replies.len())).unwrap(),
        })
    }

    async fn publish_reaction(
        &self,
        target: &CastHash,
        kind: ReactionKind,
    ) -> Result<(), DownstreamError> {
        self.reactions
            .lock()
            .unwrap()
            .push((target.to_string(), kind));
        Ok(())
    }
}

// ============================================================================
// Test Application
// ============================================================================

/// Router plus handles on its collaborators
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub generator: MockGenerator,
    pub publisher: MockPublisher,
    pub pipeline: Arc<MentionPipeline>,
}

/// Configuration that passes validation
#[allow(dead_code)]
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.webhook.signing_secret = SIGNING_SECRET.to_string();
    config.bot.username = BOT_USERNAME.to_string();
    config.bot.fid = BOT_FID;
    config.neynar.api_key = "neynar-key".to_string();
    config.neynar.signer_uuid = "signer".to_string();
    config.generator.api_key = "sk-test".to_string();
    config
}

#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(test_config())
}

#[allow(dead_code)]
pub fn create_test_app_with(config: ServiceConfig) -> TestApp {
    let generator = MockGenerator::new();
    let publisher = MockPublisher::new();

    let pipeline = Arc::new(MentionPipeline::new(
        SignatureVerifier::new(config.webhook.signing_secret.clone()),
        config.bot_identity(),
        config.pipeline_config(),
        Arc::new(generator.clone()),
        Arc::new(publisher.clone()),
    ));

    TestApp {
        router: create_router(AppState::new(config, pipeline.clone())),
        generator,
        publisher,
        pipeline,
    }
}

// ============================================================================
// Request Builders
// ============================================================================

/// A `cast.created` payload
#[allow(dead_code)]
pub fn cast_created(hash: &str, text: &str, author_fid: u64, author_username: &str) -> String {
    serde_json::json!({
        "created_at": 1_700_000_000,
        "type": "cast.created",
        "data": {
            "object": "cast",
            "hash": hash,
            "thread_hash": hash,
            "text": text,
            "timestamp": "2024-11-14T22:13:20.000Z",
            "author": {
                "object": "user",
                "fid": author_fid,
                "username": author_username,
                "display_name": "Test Author"
            },
            "mentioned_profiles": [],
            "embeds": []
        }
    })
    .to_string()
}

/// A POST to `/webhook` signed with the test secret
#[allow(dead_code)]
pub fn signed_webhook(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header(
            SIGNATURE_HEADER,
            compute_signature(SIGNING_SECRET.as_bytes(), body.as_bytes()),
        )
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// A POST to `/webhook` with no signature header
#[allow(dead_code)]
pub fn unsigned_webhook(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[allow(dead_code)]
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
