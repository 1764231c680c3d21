//! Neynar API client.
//!
//! Publishes replies and reactions through a Neynar managed signer.

use crate::retry::{retry_transient, RetryPolicy};
use crate::{check_status, endpoint_url, map_send_error, ClientBuildError};
use async_trait::async_trait;
use cast_responder_api::config::NeynarConfig;
use cast_responder_core::{CastHash, CastPublisher, DownstreamError, PublishedCast, ReactionKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

const SERVICE: &str = "neynar";
const API_KEY_HEADER: &str = "x-api-key";
const IDEMPOTENCY_KEY_LEN: usize = 16;

/// Idempotency key for a reply to `parent`
///
/// Derived from the parent hash, so every attempt at replying to the same
/// cast carries the same key and Neynar publishes at most one of them.
pub fn reply_idempotency_key(parent: &CastHash) -> String {
    let hex = parent.as_str().trim_start_matches("0x");
    hex.chars().take(IDEMPOTENCY_KEY_LEN).collect()
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct PublishCastRequest<'a> {
    signer_uuid: &'a str,
    text: &'a str,
    parent: &'a str,
    idem: &'a str,
}

#[derive(Debug, Deserialize)]
struct PublishCastResponse {
    cast: PublishedCastBody,
}

#[derive(Debug, Deserialize)]
struct PublishedCastBody {
    hash: String,
}

#[derive(Debug, Serialize)]
struct ReactionRequest<'a> {
    signer_uuid: &'a str,
    reaction_type: ReactionKind,
    target: &'a str,
}

// ============================================================================
// Client
// ============================================================================

/// [`CastPublisher`] backed by the Neynar v2 REST API
#[derive(Clone)]
pub struct NeynarClient {
    http: reqwest::Client,
    cast_url: String,
    reaction_url: String,
    api_key: String,
    signer_uuid: String,
    retry: RetryPolicy,
}

impl NeynarClient {
    /// Build a client from configuration
    pub fn new(config: &NeynarConfig) -> Result<Self, ClientBuildError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("cast-responder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientBuildError::Http {
                service: SERVICE.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            cast_url: endpoint_url(SERVICE, &config.base_url, "/v2/farcaster/cast")?,
            reaction_url: endpoint_url(SERVICE, &config.base_url, "/v2/farcaster/reaction")?,
            api_key: config.api_key.clone(),
            signer_uuid: config.signer_uuid.clone(),
            retry: RetryPolicy::with_max_retries(config.max_retries),
        })
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response, DownstreamError> {
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| map_send_error(SERVICE, e))?;

        check_status(SERVICE, response).await
    }
}

#[async_trait]
impl CastPublisher for NeynarClient {
    #[instrument(skip(self, parent, text), fields(parent = %parent))]
    async fn publish_reply(
        &self,
        parent: &CastHash,
        text: &str,
    ) -> Result<PublishedCast, DownstreamError> {
        let idem = reply_idempotency_key(parent);
        let request = PublishCastRequest {
            signer_uuid: &self.signer_uuid,
            text,
            parent: parent.as_str(),
            idem: &idem,
        };

        let body: PublishCastResponse = retry_transient(&self.retry, "publish_reply", || async {
            let response = self.post_json(&self.cast_url, &request).await?;
            response
                .json::<PublishCastResponse>()
                .await
                .map_err(|e| DownstreamError::InvalidResponse {
                    service: SERVICE.to_string(),
                    message: e.to_string(),
                })
        })
        .await?;

        let hash = CastHash::new(body.cast.hash).map_err(|e| DownstreamError::InvalidResponse {
            service: SERVICE.to_string(),
            message: e.to_string(),
        })?;

        debug!(reply_hash = %hash, "Reply published");
        Ok(PublishedCast { hash })
    }

    #[instrument(skip(self, target), fields(cast = %target))]
    async fn publish_reaction(
        &self,
        target: &CastHash,
        kind: ReactionKind,
    ) -> Result<(), DownstreamError> {
        let request = ReactionRequest {
            signer_uuid: &self.signer_uuid,
            reaction_type: kind,
            target: target.as_str(),
        };

        retry_transient(&self.retry, "publish_reaction", || async {
            self.post_json(&self.reaction_url, &request).await.map(|_| ())
        })
        .await
    }
}

// Security: Don't expose credentials in debug output
impl fmt::Debug for NeynarClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeynarClient")
            .field("cast_url", &self.cast_url)
            .field("reaction_url", &self.reaction_url)
            .field("api_key", &"<REDACTED>")
            .field("signer_uuid", &"<REDACTED>")
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
#[path = "neynar_tests.rs"]
mod tests;
