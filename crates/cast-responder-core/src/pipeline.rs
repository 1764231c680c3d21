//! Request-handling state machine.
//!
//! [`MentionPipeline`] sequences the ingestion components for one webhook
//! delivery whose method has been checked and whose body has been read:
//!
//! ```text
//! RateChecked -> SignatureVerified -> Parsed -> Classified -> Responded
//!      |               |                |           |
//!   429 error       401 error        400 error   200 ignored
//! ```
//!
//! Nothing observable changes before the signature is accepted. The rate check
//! that precedes verification is a read-only probe; the window slot is claimed
//! only once the request is authenticated.

use crate::cache::{CacheConfig, DeduplicationCache, ResponseCache};
use crate::classifier::{BotIdentity, Classification, EventClassifier, IgnoreReason};
use crate::downstream::{CastPublisher, DownstreamError, ReactionKind, ReplyGenerator};
use crate::event::{CastEvent, WebhookEvent};
use crate::rate_limit::{RateLimitConfig, SlidingWindowRateLimiter};
use crate::signature::SignatureVerifier;
use crate::{CastHash, CorrelationId, ErrorCategory, Timestamp};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Request and Outcome Types
// ============================================================================

/// A captured webhook delivery, immutable once built.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Value of the signature header, if present
    pub signature: Option<String>,

    /// Value of the `content-type` header, if present
    pub content_type: Option<String>,

    /// Body bytes exactly as received
    pub body: Bytes,

    pub correlation_id: CorrelationId,
    pub received_at: Timestamp,
}

impl WebhookRequest {
    /// Capture a request with a fresh receive timestamp
    pub fn new(
        signature: Option<String>,
        content_type: Option<String>,
        body: Bytes,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            signature,
            content_type,
            body,
            correlation_id,
            received_at: Timestamp::now(),
        }
    }
}

/// States of the request-handling state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Start,
    MethodChecked,
    BodyRead,
    RateChecked,
    SignatureVerified,
    Parsed,
    Classified,
    Responded,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::MethodChecked => "method_checked",
            Self::BodyRead => "body_read",
            Self::RateChecked => "rate_checked",
            Self::SignatureVerified => "signature_verified",
            Self::Parsed => "parsed",
            Self::Classified => "classified",
            Self::Responded => "responded",
        };
        f.write_str(name)
    }
}

/// Successful terminal states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// A reply was published
    Responded {
        reply_hash: CastHash,
        /// Whether the reply text came from the response cache
        cached: bool,
    },

    /// The event was valid but did not warrant a reply
    Ignored(IgnoreReason),
}

/// Rejections raised by the pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Request rate limit exceeded")]
    RateLimited { retry_after: Duration },

    #[error("Missing or invalid webhook signature")]
    Unauthorized,

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("Downstream call failed: {0}")]
    Downstream(#[from] DownstreamError),
}

impl PipelineError {
    /// Stage at which the request was rejected
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::RateLimited { .. } => PipelineStage::RateChecked,
            Self::Unauthorized => PipelineStage::SignatureVerified,
            Self::MalformedPayload { .. } => PipelineStage::Parsed,
            Self::Downstream(_) => PipelineStage::Responded,
        }
    }

    /// Get error category for monitoring
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::RateLimited { .. } => ErrorCategory::Transient,
            Self::Unauthorized => ErrorCategory::Security,
            Self::MalformedPayload { .. } => ErrorCategory::Permanent,
            Self::Downstream(e) => e.error_category(),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Bounds for the pipeline's shared state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub rate_limit: RateLimitConfig,
    pub dedup: CacheConfig,
    pub response_cache: CacheConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            dedup: CacheConfig::deduplication(),
            response_cache: CacheConfig::responses(),
        }
    }
}

/// Orchestrates verification, filtering and the reply for each delivery.
///
/// Owns the process-wide rate window and caches. Construct one per process
/// and share it behind an `Arc`; tests build isolated instances.
pub struct MentionPipeline {
    verifier: SignatureVerifier,
    limiter: SlidingWindowRateLimiter,
    dedup: Arc<DeduplicationCache>,
    responses: ResponseCache,
    classifier: EventClassifier,
    generator: Arc<dyn ReplyGenerator>,
    publisher: Arc<dyn CastPublisher>,
}

impl MentionPipeline {
    pub fn new(
        verifier: SignatureVerifier,
        bot: BotIdentity,
        config: PipelineConfig,
        generator: Arc<dyn ReplyGenerator>,
        publisher: Arc<dyn CastPublisher>,
    ) -> Self {
        let dedup = Arc::new(DeduplicationCache::new(config.dedup));
        Self {
            verifier,
            limiter: SlidingWindowRateLimiter::new(config.rate_limit),
            classifier: EventClassifier::new(bot, Arc::clone(&dedup)),
            dedup,
            responses: ResponseCache::new(config.response_cache),
            generator,
            publisher,
        }
    }

    pub fn rate_limiter(&self) -> &SlidingWindowRateLimiter {
        &self.limiter
    }

    pub fn dedup_cache(&self) -> &DeduplicationCache {
        &self.dedup
    }

    pub fn response_cache(&self) -> &ResponseCache {
        &self.responses
    }

    pub fn bot(&self) -> &BotIdentity {
        self.classifier.bot()
    }

    /// Run one delivery through the pipeline.
    pub async fn process(
        &self,
        request: &WebhookRequest,
    ) -> Result<PipelineOutcome, PipelineError> {
        self.process_at(request, Instant::now()).await
    }

    /// [`process`](Self::process) with an explicit clock for the rate window
    /// and caches.
    #[instrument(
        skip(self, request, now),
        fields(
            correlation_id = %request.correlation_id,
            received_at = %request.received_at,
            body_len = request.body.len()
        )
    )]
    pub async fn process_at(
        &self,
        request: &WebhookRequest,
        now: Instant,
    ) -> Result<PipelineOutcome, PipelineError> {
        if !self.limiter.would_admit(now) {
            return Err(self.rate_limited(now));
        }
        debug!(stage = %PipelineStage::RateChecked, "Rate window has capacity");

        if !self
            .verifier
            .verify(&request.body, request.signature.as_deref())
        {
            warn!(
                signature_present = request.signature.is_some(),
                "Rejecting webhook with invalid signature"
            );
            return Err(PipelineError::Unauthorized);
        }

        // Another authenticated request may have taken the last slot since
        // the probe above.
        if !self.limiter.try_acquire(now) {
            return Err(self.rate_limited(now));
        }
        debug!(stage = %PipelineStage::SignatureVerified, "Signature accepted");

        if let Some(content_type) = request.content_type.as_deref() {
            if !content_type.starts_with("application/json") {
                debug!(content_type, "Unexpected content type, parsing as JSON anyway");
            }
        }

        let event = WebhookEvent::parse(&request.body).map_err(|e| {
            warn!(error = %e, "Rejecting malformed webhook payload");
            PipelineError::MalformedPayload {
                message: e.to_string(),
            }
        })?;
        debug!(stage = %PipelineStage::Parsed, event_type = %event.kind, "Payload parsed");

        let cast = match self.classifier.classify_at(event, now) {
            Classification::Ignored(reason) => {
                info!(reason = %reason, "Acknowledging event without reply");
                return Ok(PipelineOutcome::Ignored(reason));
            }
            Classification::Actionable(cast) => cast,
        };
        debug!(stage = %PipelineStage::Classified, cast_hash = %cast.hash, "Cast is actionable");

        self.respond(cast, now).await
    }

    async fn respond(
        &self,
        cast: CastEvent,
        now: Instant,
    ) -> Result<PipelineOutcome, PipelineError> {
        if let Err(e) = self
            .publisher
            .publish_reaction(&cast.hash, ReactionKind::Like)
            .await
        {
            warn!(
                cast_hash = %cast.hash,
                error = %e,
                "Failed to like cast, continuing with reply"
            );
        }

        let prompt = self.prompt_for(&cast);
        let (reply, cached) = match self.responses.get_at(&prompt, now) {
            Some(reply) => {
                debug!(cast_hash = %cast.hash, "Using cached reply");
                (reply, true)
            }
            None => {
                let reply = self.generator.generate_reply(&prompt).await.map_err(|e| {
                    warn!(cast_hash = %cast.hash, error = %e, "Reply generation failed");
                    e
                })?;
                self.responses.set_at(&prompt, reply.clone(), now);
                (reply, false)
            }
        };

        let published = self
            .publisher
            .publish_reply(&cast.hash, &reply)
            .await
            .map_err(|e| {
                warn!(cast_hash = %cast.hash, error = %e, "Reply publish failed");
                e
            })?;

        info!(
            stage = %PipelineStage::Responded,
            cast_hash = %cast.hash,
            reply_hash = %published.hash,
            cached,
            "Published reply"
        );

        Ok(PipelineOutcome::Responded {
            reply_hash: published.hash,
            cached,
        })
    }

    /// Cast text with the bot handle removed, falling back to the raw text
    /// when nothing else remains.
    fn prompt_for(&self, cast: &CastEvent) -> String {
        let stripped = self.classifier.bot().strip_mention(&cast.text);
        if stripped.is_empty() {
            cast.text.trim().to_string()
        } else {
            stripped
        }
    }

    fn rate_limited(&self, now: Instant) -> PipelineError {
        let retry_after = self.limiter.retry_after(now);
        warn!(
            retry_after_ms = retry_after.as_millis() as u64,
            "Rejecting webhook, rate limit exceeded"
        );
        PipelineError::RateLimited { retry_after }
    }
}

impl fmt::Debug for MentionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MentionPipeline")
            .field("verifier", &self.verifier)
            .field("limiter", &self.limiter)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
