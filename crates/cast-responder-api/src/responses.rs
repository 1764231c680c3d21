//! Response types for the API.

use cast_responder_core::{CastHash, CorrelationId, IgnoreReason, PipelineOutcome, Timestamp};
use serde::{Deserialize, Serialize};

/// Webhook processing response
///
/// `status` is `success` when a reply was published and `ignored` when the
/// event was acknowledged without action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<IgnoreReason>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_hash: Option<CastHash>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_reply: Option<bool>,

    pub correlation_id: String,
}

impl WebhookResponse {
    /// Build the response for a pipeline outcome
    pub fn from_outcome(outcome: PipelineOutcome, correlation_id: &CorrelationId) -> Self {
        match outcome {
            PipelineOutcome::Responded { reply_hash, cached } => Self {
                status: "success".to_string(),
                reason: None,
                reply_hash: Some(reply_hash),
                cached_reply: Some(cached),
                correlation_id: correlation_id.to_string(),
            },
            PipelineOutcome::Ignored(reason) => Self {
                status: "ignored".to_string(),
                reason: Some(reason),
                reply_hash: None,
                cached_reply: None,
                correlation_id: correlation_id.to_string(),
            },
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub timestamp: Timestamp,
    pub pipeline: PipelineStats,
}

/// Snapshot of the pipeline's in-memory state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Accepted requests inside the current rate window
    pub rate_window_used: usize,
    pub rate_window_capacity: usize,
    pub dedup_entries: usize,
    pub cached_replies: usize,
}
