//! Outbound collaborator interfaces.
//!
//! The pipeline treats reply generation and cast publishing as opaque
//! capabilities. Concrete HTTP clients live in the service crate; tests plug
//! in recording mocks.

use crate::{CastHash, ErrorCategory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Types
// ============================================================================

/// A cast successfully published by the bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedCast {
    pub hash: CastHash,
}

/// Reaction types the bot can publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
}

impl ReactionKind {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Failure of an outbound generation or publish call
#[derive(Debug, thiserror::Error)]
pub enum DownstreamError {
    #[error("Request to {service} failed: {message}")]
    Transport { service: String, message: String },

    #[error("Request to {service} timed out")]
    Timeout { service: String },

    #[error("{service} rate limited the request")]
    RateLimited { service: String },

    #[error("{service} returned HTTP {status}: {message}")]
    HttpStatus {
        service: String,
        status: u16,
        message: String,
    },

    #[error("{service} returned an unusable response: {message}")]
    InvalidResponse { service: String, message: String },

    #[error("{service} rejected the credentials")]
    Unauthorized { service: String },
}

impl DownstreamError {
    /// Check if a later attempt might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Timeout { .. } => true,
            Self::RateLimited { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            Self::InvalidResponse { .. } => false,
            Self::Unauthorized { .. } => false,
        }
    }

    /// Get error category for monitoring
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized { .. } => ErrorCategory::Configuration,
            _ if self.is_transient() => ErrorCategory::Transient,
            _ => ErrorCategory::Permanent,
        }
    }

    /// Name of the collaborator that failed
    pub fn service(&self) -> &str {
        match self {
            Self::Transport { service, .. }
            | Self::Timeout { service }
            | Self::RateLimited { service }
            | Self::HttpStatus { service, .. }
            | Self::InvalidResponse { service, .. }
            | Self::Unauthorized { service } => service,
        }
    }
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Produces reply text for a cast
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Generate a reply to `text`
    async fn generate_reply(&self, text: &str) -> Result<String, DownstreamError>;
}

/// Publishes casts and reactions as the bot
#[async_trait]
pub trait CastPublisher: Send + Sync {
    /// Publish `text` as a reply to the cast identified by `parent`
    async fn publish_reply(
        &self,
        parent: &CastHash,
        text: &str,
    ) -> Result<PublishedCast, DownstreamError>;

    /// React to the cast identified by `target`
    async fn publish_reaction(
        &self,
        target: &CastHash,
        kind: ReactionKind,
    ) -> Result<(), DownstreamError>;
}
