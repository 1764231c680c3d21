//! # Cast Responder Core
//!
//! Core logic for the Cast Responder webhook service.
//!
//! This crate contains the secure, idempotent event-ingestion pipeline: signature
//! verification over the raw request body, duplicate-event suppression, global
//! request-rate limiting, response memoization and mention classification.
//!
//! ## Architecture
//!
//! - Shared state (caches, rate window) is explicitly constructed and injected
//! - The reply generator and the cast publisher are abstracted behind traits
//! - HTTP concerns live in `cast-responder-api`; this crate never sees a socket
//!
//! ## Usage
//!
//! ```rust
//! use cast_responder_core::{CastHash, Fid};
//!
//! let hash = CastHash::new("0xfe90f9de682273e05b201629ad2338bdcd89b6be").unwrap();
//! let fid = Fid::new(3);
//! assert_eq!(fid.as_u64(), 3);
//! assert!(hash.as_str().starts_with("0x"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export commonly used types
pub use uuid::Uuid;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Unique identifier of a cast (content hash), used as the event identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CastHash(String);

impl CastHash {
    /// Maximum accepted length of a cast hash.
    pub const MAX_LENGTH: usize = 128;

    /// Create new cast hash with validation
    ///
    /// # Validation Rules
    /// - Must not be empty
    /// - Must be at most [`CastHash::MAX_LENGTH`] characters
    /// - Must contain only printable ASCII without whitespace
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();

        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "hash".to_string(),
            });
        }

        if value.len() > Self::MAX_LENGTH {
            return Err(ValidationError::TooLong {
                field: "hash".to_string(),
                max_length: Self::MAX_LENGTH,
            });
        }

        if !value.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ValidationError::InvalidCharacters {
                field: "hash".to_string(),
                invalid_chars: "non-ASCII or whitespace".to_string(),
            });
        }

        Ok(Self(value))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CastHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CastHash {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CastHash {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CastHash> for String {
    fn from(hash: CastHash) -> Self {
        hash.0
    }
}

/// Farcaster user identifier (numeric FID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fid(u64);

impl Fid {
    /// Create new FID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Fid {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim().parse::<u64>().map_err(|_| ParseError::InvalidFormat {
            expected: "positive integer".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self::new(id))
    }
}

/// Identifier for tracing requests across system boundaries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate new correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get string representation
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = s.parse::<Uuid>().map_err(|_| ParseError::InvalidFormat {
            expected: "UUID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(uuid))
    }
}

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp with microsecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Deployment environment enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Whether error details must be withheld from callers
    pub fn is_hardened(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl FromStr for Environment {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" | "stage" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(ParseError::InvalidFormat {
                expected: "development, staging, or production".to_string(),
                actual: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// High-level error categorization for logging and alerting decisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Temporary failures that may succeed on a later delivery
    Transient,
    /// Permanent failures that won't succeed on retry
    Permanent,
    /// Security-related failures requiring attention
    Security,
    /// Configuration errors preventing startup
    Configuration,
}

/// Error type for input validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },

    #[error("Field '{field}' contains invalid characters: {invalid_chars}")]
    InvalidCharacters {
        field: String,
        invalid_chars: String,
    },
}

/// Error type for string parsing failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

// ============================================================================
// Module declarations
// ============================================================================

/// HMAC-SHA256 webhook signature verification
pub mod signature;

/// Global sliding-window rate limiting
pub mod rate_limit;

/// Bounded, time-expiring caches for deduplication and reply memoization
pub mod cache;

/// Inbound webhook event model
pub mod event;

/// Relevance classification of verified events
pub mod classifier;

/// Outbound collaborator interfaces
pub mod downstream;

/// Request-handling state machine
pub mod pipeline;

// Re-export key types for convenience
pub use cache::{CacheConfig, DeduplicationCache, ResponseCache, TtlLruCache};
pub use classifier::{BotIdentity, Classification, EventClassifier, IgnoreReason};
pub use downstream::{CastPublisher, DownstreamError, PublishedCast, ReactionKind, ReplyGenerator};
pub use event::{
    CastAuthor, CastEvent, EventParseError, MentionedProfile, WebhookEvent, CAST_CREATED,
};
pub use pipeline::{
    MentionPipeline, PipelineConfig, PipelineError, PipelineOutcome, PipelineStage,
    WebhookRequest,
};
pub use rate_limit::{RateLimitConfig, SlidingWindowRateLimiter};
pub use signature::{compute_signature, verify, SignatureVerifier, SIGNATURE_HEADER};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
