//! Inbound webhook event model.
//!
//! Only the subset of the Neynar webhook payload the pipeline consumes is
//! modelled. Unknown fields are ignored so upstream schema additions never
//! turn into rejected deliveries.
//!
//! Parsing happens in two steps: the envelope (`type` + `data`) is parsed for
//! every event, and `data` is only interpreted as a cast when the envelope type
//! is [`CAST_CREATED`]. Events of other types therefore parse successfully and
//! are ignored by the classifier rather than rejected as malformed.

use crate::{CastHash, Fid};
use serde::{Deserialize, Deserializer, Serialize};

/// The single event type the pipeline acts on.
pub const CAST_CREATED: &str = "cast.created";

/// Errors raised while parsing a verified webhook body
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventParseError {
    #[error("Body is not a valid webhook envelope: {message}")]
    InvalidEnvelope { message: String },

    #[error("Event data is not a valid cast: {message}")]
    InvalidCast { message: String },
}

/// A parsed webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    /// Envelope `type` field, e.g. `cast.created`
    pub kind: String,

    /// The cast payload, present only for [`CAST_CREATED`] events
    pub cast: Option<CastEvent>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl WebhookEvent {
    /// Parse a webhook body.
    ///
    /// Must only be called on bytes whose signature has already been accepted.
    pub fn parse(raw_body: &[u8]) -> Result<Self, EventParseError> {
        let envelope: Envelope =
            serde_json::from_slice(raw_body).map_err(|e| EventParseError::InvalidEnvelope {
                message: e.to_string(),
            })?;

        let cast = if envelope.kind == CAST_CREATED {
            let cast = serde_json::from_value::<CastEvent>(envelope.data).map_err(|e| {
                EventParseError::InvalidCast {
                    message: e.to_string(),
                }
            })?;
            Some(cast)
        } else {
            None
        };

        Ok(Self {
            kind: envelope.kind,
            cast,
        })
    }
}

/// A newly created cast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastEvent {
    /// Content hash of the cast; the event identity used for deduplication
    pub hash: CastHash,

    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub author: CastAuthor,

    #[serde(default)]
    pub mentioned_profiles: Vec<MentionedProfile>,
}

/// Author of a cast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastAuthor {
    #[serde(default, deserialize_with = "deserialize_optional_fid")]
    pub fid: Option<Fid>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub display_name: Option<String>,
}

/// A profile the cast explicitly mentions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionedProfile {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "deserialize_optional_fid")]
    pub fid: Option<Fid>,
}

/// Neynar sends FIDs as JSON numbers in some payloads and as strings in others.
#[derive(Deserialize)]
#[serde(untagged)]
enum FidRepr {
    Number(u64),
    Text(String),
}

fn deserialize_optional_fid<'de, D>(deserializer: D) -> Result<Option<Fid>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<FidRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(FidRepr::Number(id)) => Ok(Some(Fid::new(id))),
        Some(FidRepr::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(FidRepr::Text(text)) => text
            .parse::<Fid>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
