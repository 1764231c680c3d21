//! Relevance classification of verified events.

use crate::cache::DeduplicationCache;
use crate::event::{CastEvent, WebhookEvent};
use crate::Fid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// The bot's own identity on the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    /// Username without the leading `@`
    pub username: String,
    pub fid: Fid,
}

impl BotIdentity {
    /// Create an identity, stripping any leading `@` from the username
    pub fn new(username: impl Into<String>, fid: Fid) -> Self {
        let username = username.into();
        let username = username.trim().trim_start_matches('@').to_string();
        Self { username, fid }
    }

    /// The `@username` form used in free text
    pub fn handle(&self) -> String {
        format!("@{}", self.username)
    }

    /// Whether `cast` mentions this identity, either through its structured
    /// mention list or as a case-insensitive `@username` in the text.
    pub fn is_mentioned_in(&self, cast: &CastEvent) -> bool {
        let listed = cast.mentioned_profiles.iter().any(|profile| {
            profile.fid == Some(self.fid)
                || profile
                    .username
                    .as_deref()
                    .is_some_and(|name| {
                        name.trim_start_matches('@')
                            .eq_ignore_ascii_case(&self.username)
                    })
        });

        listed || !self.mention_spans(&cast.text).is_empty()
    }

    /// Remove every `@username` mention from `text` and trim the ends.
    ///
    /// Whitespace between the remaining words is kept as sent.
    pub fn strip_mention(&self, text: &str) -> String {
        let mut stripped = String::with_capacity(text.len());
        let mut cursor = 0;
        for (start, end) in self.mention_spans(text) {
            stripped.push_str(&text[cursor..start]);
            cursor = end;
        }
        stripped.push_str(&text[cursor..]);

        stripped.trim().to_string()
    }

    /// Byte ranges of whole-handle mentions in `text`.
    ///
    /// A match must not be glued to a longer handle on either side, so
    /// `@mienfoo.ethereum` and `me@mienfoo.eth` do not count. A trailing
    /// sentence period is allowed.
    fn mention_spans(&self, text: &str) -> Vec<(usize, usize)> {
        // ASCII case folding keeps byte offsets identical between the two strings.
        let handle = self.handle().to_ascii_lowercase();
        let lowered = text.to_ascii_lowercase();

        let mut spans = Vec::new();
        let mut cursor = 0;
        while let Some(found) = lowered[cursor..].find(&handle) {
            let start = cursor + found;
            let end = start + handle.len();

            let before = text[..start].chars().next_back();
            let mut after = text[end..].chars();
            let glued_before = before.is_some_and(is_handle_char);
            let glued_after = match after.next() {
                Some('.') => after.next().is_some_and(is_handle_char),
                Some(c) => is_handle_char(c),
                None => false,
            };

            if !glued_before && !glued_after {
                spans.push((start, end));
            }
            cursor = end;
        }
        spans
    }
}

fn is_handle_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

impl fmt::Display for BotIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{} (fid {})", self.username, self.fid)
    }
}

/// Why a valid event was acknowledged without action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IgnoreReason {
    WrongEventType,
    Duplicate,
    NotMentioned,
}

impl IgnoreReason {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WrongEventType => "wrong-event-type",
            Self::Duplicate => "duplicate",
            Self::NotMentioned => "not-mentioned",
        }
    }
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Ignored(IgnoreReason),
    /// The cast warrants a reply
    Actionable(CastEvent),
}

/// Decides whether a verified event should trigger a reply.
///
/// Rules are applied in a fixed order:
/// 1. unsupported event type
/// 2. duplicate delivery (marks the event as seen on first delivery)
/// 3. bot not mentioned
///
/// Duplicate suppression runs before mention matching, so a redelivered event
/// never re-triggers a reply.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    bot: BotIdentity,
    dedup: Arc<DeduplicationCache>,
}

impl EventClassifier {
    pub fn new(bot: BotIdentity, dedup: Arc<DeduplicationCache>) -> Self {
        Self { bot, dedup }
    }

    /// Get the bot identity used for mention matching
    pub fn bot(&self) -> &BotIdentity {
        &self.bot
    }

    /// Classify `event`, marking its identity as seen when it is a cast.
    pub fn classify(&self, event: WebhookEvent) -> Classification {
        self.classify_at(event, Instant::now())
    }

    /// [`classify`](Self::classify) with an explicit clock.
    pub fn classify_at(&self, event: WebhookEvent, now: Instant) -> Classification {
        let cast = match event.cast {
            Some(cast) if event.kind == crate::event::CAST_CREATED => cast,
            _ => {
                debug!(event_type = %event.kind, "Ignoring unsupported event type");
                return Classification::Ignored(IgnoreReason::WrongEventType);
            }
        };

        if !self.dedup.check_and_mark_at(cast.hash.as_str(), now) {
            debug!(cast_hash = %cast.hash, "Ignoring duplicate delivery");
            return Classification::Ignored(IgnoreReason::Duplicate);
        }

        if !self.bot.is_mentioned_in(&cast) {
            debug!(cast_hash = %cast.hash, "Ignoring cast without a bot mention");
            return Classification::Ignored(IgnoreReason::NotMentioned);
        }

        Classification::Actionable(cast)
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
