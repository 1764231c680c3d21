//! Reply generation through an OpenAI-compatible chat completions API.

use crate::retry::{retry_transient, RetryPolicy};
use crate::{check_status, endpoint_url, map_send_error, ClientBuildError};
use async_trait::async_trait;
use cast_responder_api::config::GeneratorConfig;
use cast_responder_core::{DownstreamError, ReplyGenerator};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

const SERVICE: &str = "generator";

/// Longest reply Farcaster accepts, in bytes
pub const MAX_REPLY_BYTES: usize = 320;

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

/// [`ReplyGenerator`] backed by a chat completions endpoint
#[derive(Clone)]
pub struct OpenAiReplyGenerator {
    http: reqwest::Client,
    completions_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl OpenAiReplyGenerator {
    /// Build a generator from configuration
    pub fn new(config: &GeneratorConfig) -> Result<Self, ClientBuildError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ClientBuildError::Http {
                service: SERVICE.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            completions_url: endpoint_url(SERVICE, &config.base_url, "/chat/completions")?,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            retry: RetryPolicy::with_max_retries(config.max_retries),
        })
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn complete(&self, text: &str) -> Result<String, DownstreamError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error(SERVICE, e))?;

        let response = check_status(SERVICE, response).await?;

        let body: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| DownstreamError::InvalidResponse {
                    service: SERVICE.to_string(),
                    message: e.to_string(),
                })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(DownstreamError::InvalidResponse {
                service: SERVICE.to_string(),
                message: "completion contained no text".to_string(),
            });
        }

        Ok(content)
    }
}

#[async_trait]
impl ReplyGenerator for OpenAiReplyGenerator {
    #[instrument(skip(self, text), fields(model = %self.model))]
    async fn generate_reply(&self, text: &str) -> Result<String, DownstreamError> {
        let reply = retry_transient(&self.retry, "generate_reply", || self.complete(text)).await?;
        let reply = truncate_on_char_boundary(&reply, MAX_REPLY_BYTES);

        debug!(reply_bytes = reply.len(), "Reply generated");
        Ok(reply.to_string())
    }
}

/// Longest prefix of `text` that fits in `max_bytes` without splitting a character
pub fn truncate_on_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }

    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].trim_end()
}

impl fmt::Debug for OpenAiReplyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiReplyGenerator")
            .field("completions_url", &self.completions_url)
            .field("api_key", &"<REDACTED>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
#[path = "generator_tests.rs"]
mod tests;
