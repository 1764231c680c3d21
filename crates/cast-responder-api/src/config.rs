//! Configuration types for the HTTP service
//!
//! Every field carries a serde default so partial files and environment
//! overrides compose. Credentials have no usable default; [`ServiceConfig::validate`]
//! rejects a configuration that is missing any of them.

use crate::errors::ConfigError;
use cast_responder_core::{
    BotIdentity, CacheConfig, Environment, Fid, PipelineConfig, RateLimitConfig,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Deployment environment; `production` forces hardened error responses
    pub environment: Environment,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Webhook endpoint settings
    pub webhook: WebhookConfig,

    /// The bot's identity on the network
    pub bot: BotConfig,

    /// Global request rate limit
    pub rate_limit: RateLimitSettings,

    /// Duplicate-event suppression
    pub dedup: DedupConfig,

    /// Generated reply memoization
    pub response_cache: ResponseCacheConfig,

    /// Neynar API client
    pub neynar: NeynarConfig,

    /// Reply generation client
    pub generator: GeneratorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Security settings
    pub security: SecurityConfig,
}

impl ServiceConfig {
    /// Validate configuration
    ///
    /// Checks that every credential is present, every limit is non-zero, and
    /// every path and URL is well formed. The dedup cache must also be large
    /// enough to remember every event the rate limit admits during its TTL. A service must not accept traffic
    /// with a configuration that fails this check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("webhook.signing_secret", &self.webhook.signing_secret)?;
        require("bot.username", &self.bot.username)?;
        require("neynar.api_key", &self.neynar.api_key)?;
        require("neynar.signer_uuid", &self.neynar.signer_uuid)?;
        require("generator.api_key", &self.generator.api_key)?;
        require("generator.model", &self.generator.model)?;

        if self.bot.fid == 0 {
            return Err(ConfigError::Missing {
                key: "bot.fid".to_string(),
            });
        }

        let path = &self.webhook.endpoint_path;
        if !path.starts_with('/') || path.len() < 2 || path.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                key: "webhook.endpoint_path".to_string(),
                message: format!("'{}' must be an absolute path such as /webhook", path),
            });
        }
        if path == HEALTH_PATH {
            return Err(ConfigError::Invalid {
                key: "webhook.endpoint_path".to_string(),
                message: format!("'{}' is reserved for the health endpoint", HEALTH_PATH),
            });
        }

        non_zero("server.max_body_size", self.server.max_body_size as u64)?;
        non_zero("rate_limit.max_requests", self.rate_limit.max_requests as u64)?;
        non_zero("rate_limit.window_seconds", self.rate_limit.window_seconds)?;
        non_zero("dedup.max_entries", self.dedup.max_entries as u64)?;
        non_zero("dedup.ttl_seconds", self.dedup.ttl_seconds)?;
        non_zero("response_cache.max_entries", self.response_cache.max_entries as u64)?;
        non_zero("response_cache.ttl_seconds", self.response_cache.ttl_seconds)?;
        non_zero("neynar.timeout_seconds", self.neynar.timeout_seconds)?;
        non_zero("generator.timeout_seconds", self.generator.timeout_seconds)?;
        non_zero("generator.max_tokens", self.generator.max_tokens as u64)?;

        let required = self.min_dedup_entries();
        if (self.dedup.max_entries as u64) < required {
            return Err(ConfigError::Invalid {
                key: "dedup.max_entries".to_string(),
                message: format!(
                    "{} cannot hold every event admitted within dedup.ttl_seconds; need at least {}",
                    self.dedup.max_entries, required
                ),
            });
        }

        http_url("neynar.base_url", &self.neynar.base_url)?;
        http_url("generator.base_url", &self.generator.base_url)?;

        Ok(())
    }

    /// Smallest dedup capacity that never evicts a live entry.
    ///
    /// Each marked event holds a rate slot, so at most `max_requests` events
    /// are marked per window and the retention period spans
    /// `ceil(ttl / window)` windows.
    pub fn min_dedup_entries(&self) -> u64 {
        let windows = self
            .dedup
            .ttl_seconds
            .div_ceil(self.rate_limit.window_seconds.max(1));
        (self.rate_limit.max_requests as u64).saturating_mul(windows)
    }

    /// Whether error responses may carry internal detail
    pub fn expose_error_details(&self) -> bool {
        self.security.expose_error_details && !self.environment.is_hardened()
    }

    /// The bot identity used for mention matching
    pub fn bot_identity(&self) -> BotIdentity {
        BotIdentity::new(self.bot.username.clone(), Fid::new(self.bot.fid))
    }

    /// Bounds for the pipeline's rate window and caches
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            rate_limit: RateLimitConfig::new(
                self.rate_limit.max_requests,
                Duration::from_secs(self.rate_limit.window_seconds),
            ),
            dedup: CacheConfig::new(
                self.dedup.max_entries,
                Duration::from_secs(self.dedup.ttl_seconds),
            ),
            response_cache: CacheConfig::new(
                self.response_cache.max_entries,
                Duration::from_secs(self.response_cache.ttl_seconds),
            ),
        }
    }
}

/// Path of the liveness endpoint
pub const HEALTH_PATH: &str = "/health";

fn require(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn non_zero(key: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

fn http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !(value.starts_with("https://") || value.starts_with("http://")) {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            message: format!("'{}' must be an http(s) URL", value),
        });
    }
    Ok(())
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Time allowed for in-flight requests to drain on shutdown
    pub shutdown_timeout_seconds: u64,

    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Webhook endpoint configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Path receiving webhook deliveries
    pub endpoint_path: String,

    /// Shared secret for `x-neynar-signature` verification
    pub signing_secret: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/webhook".to_string(),
            signing_secret: String::new(),
        }
    }
}

// Security: Don't expose secrets in debug output
impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("endpoint_path", &self.endpoint_path)
            .field("signing_secret", &redacted(&self.signing_secret))
            .finish()
    }
}

/// Bot identity configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BotConfig {
    /// Username, with or without a leading `@`
    pub username: String,

    /// Numeric Farcaster id; zero means unset
    pub fid: u64,
}

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_requests: usize,
    pub window_seconds: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_seconds: 60,
        }
    }
}

/// Deduplication cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub max_entries: usize,
    pub ttl_seconds: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl_seconds: 600,
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseCacheConfig {
    pub max_entries: usize,
    pub ttl_seconds: u64,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            ttl_seconds: 300,
        }
    }
}

/// Neynar API client configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeynarConfig {
    pub api_key: String,

    /// Managed signer the bot publishes with
    pub signer_uuid: String,

    pub base_url: String,
    pub timeout_seconds: u64,

    /// Retries after the first attempt, transient failures only
    pub max_retries: u32,
}

impl Default for NeynarConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            signer_uuid: String::new(),
            base_url: "https://api.neynar.com".to_string(),
            timeout_seconds: 10,
            max_retries: 2,
        }
    }
}

impl fmt::Debug for NeynarConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeynarConfig")
            .field("api_key", &redacted(&self.api_key))
            .field("signer_uuid", &redacted(&self.signer_uuid))
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Reply generation client configuration (OpenAI-compatible API)
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub max_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            system_prompt: "You are a friendly Farcaster bot. Reply in one or two short \
                            sentences, under 320 characters, without hashtags."
                .to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            max_tokens: 200,
        }
    }
}

impl fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("api_key", &redacted(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_retries", &self.max_retries)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Include internal error detail in responses (ignored in production)
    pub expose_error_details: bool,
}

fn redacted(value: &str) -> &'static str {
    if value.is_empty() {
        "<EMPTY>"
    } else {
        "<REDACTED>"
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
