//! # Cast Responder Service
//!
//! Process wiring for the Cast Responder webhook service: configuration
//! loading, logging setup, and the outbound HTTP clients the mention
//! pipeline publishes through.

pub mod generator;
pub mod neynar;
pub mod retry;
pub mod settings;
pub mod telemetry;

pub use generator::OpenAiReplyGenerator;
pub use neynar::NeynarClient;
pub use retry::RetryPolicy;

use cast_responder_core::DownstreamError;

/// Failure constructing an outbound client at startup
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("Failed to build HTTP client for {service}: {message}")]
    Http { service: String, message: String },

    #[error("Invalid base URL for {service} '{url}': {message}")]
    InvalidBaseUrl {
        service: String,
        url: String,
        message: String,
    },
}

/// Join an API base URL and an absolute endpoint path
///
/// Any path already on the base is kept, so `https://host/v1` with
/// `/chat/completions` yields `https://host/v1/chat/completions`.
pub(crate) fn endpoint_url(
    service: &str,
    base_url: &str,
    path: &str,
) -> Result<String, ClientBuildError> {
    let parsed = url::Url::parse(base_url).map_err(|e| ClientBuildError::InvalidBaseUrl {
        service: service.to_string(),
        url: base_url.to_string(),
        message: e.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClientBuildError::InvalidBaseUrl {
            service: service.to_string(),
            url: base_url.to_string(),
            message: "scheme must be http or https".to_string(),
        });
    }

    Ok(format!("{}{}", base_url.trim_end_matches('/'), path))
}

pub(crate) fn map_send_error(service: &str, error: reqwest::Error) -> DownstreamError {
    if error.is_timeout() {
        DownstreamError::Timeout {
            service: service.to_string(),
        }
    } else {
        DownstreamError::Transport {
            service: service.to_string(),
            message: error.to_string(),
        }
    }
}

/// Pass through a successful response, or map its status to a [`DownstreamError`]
///
/// The body text is kept as the message for statuses without a dedicated variant.
pub(crate) async fn check_status(
    service: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, DownstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    Err(match status.as_u16() {
        401 | 403 => DownstreamError::Unauthorized {
            service: service.to_string(),
        },
        429 => DownstreamError::RateLimited {
            service: service.to_string(),
        },
        code => {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            DownstreamError::HttpStatus {
                service: service.to_string(),
                status: code,
                message,
            }
        }
    })
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
