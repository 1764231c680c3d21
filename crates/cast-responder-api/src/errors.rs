//! Error types for the HTTP service

use crate::body::RawBodyError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use cast_responder_core::{CorrelationId, ErrorCategory, PipelineError, PipelineStage};
use tracing::{error, warn};

/// Methods accepted on the webhook endpoint
pub const ALLOWED_METHODS: &str = "GET, POST";

/// Webhook handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: unreadable body or malformed JSON
/// - `401 Unauthorized`: missing or invalid signature
/// - `405 Method Not Allowed`: anything other than GET or POST on the endpoint
/// - `413 Payload Too Large`: body above the configured maximum
/// - `429 Too Many Requests`: global rate window full, with `Retry-After`
/// - `500 Internal Server Error`: reply generation or publishing failed
///
/// Ignored events are not errors and never pass through this type.
///
/// # Security Considerations
///
/// The computed signature digest never appears in any message. Internal
/// detail is only included in the response body when explicitly enabled
/// outside production; it is always logged server-side with the
/// correlation ID.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    #[error("Method {method} not allowed")]
    MethodNotAllowed { method: String },

    #[error("Payload too large (max: {max_size} bytes)")]
    PayloadTooLarge {
        declared_size: Option<u64>,
        max_size: usize,
    },

    #[error("Failed to read request body: {message}")]
    BodyRead { message: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl WebhookHandlerError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BodyRead { .. } => StatusCode::BAD_REQUEST,
            Self::Pipeline(e) => match e {
                PipelineError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                PipelineError::Unauthorized => StatusCode::UNAUTHORIZED,
                PipelineError::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
                PipelineError::Downstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// State at which the request was rejected
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::MethodNotAllowed { .. } => PipelineStage::MethodChecked,
            Self::PayloadTooLarge { .. } | Self::BodyRead { .. } => PipelineStage::BodyRead,
            Self::Pipeline(e) => e.stage(),
        }
    }

    /// Get error category for monitoring
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::Pipeline(e) => e.error_category(),
            _ => ErrorCategory::Permanent,
        }
    }

    /// Message safe to return in hardened mode
    fn generic_message(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed { .. } => "Method not allowed",
            Self::PayloadTooLarge { .. } => "Payload too large",
            Self::BodyRead { .. } => "Unable to read request body",
            Self::Pipeline(e) => match e {
                PipelineError::RateLimited { .. } => "Rate limit exceeded",
                PipelineError::Unauthorized => "Unauthorized",
                PipelineError::MalformedPayload { .. } => "Malformed payload",
                PipelineError::Downstream(_) => {
                    "Internal server error occurred. Please try again later."
                }
            },
        }
    }

    /// Seconds for the `Retry-After` header, rounded up and at least one
    fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::Pipeline(PipelineError::RateLimited { retry_after }) => {
                let mut seconds = retry_after.as_secs();
                if retry_after.subsec_nanos() > 0 {
                    seconds += 1;
                }
                Some(seconds.max(1))
            }
            _ => None,
        }
    }

    /// Attach the request context used to render the response
    pub fn with_context(
        self,
        correlation_id: &CorrelationId,
        expose_details: bool,
    ) -> HandlerFailure {
        HandlerFailure {
            error: self,
            correlation_id: Some(correlation_id.clone()),
            expose_details,
        }
    }
}

impl From<RawBodyError> for WebhookHandlerError {
    fn from(e: RawBodyError) -> Self {
        match e {
            RawBodyError::TooLarge {
                declared_size,
                max_size,
            } => Self::PayloadTooLarge {
                declared_size,
                max_size,
            },
            RawBodyError::Read { message } => Self::BodyRead { message },
        }
    }
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        HandlerFailure {
            error: self,
            correlation_id: None,
            expose_details: false,
        }
        .into_response()
    }
}

/// A handler error together with the request context needed to render it
#[derive(Debug)]
pub struct HandlerFailure {
    pub error: WebhookHandlerError,
    pub correlation_id: Option<CorrelationId>,
    pub expose_details: bool,
}

impl IntoResponse for HandlerFailure {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let correlation_id = self
            .correlation_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_default();

        if status.is_server_error() {
            error!(
                correlation_id = %correlation_id,
                status = status.as_u16(),
                stage = %self.error.stage(),
                category = ?self.error.error_category(),
                error = %self.error,
                "Webhook processing failed"
            );
        } else {
            warn!(
                correlation_id = %correlation_id,
                status = status.as_u16(),
                stage = %self.error.stage(),
                category = ?self.error.error_category(),
                error = %self.error,
                "Webhook rejected"
            );
        }

        let message = if self.expose_details {
            self.error.to_string()
        } else {
            self.error.generic_message().to_string()
        };

        let body = serde_json::json!({
            "status": "error",
            "error": message,
            "code": status.as_u16(),
            "correlation_id": self.correlation_id.map(|id| id.to_string()),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut response = (status, Json(body)).into_response();

        if let Some(retry_seconds) = self.error.retry_after_seconds() {
            if let Ok(header_value) = HeaderValue::from_str(&retry_seconds.to_string()) {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, header_value);
            }
        }

        if status == StatusCode::METHOD_NOT_ALLOWED {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        }

        response
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Invalid configuration for {key}: {message}")]
    Invalid { key: String, message: String },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
