//! # Cast Responder HTTP Service
//!
//! HTTP layer in front of the mention pipeline.
//!
//! This library provides:
//! - The webhook endpoint (POST), with raw body capture for signature checks
//! - A liveness payload on GET of the webhook path and on `/health`
//! - Correlation ID propagation and request logging
//! - Server startup with graceful shutdown

pub mod body;
pub mod config;
pub mod errors;
pub mod responses;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod lib_tests;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use cast_responder_core::{
    CorrelationId, MentionPipeline, Timestamp, WebhookRequest, SIGNATURE_HEADER,
};
use std::{future::IntoFuture, sync::Arc, time::Duration, time::Instant};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

pub use body::{read_raw_body, RawBodyError};
pub use config::{ServiceConfig, HEALTH_PATH};
pub use errors::{ConfigError, HandlerFailure, ServiceError, WebhookHandlerError};
pub use responses::{HealthResponse, PipelineStats, WebhookResponse};

/// Header carrying the request correlation ID
pub const CORRELATION_HEADER: &str = "x-correlation-id";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<ServiceConfig>,

    /// Pipeline processing webhook deliveries
    pub pipeline: Arc<MentionPipeline>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ServiceConfig, pipeline: Arc<MentionPipeline>) -> Self {
        Self {
            config: Arc::new(config),
            pipeline,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
///
/// The endpoint path must already be validated (see [`ServiceConfig::validate`]).
pub fn create_router(state: AppState) -> Router {
    let webhook_route = post(handle_webhook)
        .get(handle_health_check)
        .fallback(handle_method_not_allowed);

    Router::new()
        .route(&state.config.webhook.endpoint_path, webhook_route)
        .route(HEALTH_PATH, get(handle_health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server
///
/// Serves until SIGINT or SIGTERM, then stops accepting connections and gives
/// in-flight requests up to `server.shutdown_timeout_seconds` to finish.
pub async fn start_server(
    config: ServiceConfig,
    pipeline: Arc<MentionPipeline>,
) -> Result<(), ServiceError> {
    config.validate()?;

    let address = format!("{}:{}", config.server.host, config.server.port);
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    let app = create_router(AppState::new(config, pipeline));

    let listener =
        tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: address.clone(),
                message: e.to_string(),
            })?;

    info!(address = %address, "Starting HTTP server");

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .into_future();

    let drain_deadline = async move {
        if shutdown_rx.wait_for(|requested| *requested).await.is_err() {
            // Sender dropped without a signal: the server already stopped.
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        result = server => {
            result.map_err(|e| ServiceError::ServerFailed {
                message: e.to_string(),
            })?;
        }
        _ = drain_deadline => {
            warn!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "Shutdown timeout elapsed with requests still in flight"
            );
        }
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

// ============================================================================
// Webhook Handlers
// ============================================================================

/// Handle a webhook delivery
///
/// Captures the raw body, then hands signature, content type and bytes to the
/// pipeline. Ignored events are successful acknowledgements (200) so the
/// upstream delivery system does not retry them.
#[instrument(skip(state, request))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    mut request: Request,
) -> Result<Json<WebhookResponse>, HandlerFailure> {
    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .cloned()
        .unwrap_or_default();
    let expose_details = state.config.expose_error_details();

    let body = read_raw_body(&mut request, state.config.server.max_body_size)
        .await
        .map_err(|e| {
            WebhookHandlerError::from(e).with_context(&correlation_id, expose_details)
        })?;

    let headers = request.headers();
    let webhook_request = WebhookRequest::new(
        header_string(headers, SIGNATURE_HEADER),
        header_string(headers, header::CONTENT_TYPE.as_str()),
        body,
        correlation_id.clone(),
    );

    let outcome = state
        .pipeline
        .process(&webhook_request)
        .await
        .map_err(|e| {
            WebhookHandlerError::from(e).with_context(&correlation_id, expose_details)
        })?;

    Ok(Json(WebhookResponse::from_outcome(outcome, &correlation_id)))
}

/// Reject any method other than GET or POST on the webhook path
async fn handle_method_not_allowed(request: Request) -> HandlerFailure {
    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .cloned()
        .unwrap_or_default();

    WebhookHandlerError::MethodNotAllowed {
        method: request.method().to_string(),
    }
    .with_context(&correlation_id, false)
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Liveness endpoint
#[instrument(skip(state))]
async fn handle_health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Instant::now();
    let pipeline = &state.pipeline;

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.as_str().to_string(),
        timestamp: Timestamp::now(),
        pipeline: PipelineStats {
            rate_window_used: pipeline.rate_limiter().current_count(now),
            rate_window_capacity: pipeline.rate_limiter().config().max_requests,
            dedup_entries: pipeline.dedup_cache().len(),
            cached_replies: pipeline.response_cache().len(),
        },
    })
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware
///
/// - Reuses a UUID `x-correlation-id` supplied by the caller, otherwise
///   generates one
/// - Stores it in the request extensions for handlers
/// - Echoes it on every response
/// - Logs completion at a level matching the status class
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(mut request: Request, next: middleware::Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<CorrelationId>().ok())
        .unwrap_or_default();

    tracing::Span::current().record("correlation_id", correlation_id.to_string().as_str());
    request.extensions_mut().insert(correlation_id.clone());

    info!(method = %method, uri = %uri, "Request started");

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response
            .headers_mut()
            .insert(CORRELATION_HEADER, header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}
