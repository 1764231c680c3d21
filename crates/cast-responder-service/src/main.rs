//! # Cast Responder Service
//!
//! Binary entry point.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Builds the Neynar and reply generation clients and the mention pipeline
//! - Starts the HTTP server from cast-responder-api
//!
//! Exit codes: 1 bind failure, 2 server or client failure, 3 configuration.

use cast_responder_api::{config::LoggingConfig, start_server, ServiceError};
use cast_responder_core::{MentionPipeline, SignatureVerifier};
use cast_responder_service::{settings, telemetry, NeynarClient, OpenAiReplyGenerator};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let loaded = settings::load_config();

    // Logging settings come from the configuration, so a load failure is
    // reported through the default subscriber.
    let logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_else(|_| LoggingConfig::default());
    telemetry::init_tracing(&logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Cast Responder");

    let service_config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(
                error = %e,
                "Could not load service configuration; aborting. \
                 Fix the configuration and restart."
            );
            std::process::exit(3);
        }
    };

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    info!(
        environment = service_config.environment.as_str(),
        bot = %service_config.bot_identity(),
        endpoint = %service_config.webhook.endpoint_path,
        "Configuration loaded"
    );

    let publisher = match NeynarClient::new(&service_config.neynar) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build Neynar client; aborting");
            std::process::exit(2);
        }
    };

    let generator = match OpenAiReplyGenerator::new(&service_config.generator) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build reply generator; aborting");
            std::process::exit(2);
        }
    };

    let pipeline = MentionPipeline::new(
        SignatureVerifier::new(service_config.webhook.signing_secret.clone()),
        service_config.bot_identity(),
        service_config.pipeline_config(),
        Arc::new(generator),
        Arc::new(publisher),
    );

    if let Err(e) = start_server(service_config, Arc::new(pipeline)).await {
        error!(error = %e, "HTTP server failed");

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }
}
