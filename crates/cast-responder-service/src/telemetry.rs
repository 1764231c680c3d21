//! Logging setup.

use cast_responder_api::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise `logging.level` applies to the
/// service crates and `tower_http` logs at debug.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(logging));

    let registry = tracing_subscriber::registry().with(filter);

    // A subscriber may already be installed (tests, embedding).
    let _ = if logging.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
}

fn default_filter(logging: &LoggingConfig) -> EnvFilter {
    let level = logging.level.trim();
    let directives = format!(
        "cast_responder_service={level},cast_responder_api={level},cast_responder_core={level},tower_http=debug"
    );

    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
