//! Layered configuration loading.
//!
//! Sources, later overriding earlier:
//!  1. `/etc/cast-responder/service.yaml` (optional)
//!  2. `./config/service.yaml` (optional)
//!  3. the file named by `CAST_RESPONDER_CONFIG_FILE` (required when set)
//!  4. environment variables prefixed `CR__`, e.g. `CR__SERVER__PORT=9090`
//!
//! Every field carries a serde default, so missing files are fine. A file
//! that fails to parse or a variable that cannot be coerced to its field type
//! is an error. Loading does not validate; callers run
//! [`ServiceConfig::validate`] before serving.

use cast_responder_api::{ConfigError, ServiceConfig};

/// Variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "CAST_RESPONDER_CONFIG_FILE";

/// Prefix of configuration override variables
pub const ENV_PREFIX: &str = "CR";

const DEFAULT_FILES: [&str; 2] = ["/etc/cast-responder/service", "config/service"];

/// Load configuration from the standard sources
pub fn load_config() -> Result<ServiceConfig, ConfigError> {
    let explicit_path = std::env::var(CONFIG_FILE_ENV)
        .ok()
        .filter(|path| !path.trim().is_empty());

    load_config_from(&DEFAULT_FILES, explicit_path.as_deref(), ENV_PREFIX)
}

/// Load configuration from the given sources
///
/// `optional_files` are YAML paths without extension; `explicit_file` must
/// exist when given.
pub fn load_config_from(
    optional_files: &[&str],
    explicit_file: Option<&str>,
    env_prefix: &str,
) -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder();

    for path in optional_files {
        builder = builder.add_source(
            config::File::with_name(path)
                .required(false)
                .format(config::FileFormat::Yaml),
        );
    }

    if let Some(path) = explicit_file {
        builder = builder.add_source(
            config::File::with_name(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    let merged = builder
        .add_source(config::Environment::with_prefix(env_prefix).separator("__"))
        .build()
        .map_err(|e| ConfigError::Invalid {
            key: "sources".to_string(),
            message: e.to_string(),
        })?;

    merged
        .try_deserialize::<ServiceConfig>()
        .map_err(|e| ConfigError::Invalid {
            key: "sources".to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
