//! Environment variable loading.

use std::path::PathBuf;
use std::str::FromStr;

use super::validation::{parse_model_policy, parse_output_modalities, tls_from_paths};
use super::{
    ConfigError, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RATE_LIMIT_BURST, DEFAULT_RATE_LIMIT_RPS,
    ServerConfig,
};
use crate::core::realtime::{DEFAULT_REALTIME_CALLS_URL, DEFAULT_REALTIME_VOICE};
use crate::core::relay::{DEFAULT_ATTEMPT_TIMEOUT_MS, DEFAULT_MAX_ATTEMPTS};

/// Read a variable, treating unset and blank the same.
pub(super) fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a variable, falling back to `default` when unset.
pub(super) fn env_parse<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env_var(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

/// Build a configuration from the process environment and defaults.
pub(super) fn load_from_env() -> Result<ServerConfig, ConfigError> {
    let tls = tls_from_paths(
        env_var("TLS_CERT_PATH").map(PathBuf::from),
        env_var("TLS_KEY_PATH").map(PathBuf::from),
    )?;

    Ok(ServerConfig {
        host: env_var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: env_parse("PORT", DEFAULT_PORT)?,
        tls,
        static_dir: env_var("STATIC_DIR").map(PathBuf::from),
        openai_api_key: env_var("OPENAI_API_KEY"),
        realtime_model: env_var("REALTIME_MODEL"),
        model_policy: env_var("REALTIME_MODEL_POLICY")
            .map(|p| parse_model_policy("REALTIME_MODEL_POLICY", p))
            .transpose()?
            .unwrap_or_default(),
        realtime_voice: env_var("REALTIME_VOICE")
            .unwrap_or_else(|| DEFAULT_REALTIME_VOICE.to_string()),
        realtime_instructions: env_var("REALTIME_INSTRUCTIONS"),
        realtime_output_modalities: env_var("REALTIME_OUTPUT_MODALITIES")
            .map(|m| parse_output_modalities("REALTIME_OUTPUT_MODALITIES", m))
            .transpose()?
            .flatten(),
        realtime_calls_url: env_var("REALTIME_CALLS_URL")
            .unwrap_or_else(|| DEFAULT_REALTIME_CALLS_URL.to_string()),
        relay_max_attempts: env_parse("RELAY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
        relay_attempt_timeout_ms: env_parse(
            "RELAY_ATTEMPT_TIMEOUT_MS",
            DEFAULT_ATTEMPT_TIMEOUT_MS,
        )?,
        cors_allowed_origins: env_var("CORS_ALLOWED_ORIGINS"),
        rate_limit_requests_per_second: env_parse(
            "RATE_LIMIT_REQUESTS_PER_SECOND",
            DEFAULT_RATE_LIMIT_RPS,
        )?,
        rate_limit_burst_size: env_parse("RATE_LIMIT_BURST_SIZE", DEFAULT_RATE_LIMIT_BURST)?,
    })
}
