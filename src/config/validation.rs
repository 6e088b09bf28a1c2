//! Configuration validation logic.

use std::path::PathBuf;

use url::Url;

use super::{ConfigError, ServerConfig, TlsConfig};
use crate::core::realtime::{Modality, ModelPolicy};

/// Build the TLS settings from a certificate/key pair.
///
/// Both paths must be given together, or neither.
pub(super) fn tls_from_paths(
    cert_path: Option<PathBuf>,
    key_path: Option<PathBuf>,
) -> Result<Option<TlsConfig>, ConfigError> {
    match (cert_path, key_path) {
        (Some(cert_path), Some(key_path)) => Ok(Some(TlsConfig {
            cert_path,
            key_path,
        })),
        (None, None) => Ok(None),
        _ => Err(ConfigError::Invalid(
            "TLS certificate and key paths must be set together".to_string(),
        )),
    }
}

/// Parse a model policy named by setting `name`.
pub(super) fn parse_model_policy(name: &'static str, value: String) -> Result<ModelPolicy, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue { name, value })
}

/// Parse a comma-separated output modality list. An empty list means unset.
pub(super) fn parse_output_modalities(
    name: &'static str,
    value: String,
) -> Result<Option<Vec<Modality>>, ConfigError> {
    match Modality::parse_list(&value) {
        Ok(modalities) if modalities.is_empty() => Ok(None),
        Ok(modalities) => Ok(Some(modalities)),
        Err(_) => Err(ConfigError::InvalidValue { name, value }),
    }
}

/// The upstream calls URL must be an absolute http(s) URL.
pub(super) fn validate_calls_url(url: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidValue {
        name: "REALTIME_CALLS_URL",
        value: format!("{url} ({e})"),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::InvalidValue {
            name: "REALTIME_CALLS_URL",
            value: format!("{url} (unsupported scheme {scheme})"),
        }),
    }
}

pub(super) fn validate_relay(max_attempts: u32, attempt_timeout_ms: u64) -> Result<(), ConfigError> {
    if max_attempts == 0 {
        return Err(ConfigError::Invalid(
            "relay max attempts must be at least 1".to_string(),
        ));
    }
    if attempt_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "relay attempt timeout must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

pub(super) fn validate_rate_limit(rps: u32, burst: u32) -> Result<(), ConfigError> {
    if rps == 0 || burst == 0 {
        return Err(ConfigError::Invalid(
            "rate limit values must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Validate a fully merged configuration.
pub(super) fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    validate_calls_url(&config.realtime_calls_url)?;
    validate_relay(config.relay_max_attempts, config.relay_attempt_timeout_ms)?;
    validate_rate_limit(
        config.rate_limit_requests_per_second,
        config.rate_limit_burst_size,
    )?;
    Ok(())
}
