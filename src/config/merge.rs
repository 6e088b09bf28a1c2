//! Applying YAML overrides on top of an environment-derived configuration.

use std::path::PathBuf;

use super::validation::{parse_model_policy, parse_output_modalities, tls_from_paths};
use super::yaml::YamlConfig;
use super::{ConfigError, ServerConfig};

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Overlay every value present in `yaml` onto `config`.
pub(super) fn merge_config(
    mut config: ServerConfig,
    yaml: YamlConfig,
) -> Result<ServerConfig, ConfigError> {
    if let Some(server) = yaml.server {
        if let Some(host) = non_empty(server.host) {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(dir) = non_empty(server.static_dir) {
            config.static_dir = Some(PathBuf::from(dir));
        }
        if let Some(tls) = server.tls {
            config.tls = match tls.enabled {
                Some(false) => None,
                _ => {
                    let cert = non_empty(tls.cert_path).map(PathBuf::from);
                    let key = non_empty(tls.key_path).map(PathBuf::from);
                    match (cert, key) {
                        (None, None) => config.tls.take(),
                        (cert, key) => tls_from_paths(cert, key)?,
                    }
                }
            };
        }
    }

    if let Some(realtime) = yaml.realtime {
        if let Some(key) = non_empty(realtime.api_key) {
            config.openai_api_key = Some(key);
        }
        if let Some(model) = non_empty(realtime.model) {
            config.realtime_model = Some(model);
        }
        if let Some(policy) = non_empty(realtime.model_policy) {
            config.model_policy = parse_model_policy("realtime.model_policy", policy)?;
        }
        if let Some(voice) = non_empty(realtime.voice) {
            config.realtime_voice = voice;
        }
        if let Some(instructions) = non_empty(realtime.instructions) {
            config.realtime_instructions = Some(instructions);
        }
        if let Some(modalities) = non_empty(realtime.output_modalities) {
            config.realtime_output_modalities =
                parse_output_modalities("realtime.output_modalities", modalities)?;
        }
        if let Some(url) = non_empty(realtime.calls_url) {
            config.realtime_calls_url = url;
        }
    }

    if let Some(relay) = yaml.relay {
        if let Some(attempts) = relay.max_attempts {
            config.relay_max_attempts = attempts;
        }
        if let Some(timeout) = relay.attempt_timeout_ms {
            config.relay_attempt_timeout_ms = timeout;
        }
    }

    if let Some(security) = yaml.security {
        if let Some(origins) = non_empty(security.cors_allowed_origins) {
            config.cors_allowed_origins = Some(origins);
        }
        if let Some(rps) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }
    }

    Ok(config)
}
