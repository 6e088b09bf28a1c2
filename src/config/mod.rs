//! Configuration module for the voice session gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Applying YAML overrides on top of the environment
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use voice_session_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::realtime::{
    DEFAULT_REALTIME_CALLS_URL, DEFAULT_REALTIME_VOICE, Modality, ModelPolicy, SessionConfig,
};
use crate::core::relay::{DEFAULT_ATTEMPT_TIMEOUT_MS, DEFAULT_MAX_ATTEMPTS, RetryPolicy};

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

/// Default listen host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default per-IP request rate.
pub const DEFAULT_RATE_LIMIT_RPS: u32 = 60;

/// Default per-IP burst allowance.
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// TLS configuration for HTTPS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway:
/// - Server host, port and TLS
/// - Upstream realtime credentials and session defaults
/// - Relay retry budget
/// - Security settings (CORS, rate limiting)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// Directory served as the router fallback (optional)
    pub static_dir: Option<PathBuf>,

    // Realtime upstream
    /// Bearer credential for the realtime calls endpoint
    pub openai_api_key: Option<String>,
    /// Model identifier; resolution depends on `model_policy`
    pub realtime_model: Option<String>,
    pub model_policy: ModelPolicy,
    pub realtime_voice: String,
    pub realtime_instructions: Option<String>,
    /// Reply modalities sent with the session descriptor; upstream default when unset
    pub realtime_output_modalities: Option<Vec<Modality>>,
    pub realtime_calls_url: String,

    // Relay
    /// Attempts per upstream call, including the first
    pub relay_max_attempts: u32,
    /// Hard timeout of a single upstream attempt
    pub relay_attempt_timeout_ms: u64,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,

    // Rate limiting configuration
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: None,
            static_dir: None,
            openai_api_key: None,
            realtime_model: None,
            model_policy: ModelPolicy::default(),
            realtime_voice: DEFAULT_REALTIME_VOICE.to_string(),
            realtime_instructions: None,
            realtime_output_modalities: None,
            realtime_calls_url: DEFAULT_REALTIME_CALLS_URL.to_string(),
            relay_max_attempts: DEFAULT_MAX_ATTEMPTS,
            relay_attempt_timeout_ms: DEFAULT_ATTEMPT_TIMEOUT_MS,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: DEFAULT_RATE_LIMIT_RPS,
            rate_limit_burst_size: DEFAULT_RATE_LIMIT_BURST,
        }
    }
}

/// Zeroize the upstream credential when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// The .env file is loaded into the process environment by `main.rs`, so
    /// real environment variables take precedence over it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = env::load_from_env()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;
        let config = merge::merge_config(env::load_from_env()?, yaml_config)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Retry policy for upstream calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.relay_max_attempts,
            Duration::from_millis(self.relay_attempt_timeout_ms),
        )
    }

    /// Session descriptor for the next upstream call, or `None` when the model
    /// policy rejects a missing model.
    pub fn session_config(&self) -> Option<SessionConfig> {
        let model = self.model_policy.resolve(self.realtime_model.as_deref())?;
        let voice = match self.realtime_voice.trim() {
            "" => DEFAULT_REALTIME_VOICE,
            voice => voice,
        };
        let session =
            SessionConfig::new(model, voice).with_instructions(self.realtime_instructions.clone());
        Some(match &self.realtime_output_modalities {
            Some(modalities) => session.with_output_modalities(modalities.clone()),
            None => session,
        })
    }
}
