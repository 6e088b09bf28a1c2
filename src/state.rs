//! Shared application state.

use std::sync::Arc;

use tracing::info;

use crate::config::ServerConfig;
use crate::core::relay::{RelayClient, RetryPolicy};

/// State shared by every request handler.
pub struct AppState {
    pub config: ServerConfig,
    /// Pooled client for upstream calls
    pub relay: RelayClient,
    /// Retry policy derived from `config`
    pub retry_policy: RetryPolicy,
}

impl AppState {
    pub async fn new(config: ServerConfig) -> Arc<Self> {
        Self::with_relay(config, RelayClient::default())
    }

    /// State with an explicit relay client (custom HTTP client or jitter source).
    pub fn with_relay(config: ServerConfig, relay: RelayClient) -> Arc<Self> {
        let retry_policy = config.retry_policy();
        info!(
            calls_url = %config.realtime_calls_url,
            model_policy = %config.model_policy,
            max_attempts = retry_policy.max_attempts,
            attempt_timeout_ms = config.relay_attempt_timeout_ms,
            credential_configured = config.openai_api_key.is_some(),
            "Application state initialized"
        );

        Arc::new(Self {
            config,
            relay,
            retry_policy,
        })
    }
}
