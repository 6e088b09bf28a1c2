//! Outbound HTTP relay with bounded retries.
//!
//! The relay client owns no per-call state and can be shared across requests.
//! Each call runs a fixed attempt budget; retryable failures (selected HTTP
//! statuses, timeouts and network errors) wait out an exponential backoff with
//! jitter before the next attempt.
//!
//! # Example
//!
//! ```rust,ignore
//! use voice_session_gateway::core::relay::{RelayClient, RelayRequest, RetryPolicy};
//!
//! let client = RelayClient::default();
//! let request = RelayRequest::post("https://api.example.com/v1/calls")
//!     .bearer("sk-...")
//!     .text("application/sdp", offer_sdp);
//!
//! match client.relay(&request, &RetryPolicy::default()).await {
//!     RelayResult::Success { body, .. } => println!("{body}"),
//!     RelayResult::Failure(failure) => eprintln!("{}: {}", failure.status, failure.message),
//! }
//! ```

mod client;
mod policy;

pub use client::{
    RelayBody, RelayClient, RelayFailure, RelayRequest, RelayResult, is_html_body,
};
pub use policy::{
    Backoff, DEFAULT_ATTEMPT_TIMEOUT_MS, DEFAULT_MAX_ATTEMPTS, FailureKind, RETRYABLE_STATUSES,
    RetryPolicy, backoff_delay, is_retryable_status,
};
