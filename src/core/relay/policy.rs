//! Retry policy and backoff schedule for the relay client.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Upstream status codes that are worth another attempt.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Default number of attempts per relay call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default hard timeout for a single attempt (milliseconds).
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 25_000;

/// Check whether an upstream HTTP status should be retried.
#[inline]
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Why a single relay attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Upstream answered with a non-success status
    Http,
    /// The attempt exceeded its per-attempt timeout and was aborted
    Timeout,
    /// Connection could not be established or was reset mid-exchange
    Network,
    /// The request could not be built or the response could not be read
    Request,
}

/// Exponential backoff with additive uniform jitter.
///
/// The delay before attempt `n + 1` is `base * 2^(n-1) + uniform(0, jitter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    /// Delay after the first failed attempt, before jitter
    pub base: Duration,
    /// Upper bound of the uniform jitter added to each delay
    pub jitter: Duration,
}

impl Backoff {
    pub const fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        backoff_delay(self.base, self.jitter, attempt, rng)
    }
}

/// `base * 2^(attempt-1) + uniform(0, jitter)`, with all randomness drawn from `rng`.
pub fn backoff_delay<R: Rng + ?Sized>(
    base: Duration,
    jitter: Duration,
    attempt: u32,
    rng: &mut R,
) -> Duration {
    // Cap the exponent so a misconfigured attempt count cannot overflow.
    let exponent = attempt.saturating_sub(1).min(16);
    let scaled = base.saturating_mul(1u32 << exponent);

    let jitter_ms = jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return scaled;
    }
    scaled.saturating_add(Duration::from_millis(rng.gen_range(0..=jitter_ms)))
}

/// Retry policy for one relay call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    /// Hard bound on a single attempt
    pub per_attempt_timeout: Duration,
    /// Backoff used after a retryable HTTP status
    pub http_backoff: Backoff,
    /// Backoff used after a timeout or network failure
    pub network_backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            per_attempt_timeout: Duration::from_millis(DEFAULT_ATTEMPT_TIMEOUT_MS),
            http_backoff: Backoff::new(Duration::from_millis(500), Duration::from_millis(250)),
            network_backoff: Backoff::new(Duration::from_millis(1000), Duration::from_millis(500)),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given attempt budget and per-attempt timeout, default backoff.
    pub fn new(max_attempts: u32, per_attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            per_attempt_timeout,
            ..Default::default()
        }
    }

    /// Single attempt, no retries.
    pub fn once(per_attempt_timeout: Duration) -> Self {
        Self::new(1, per_attempt_timeout)
    }

    /// Replace both backoff schedules.
    pub fn with_backoff(mut self, http: Backoff, network: Backoff) -> Self {
        self.http_backoff = http;
        self.network_backoff = network;
        self
    }

    /// Backoff schedule that applies to a failure of the given kind.
    pub fn backoff_for(&self, kind: FailureKind) -> &Backoff {
        match kind {
            FailureKind::Timeout | FailureKind::Network => &self.network_backoff,
            FailureKind::Http | FailureKind::Request => &self.http_backoff,
        }
    }

    /// Delay to wait after failed attempt `attempt` of the given kind.
    pub fn delay_for<R: Rng + ?Sized>(
        &self,
        kind: FailureKind,
        attempt: u32,
        rng: &mut R,
    ) -> Duration {
        self.backoff_for(kind).delay(attempt, rng)
    }

    /// Whether another attempt is allowed after attempt number `attempt`.
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }
}
