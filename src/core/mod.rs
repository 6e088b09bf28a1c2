pub mod realtime;
pub mod relay;

// Re-export commonly used types for convenience
pub use realtime::{
    ConnectionState, HttpSignalingClient, ModelPolicy, RealtimeSession, SessionConfig,
    SessionError,
};
pub use relay::{FailureKind, RelayClient, RelayRequest, RelayResult, RetryPolicy};
