//! HTTP request handlers
//!
//! This module organizes all API handlers into logical groups:
//! - `api` - Health check endpoint
//! - `session` - Session offer/answer signaling relay

pub mod api;
pub mod session;

// Re-export commonly used handlers for convenient access
pub use api::health_check;
pub use session::create_session;
