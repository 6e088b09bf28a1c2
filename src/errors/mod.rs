//! Client-facing error taxonomy for HTTP handlers.

pub mod app_error;

pub use app_error::{AppError, AppResult};
