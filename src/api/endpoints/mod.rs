//! HTTP endpoint handlers.
//!
//! Handlers parse and validate input, then hand the work to the pipeline on
//! tokio's blocking pool with a connection opened there.

pub mod analytics;
pub mod blueprints;
pub mod health;
pub mod papers;
pub mod practice;
pub mod sessions;
pub mod taxonomy;

use crate::api::error::ApiError;

/// Run database or CPU-bound work off the async runtime.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}
