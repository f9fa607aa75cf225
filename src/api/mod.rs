//! HTTP API.
//!
//! Admin routes manage past papers, taxonomies and blueprints; student
//! routes serve practice papers, timed sessions and analytics. Every
//! request passes through the audit middleware before its handler.
//!
//! `api_router()` returns a `Router` that can be mounted on any axum
//! server instance; `start_api_server()` binds and serves it.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_api_server, ApiServer};
pub use types::ApiContext;
