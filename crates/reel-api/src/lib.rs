//! Axum HTTP API server for the export engine.
//!
//! This crate provides:
//! - Job submission, polling, cancellation and history under `/api/export`
//! - Live progress over WebSocket
//! - Security headers, request ids and request logging
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
