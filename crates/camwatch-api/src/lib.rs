//! HTTP API for the camwatch motion recorder.
//!
//! This crate provides:
//! - Sensor state, recordings and detection settings endpoints
//! - Static delivery of recordings and screenshots
//! - CORS, request ids and request logging
//! - Prometheus metrics
//! - Server task with a bounded graceful shutdown

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use server::HttpServer;
pub use state::AppState;
