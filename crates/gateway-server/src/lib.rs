//! # Gateway Server
//!
//! Axum HTTP surface of the gateway:
//! - chat endpoints for the four caller protocols and their aliases
//! - health, readiness and pool introspection
//! - standard response headers and per-request debug headers
//! - graceful shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod state;

pub use error::ApiError;
pub use health::{HealthResponse, HealthStatus, ReadinessResponse};
pub use routes::create_router;
pub use server::Server;
pub use shutdown::{shutdown_signal, RequestGuard, ShutdownCoordinator};
pub use state::AppState;
