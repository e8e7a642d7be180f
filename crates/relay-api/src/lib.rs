//! relay-api: HTTP surface for the relay
//!
//! Outbound send and status endpoints, the provider's webhook receivers and
//! a health check, built with axum.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use server::{AppState, build_router, start_server};
