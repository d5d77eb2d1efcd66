//! Bakery Orders Bot library.
//!
//! Telegram webhook service behind the bakery's Web App shop. It takes
//! checkout and cart messages from the mini app, numbers orders, and notifies
//! staff and customers by chat and email.
//!
//! The binary in `main.rs` only loads configuration, sets up logging and
//! serves [`app`]; everything else lives here so it can be tested in-process.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
pub mod telegram;

use axum::http::StatusCode;
use axum::{Router, routing::get};

use state::AppState;

/// Build the router with health checks and the Telegram webhook.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes())
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// The order counter is loaded before the server binds, so a running server
/// is ready.
async fn readiness() -> StatusCode {
    StatusCode::OK
}
