//! HTTP route handlers.

pub mod webhook;

use axum::{Router, routing::post};

use crate::state::AppState;

/// Path Telegram delivers updates to.
pub const WEBHOOK_PATH: &str = "/telegram/webhook";

/// Build the bot's routes.
pub fn routes() -> Router<AppState> {
    Router::new().route(WEBHOOK_PATH, post(webhook::telegram_webhook))
}
