//! Telegram-related errors.

use thiserror::Error;

/// Errors that can occur when talking to the Telegram Bot API.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// HTTP request failed.
    #[error("Telegram request failed: {0}")]
    Request(String),

    /// Failed to parse response.
    #[error("Telegram response error: {0}")]
    Response(String),

    /// Bot API returned `ok: false`.
    #[error("Telegram API error {code}: {description}")]
    Api {
        /// `error_code` from the response, 0 when absent.
        code: i64,
        /// `description` from the response.
        description: String,
    },

    /// Webhook secret header missing or wrong.
    #[error("Invalid webhook secret")]
    InvalidSecret,
}
