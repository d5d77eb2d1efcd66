//! Telegram Bot API client.
//!
//! Provides methods for sending messages and registering the webhook, plus
//! the constant-time comparison used to check the webhook secret.

use std::time::Duration;

use bakery_orders_core::ChatId;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument};

use super::error::TelegramError;
use super::types::{ApiResponse, ParseMode, SendMessage, SetWebhook};
use crate::config::TelegramConfig;

/// Upper bound on a single Bot API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    /// HTTP client.
    client: Client,
    /// API base URL without the trailing slash.
    api_base: String,
    /// Bot token, part of every method URL.
    bot_token: SecretString,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_base", &self.api_base)
            .field("bot_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: &TelegramConfig) -> Result<Self, TelegramError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TelegramError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            bot_token: config.bot_token.clone(),
        })
    }

    /// Send a text message to a chat.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Telegram rejects the message
    /// (blocked bot, malformed entities, unknown chat).
    #[instrument(skip(self, text), fields(chat_id = %chat_id, parse_mode = ?parse_mode))]
    pub async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        parse_mode: ParseMode,
    ) -> Result<(), TelegramError> {
        let body = SendMessage {
            chat_id: chat_id.as_i64(),
            text,
            parse_mode: parse_mode.as_api(),
        };

        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        debug!("Message sent to Telegram");
        Ok(())
    }

    /// Register the webhook URL with Telegram.
    ///
    /// Only `message` updates are requested; Web App data arrives as a
    /// message.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Telegram rejects the URL.
    #[instrument(skip(self, secret_token))]
    pub async fn set_webhook(
        &self,
        url: &str,
        secret_token: Option<&SecretString>,
    ) -> Result<(), TelegramError> {
        let body = SetWebhook {
            url,
            secret_token: secret_token.map(ExposeSecret::expose_secret),
            allowed_updates: &["message"],
        };

        let _: bool = self.call("setWebhook", &body).await?;
        tracing::info!(url = %url, "Telegram webhook registered");
        Ok(())
    }

    /// Call a Bot API method and unwrap the response envelope.
    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, TelegramError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        );

        // reqwest errors carry the URL, which contains the token.
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| TelegramError::Request(e.without_url().to_string()))?;

        let result: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TelegramError::Response(e.without_url().to_string()))?;

        if !result.ok {
            let description = result
                .description
                .unwrap_or_else(|| "Unknown error".to_string());
            error!(method, error = %description, "Telegram API error");
            return Err(TelegramError::Api {
                code: result.error_code.unwrap_or_default(),
                description,
            });
        }

        result
            .result
            .ok_or_else(|| TelegramError::Response(format!("{method} returned no result")))
    }
}

/// Constant-time string comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}
