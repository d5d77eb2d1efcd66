//! Delivery seams for the two notification transports.
//!
//! The dispatcher and the checkout service only see these traits, so tests
//! can swap the Bot API and SMTP for in-process fakes.

use async_trait::async_trait;
use bakery_orders_core::{ChatId, Email};

use super::email::{EmailBody, EmailError, EmailService};
use crate::telegram::{ParseMode, TelegramClient, TelegramError};

/// Deliver a chat message.
#[async_trait]
pub trait ChatSender: Send + Sync {
    /// Send `text` to `chat_id`.
    async fn send(&self, chat_id: ChatId, text: &str, parse_mode: ParseMode)
    -> Result<(), TelegramError>;
}

/// Deliver an email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send a multipart message to `to`.
    async fn send(&self, to: &Email, subject: &str, body: &EmailBody) -> Result<(), EmailError>;
}

#[async_trait]
impl ChatSender for TelegramClient {
    async fn send(
        &self,
        chat_id: ChatId,
        text: &str,
        parse_mode: ParseMode,
    ) -> Result<(), TelegramError> {
        self.send_message(chat_id, text, parse_mode).await
    }
}

#[async_trait]
impl EmailSender for EmailService {
    async fn send(&self, to: &Email, subject: &str, body: &EmailBody) -> Result<(), EmailError> {
        self.send_multipart_email(to, subject, body).await
    }
}
