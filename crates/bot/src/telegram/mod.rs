//! Telegram Bot API integration.
//!
//! This module provides:
//! - [`TelegramClient`] for sending messages and registering the webhook
//! - Update types for decoding webhook deliveries
//! - Message builders for the order flow
//! - Webhook secret verification
//!
//! # Flow
//!
//! 1. Telegram posts an [`Update`] to the webhook endpoint
//! 2. The handler verifies the secret token header
//! 3. Web App data is decoded and routed to the cart or checkout service
//! 4. Replies and staff alerts go out through [`TelegramClient::send_message`]

mod client;
mod error;
pub mod messages;
mod types;

pub use client::{TelegramClient, constant_time_compare};
pub use error::TelegramError;
pub use types::{ApiResponse, Chat, Message, ParseMode, Update, User, WebAppData};
