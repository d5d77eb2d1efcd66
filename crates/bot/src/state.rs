//! Application state shared across handlers.

use std::sync::Arc;

use bakery_orders_core::SystemClock;
use secrecy::SecretString;

use crate::config::BotConfig;
use crate::services::{
    BackgroundTasks, CartStore, ChatSender, CheckoutService, EmailSender, EmailService,
    JsonFileCounterStore, NotificationDispatcher, OrderSequencer,
};
use crate::telegram::TelegramClient;

/// Error creating the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("email transport: {0}")]
    Email(#[from] lettre::transport::smtp::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    checkout: CheckoutService,
    webhook_secret: Option<SecretString>,
}

impl AppState {
    /// Wire up the production services.
    ///
    /// Loads the order counter from `ORDER_COUNTER_FILE`, so this should run
    /// once at start-up.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP transport cannot be configured.
    pub async fn new(config: &BotConfig, telegram: TelegramClient) -> Result<Self, StateError> {
        let chat: Arc<dyn ChatSender> = Arc::new(telegram);

        let (email, staff_email) = match config.email() {
            Some(email_config) => {
                let service: Arc<dyn EmailSender> = Arc::new(EmailService::new(email_config)?);
                (Some(service), Some(email_config.from_address.clone()))
            }
            None => {
                tracing::warn!("Email not configured; order emails are disabled");
                (None, None)
            }
        };

        let sequencer = OrderSequencer::load(
            Arc::new(JsonFileCounterStore::new(&config.orders.counter_file)),
            Arc::new(SystemClock),
            config.orders.store_offset,
            config.orders.persist_timeout,
        )
        .await;

        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&chat),
            email,
            config.admin_chat_id,
            staff_email,
            BackgroundTasks::new(),
        );

        let checkout = CheckoutService::new(Arc::new(sequencer), dispatcher, CartStore::new(), chat);

        Ok(Self::from_parts(
            checkout,
            config.telegram.webhook_secret.clone(),
        ))
    }

    /// Build state from already constructed services.
    #[must_use]
    pub fn from_parts(checkout: CheckoutService, webhook_secret: Option<SecretString>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                checkout,
                webhook_secret,
            }),
        }
    }

    /// Get a reference to the checkout service.
    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    /// Secret Telegram must echo in `X-Telegram-Bot-Api-Secret-Token`.
    #[must_use]
    pub fn webhook_secret(&self) -> Option<&SecretString> {
        self.inner.webhook_secret.as_ref()
    }

    /// Supervisor of background email deliveries.
    #[must_use]
    pub fn background(&self) -> &BackgroundTasks {
        self.inner.checkout.dispatcher().background()
    }
}
