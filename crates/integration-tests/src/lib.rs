//! Integration tests for Bakery Orders.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bakery-orders-integration-tests
//! ```
//!
//! Nothing here talks to Telegram or an SMTP server. The fakes in this crate
//! stand in for both transports and for the counter store when a test needs
//! to inject failures or latency.
//!
//! # Test Categories
//!
//! - `order_sequencer` - numbering, rollover and counter durability
//! - `dispatch` - per-channel failure isolation
//! - `checkout_flow` - checkout outcomes end to end
//! - `webhook` - the HTTP surface Telegram calls

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bakery_orders_bot::services::{
    BackgroundTasks, CartStore, ChatSender, CheckoutService, CounterStore, CounterStoreError,
    EmailBody, EmailError, EmailSender, NotificationDispatcher, OrderSequencer,
};
use bakery_orders_bot::telegram::{ParseMode, TelegramError};
use bakery_orders_core::{ChatId, Clock, Email, ManualClock, StoredCounter};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde_json::{Value, json};

/// Staff group used by the test wiring.
pub const STAFF_CHAT: ChatId = ChatId::new(-100_200_300);

/// Staff mailbox used by the test wiring.
pub const STAFF_EMAIL: &str = "orders@bakery.example";

/// UTC+3, the store's local time.
#[must_use]
pub fn store_offset() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).unwrap()
}

/// 09:00 UTC on the given day.
#[must_use]
pub fn morning(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 0, 0).unwrap()
}

// =============================================================================
// Counter stores
// =============================================================================

/// Counter store kept in memory, with an optional delay on every save.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    record: Mutex<Option<StoredCounter>>,
    save_delay: Option<Duration>,
    fail_saves: bool,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn with_record(record: StoredCounter) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            ..Self::default()
        }
    }

    /// Every save sleeps for `delay` before writing.
    #[must_use]
    pub fn slow(delay: Duration) -> Self {
        Self {
            save_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Every save returns an I/O error.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn record(&self) -> Option<StoredCounter> {
        *self.record.lock().unwrap()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn load(&self) -> Result<Option<StoredCounter>, CounterStoreError> {
        Ok(self.record())
    }

    async fn save(&self, record: &StoredCounter) -> Result<(), CounterStoreError> {
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_saves {
            return Err(CounterStoreError::Io(std::io::Error::other("disk full")));
        }
        *self.record.lock().unwrap() = Some(*record);
        Ok(())
    }
}

// =============================================================================
// Transports
// =============================================================================

/// A chat message as the fake transport saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentChat {
    pub chat_id: ChatId,
    pub text: String,
    pub parse_mode: ParseMode,
}

/// Chat transport that records every send and fails for chosen chats.
#[derive(Debug, Default)]
pub struct RecordingChat {
    failing: Vec<ChatId>,
    reject_html: bool,
    sent: Mutex<Vec<SentChat>>,
}

impl RecordingChat {
    /// Sends to any of `chats` fail with a Bot API error.
    #[must_use]
    pub fn failing_for(chats: &[ChatId]) -> Self {
        Self {
            failing: chats.to_vec(),
            ..Self::default()
        }
    }

    /// Every HTML send fails, as when Telegram cannot parse the entities.
    #[must_use]
    pub fn rejecting_html() -> Self {
        Self {
            reject_html: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn sent(&self) -> Vec<SentChat> {
        self.sent.lock().unwrap().clone()
    }

    #[must_use]
    pub fn sent_to(&self, chat_id: ChatId) -> Vec<SentChat> {
        self.sent()
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .collect()
    }
}

#[async_trait]
impl ChatSender for RecordingChat {
    async fn send(
        &self,
        chat_id: ChatId,
        text: &str,
        parse_mode: ParseMode,
    ) -> Result<(), TelegramError> {
        self.sent.lock().unwrap().push(SentChat {
            chat_id,
            text: text.to_string(),
            parse_mode,
        });
        if self.failing.contains(&chat_id) {
            return Err(TelegramError::Api {
                code: 403,
                description: "Forbidden: bot was blocked by the user".to_string(),
            });
        }
        if self.reject_html && parse_mode == ParseMode::Html {
            return Err(TelegramError::Api {
                code: 400,
                description: "Bad Request: can't parse entities".to_string(),
            });
        }
        Ok(())
    }
}

/// Email transport that records every send and fails for chosen addresses.
#[derive(Debug, Default)]
pub struct RecordingEmail {
    failing: Vec<String>,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingEmail {
    #[must_use]
    pub fn failing_for(addresses: &[&str]) -> Self {
        Self {
            failing: addresses.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    /// `(recipient, subject)` pairs, sorted by recipient.
    #[must_use]
    pub fn sent(&self) -> Vec<(String, String)> {
        let mut sent = self.sent.lock().unwrap().clone();
        sent.sort();
        sent
    }
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send(&self, to: &Email, subject: &str, _body: &EmailBody) -> Result<(), EmailError> {
        if self.failing.iter().any(|a| a == to.as_str()) {
            return Err(EmailError::InvalidAddress(format!(
                "mailbox unavailable: {to}"
            )));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

// =============================================================================
// Wiring
// =============================================================================

/// Services built for one test, with handles on the fakes behind them.
pub struct Harness {
    pub checkout: CheckoutService,
    pub chat: Arc<RecordingChat>,
    pub email: Arc<RecordingEmail>,
    pub store: Arc<MemoryCounterStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// Wire a checkout service over the given fakes, with staff chat and
    /// staff email configured.
    pub async fn new(
        chat: RecordingChat,
        email: RecordingEmail,
        store: MemoryCounterStore,
        now: DateTime<Utc>,
    ) -> Self {
        let chat = Arc::new(chat);
        let email = Arc::new(email);
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::new(now));

        let sequencer = OrderSequencer::load(
            store.clone(),
            clock.clone() as Arc<dyn Clock>,
            store_offset(),
            Duration::from_secs(5),
        )
        .await;
        let dispatcher = NotificationDispatcher::new(
            chat.clone(),
            Some(email.clone()),
            Some(STAFF_CHAT),
            Some(Email::parse(STAFF_EMAIL).unwrap()),
            BackgroundTasks::new(),
        );
        let checkout = CheckoutService::new(
            Arc::new(sequencer),
            dispatcher,
            CartStore::new(),
            chat.clone(),
        );

        Self {
            checkout,
            chat,
            email,
            store,
            clock,
        }
    }

    /// Harness with well-behaved fakes, fixed at 21 May 2024.
    pub async fn healthy() -> Self {
        Self::new(
            RecordingChat::default(),
            RecordingEmail::default(),
            MemoryCounterStore::default(),
            morning(2024, 5, 21),
        )
        .await
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// A valid `checkout_order` payload: two buns at 3.50 for pickup.
#[must_use]
pub fn checkout_payload() -> Value {
    json!({
        "action": "checkout_order",
        "order_details": {
            "firstName": "Anna",
            "lastName": "Petrova",
            "phone": "+375291172577",
            "email": "anna@example.com",
            "deliveryMethod": "pickup",
            "pickupAddress": "Pritytskogo 156",
            "paymentMethod": "card"
        },
        "cart_items": [
            {"id": "bun-1", "name": "Bun", "price": 3.5, "quantity": 2}
        ],
        "total_amount": 7.0
    })
}

/// A Bot API update carrying `data` as Web App data from `user_id`.
#[must_use]
pub fn web_app_update(update_id: i64, user_id: i64, data: &Value) -> Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": 10,
            "from": {"id": user_id, "is_bot": false, "first_name": "Anna"},
            "chat": {"id": user_id, "type": "private"},
            "date": 1_716_282_000,
            "web_app_data": {
                "data": data.to_string(),
                "button_text": "Open shop"
            }
        }
    })
}
