//! Order notification fan-out.
//!
//! One placed order produces up to four notifications:
//!
//! | Channel | Recipient | Execution |
//! |---|---|---|
//! | Staff alert | `ADMIN_CHAT_ID` | awaited |
//! | Customer confirmation | customer's chat | awaited |
//! | Staff email | `ADMIN_EMAIL` | background |
//! | Customer email | address from the order form | background |
//!
//! Every channel has its own failure boundary. A failed or unconfigured
//! channel is logged and the next one is still attempted.

use std::fmt;
use std::sync::Arc;

use bakery_orders_core::{ChatId, Email, OrderContext, OrderNumber};
use tracing::{error, info, instrument, warn};

use super::background::BackgroundTasks;
use super::channels::{ChatSender, EmailSender};
use super::email::{Audience, EmailError, render_order_email};
use crate::telegram::ParseMode;
use crate::telegram::messages::{build_customer_confirmation, build_staff_alert};

/// A notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    StaffChat,
    CustomerChat,
    StaffEmail,
    CustomerEmail,
}

impl Channel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StaffChat => "staff_chat",
            Self::CustomerChat => "customer_chat",
            Self::StaffEmail => "staff_email",
            Self::CustomerEmail => "customer_email",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// The message was accepted by the transport.
    Delivered,
    /// The transport reported an error.
    Failed(String),
    /// Nothing to send to, or the transport is not configured.
    Skipped(&'static str),
    /// Handed to the background supervisor; the outcome shows up in its stats.
    Scheduled,
}

/// Per-channel outcome of one dispatch, in attempt order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    entries: Vec<(Channel, ChannelStatus)>,
}

impl DispatchReport {
    fn record(&mut self, channel: Channel, status: ChannelStatus) {
        self.entries.push((channel, status));
    }

    /// Status of `channel`, if it was considered.
    #[must_use]
    pub fn status(&self, channel: Channel) -> Option<&ChannelStatus> {
        self.entries
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, status)| status)
    }

    /// All entries in attempt order.
    #[must_use]
    pub fn entries(&self) -> &[(Channel, ChannelStatus)] {
        &self.entries
    }

    /// Channels whose synchronous attempt failed.
    pub fn failures(&self) -> impl Iterator<Item = Channel> + '_ {
        self.entries
            .iter()
            .filter(|(_, status)| matches!(status, ChannelStatus::Failed(_)))
            .map(|(channel, _)| *channel)
    }
}

/// Fans a placed order out to staff and customer.
#[derive(Clone)]
pub struct NotificationDispatcher {
    chat: Arc<dyn ChatSender>,
    email: Option<Arc<dyn EmailSender>>,
    staff_chat: Option<ChatId>,
    staff_email: Option<Email>,
    background: BackgroundTasks,
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("email_enabled", &self.email.is_some())
            .field("staff_chat", &self.staff_chat)
            .field("staff_email", &self.staff_email)
            .finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    /// `email` and `staff_email` are `None` when SMTP is not configured.
    #[must_use]
    pub fn new(
        chat: Arc<dyn ChatSender>,
        email: Option<Arc<dyn EmailSender>>,
        staff_chat: Option<ChatId>,
        staff_email: Option<Email>,
        background: BackgroundTasks,
    ) -> Self {
        Self {
            chat,
            email,
            staff_chat,
            staff_email,
            background,
        }
    }

    /// Supervisor running the email deliveries.
    #[must_use]
    pub const fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    /// Send all notifications for a placed order.
    ///
    /// Chat messages are awaited, staff first. Emails are rendered and sent in
    /// background tasks. Never fails; see the returned report for outcomes.
    #[instrument(skip(self, order), fields(order_number = %order_number, customer_id = %order.customer.customer_id))]
    pub async fn dispatch(&self, order_number: &OrderNumber, order: &OrderContext) -> DispatchReport {
        let mut report = DispatchReport::default();

        let staff_chat = match self.staff_chat {
            Some(chat_id) => {
                let text = build_staff_alert(order_number, order);
                self.send_chat(Channel::StaffChat, chat_id, &text).await
            }
            None => skipped(Channel::StaffChat, "ADMIN_CHAT_ID not configured"),
        };
        report.record(Channel::StaffChat, staff_chat);

        let text = build_customer_confirmation(order_number, order);
        let customer_chat = self
            .send_chat(Channel::CustomerChat, order.customer.chat_id, &text)
            .await;
        report.record(Channel::CustomerChat, customer_chat);

        let Some(sender) = &self.email else {
            report.record(
                Channel::StaffEmail,
                skipped(Channel::StaffEmail, "email not configured"),
            );
            report.record(
                Channel::CustomerEmail,
                skipped(Channel::CustomerEmail, "email not configured"),
            );
            return report;
        };

        let order = Arc::new(order.clone());
        let staff_email = match &self.staff_email {
            Some(to) => self.schedule_email(
                Channel::StaffEmail,
                Arc::clone(sender),
                to.clone(),
                order_number,
                &order,
                Audience::Staff,
            ),
            None => skipped(Channel::StaffEmail, "ADMIN_EMAIL not configured"),
        };
        report.record(Channel::StaffEmail, staff_email);

        let customer_email = match &order.customer.email {
            Some(to) => self.schedule_email(
                Channel::CustomerEmail,
                Arc::clone(sender),
                to.clone(),
                order_number,
                &order,
                Audience::Customer,
            ),
            None => skipped(Channel::CustomerEmail, "customer gave no email"),
        };
        report.record(Channel::CustomerEmail, customer_email);

        info!(
            failures = report.failures().count(),
            "Order notifications processed"
        );
        report
    }

    async fn send_chat(&self, channel: Channel, chat_id: ChatId, text: &str) -> ChannelStatus {
        match self.chat.send(chat_id, text, ParseMode::Html).await {
            Ok(()) => {
                info!(channel = %channel, chat_id = %chat_id, "Notification delivered");
                ChannelStatus::Delivered
            }
            Err(e) => {
                error!(channel = %channel, chat_id = %chat_id, error = %e, "Notification failed");
                ChannelStatus::Failed(e.to_string())
            }
        }
    }

    fn schedule_email(
        &self,
        channel: Channel,
        sender: Arc<dyn EmailSender>,
        to: Email,
        order_number: &OrderNumber,
        order: &Arc<OrderContext>,
        audience: Audience,
    ) -> ChannelStatus {
        let order_number = order_number.clone();
        let order = Arc::clone(order);

        self.background.spawn(channel.as_str(), async move {
            let email = render_order_email(&order_number, &order, audience)?;
            sender.send(&to, &email.subject, &email.body).await?;
            info!(channel = %channel, to = %to, "Notification delivered");
            Ok::<(), EmailError>(())
        });

        info!(channel = %channel, "Email notification scheduled");
        ChannelStatus::Scheduled
    }
}

fn skipped(channel: Channel, reason: &'static str) -> ChannelStatus {
    warn!(channel = %channel, reason, "Notification skipped");
    ChannelStatus::Skipped(reason)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bakery_orders_core::{
        CustomerDetails, CustomerId, Fulfilment, LineItem, Money, PaymentMethod,
    };
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;
    use crate::services::email::EmailBody;
    use crate::telegram::TelegramError;

    const STAFF: ChatId = ChatId::new(-100);

    #[derive(Default)]
    struct RecordingChat {
        fail_for: Option<ChatId>,
        sent: Mutex<Vec<ChatId>>,
    }

    #[async_trait]
    impl ChatSender for RecordingChat {
        async fn send(
            &self,
            chat_id: ChatId,
            _text: &str,
            _parse_mode: ParseMode,
        ) -> Result<(), TelegramError> {
            self.sent.lock().unwrap().push(chat_id);
            if self.fail_for == Some(chat_id) {
                return Err(TelegramError::Api {
                    code: 400,
                    description: "Bad Request: chat not found".to_string(),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingEmail {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl EmailSender for RecordingEmail {
        async fn send(&self, to: &Email, subject: &str, _body: &EmailBody) -> Result<(), EmailError> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    fn order(email: Option<&str>) -> OrderContext {
        OrderContext {
            customer: CustomerDetails {
                customer_id: CustomerId::new(1001),
                chat_id: ChatId::new(1001),
                first_name: "Anna".to_string(),
                last_name: "Petrova".to_string(),
                middle_name: None,
                phone: "+375291172577".to_string(),
                email: email.map(|e| Email::parse(e).unwrap()),
            },
            fulfilment: Fulfilment::Pickup {
                address: "Pritytskogo 156".to_string(),
                comment: None,
            },
            delivery_date: None,
            payment: Some(PaymentMethod::Card),
            items: vec![LineItem {
                id: "b1".to_string(),
                name: "Bun".to_string(),
                unit_price: Money::new(Decimal::new(350, 2)),
                quantity: 2,
            }],
            total: Money::new(Decimal::new(700, 2)),
        }
    }

    fn number() -> OrderNumber {
        OrderNumber::sequenced(NaiveDate::from_ymd_opt(2024, 5, 21).unwrap(), 1).unwrap()
    }

    #[tokio::test]
    async fn test_staff_chat_failure_does_not_stop_other_channels() {
        let chat = Arc::new(RecordingChat {
            fail_for: Some(STAFF),
            ..Default::default()
        });
        let email = Arc::new(RecordingEmail::default());
        let dispatcher = NotificationDispatcher::new(
            chat.clone(),
            Some(email.clone()),
            Some(STAFF),
            Some(Email::parse("orders@bakery.example").unwrap()),
            BackgroundTasks::new(),
        );

        let report = dispatcher
            .dispatch(&number(), &order(Some("anna@example.com")))
            .await;
        dispatcher.background().wait_idle().await;

        assert!(matches!(
            report.status(Channel::StaffChat),
            Some(ChannelStatus::Failed(_))
        ));
        assert_eq!(
            report.status(Channel::CustomerChat),
            Some(&ChannelStatus::Delivered)
        );
        assert_eq!(
            report.status(Channel::StaffEmail),
            Some(&ChannelStatus::Scheduled)
        );
        assert_eq!(
            report.status(Channel::CustomerEmail),
            Some(&ChannelStatus::Scheduled)
        );
        assert_eq!(
            *chat.sent.lock().unwrap(),
            vec![STAFF, ChatId::new(1001)]
        );

        let mut recipients: Vec<String> = email
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(to, _)| to.clone())
            .collect();
        recipients.sort();
        assert_eq!(recipients, vec!["anna@example.com", "orders@bakery.example"]);
        assert_eq!(dispatcher.background().stats().succeeded, 2);
    }

    #[tokio::test]
    async fn test_unconfigured_channels_are_skipped() {
        let chat = Arc::new(RecordingChat::default());
        let dispatcher =
            NotificationDispatcher::new(chat.clone(), None, None, None, BackgroundTasks::new());

        let report = dispatcher.dispatch(&number(), &order(None)).await;

        assert!(matches!(
            report.status(Channel::StaffChat),
            Some(ChannelStatus::Skipped(_))
        ));
        assert_eq!(
            report.status(Channel::CustomerChat),
            Some(&ChannelStatus::Delivered)
        );
        assert!(matches!(
            report.status(Channel::CustomerEmail),
            Some(ChannelStatus::Skipped(_))
        ));
        assert_eq!(report.failures().count(), 0);
        assert_eq!(dispatcher.background().stats().spawned, 0);
    }

    #[tokio::test]
    async fn test_customer_without_email_gets_no_email() {
        let email = Arc::new(RecordingEmail::default());
        let dispatcher = NotificationDispatcher::new(
            Arc::new(RecordingChat::default()),
            Some(email.clone()),
            Some(STAFF),
            Some(Email::parse("orders@bakery.example").unwrap()),
            BackgroundTasks::new(),
        );

        let report = dispatcher.dispatch(&number(), &order(None)).await;
        dispatcher.background().wait_idle().await;

        assert_eq!(
            report.status(Channel::CustomerEmail),
            Some(&ChannelStatus::Skipped("customer gave no email"))
        );
        let sent = email.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with("New order #210524/001"));
    }
}
