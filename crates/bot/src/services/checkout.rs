//! Checkout orchestration.
//!
//! A checkout moves through
//! `Validating -> NumberAssigned -> NotificationsDispatched -> CartCleared -> Responded`,
//! or ends in `Rejected` when the payload fails validation. Only validation
//! can stop an order; every later fault degrades the outcome instead.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bakery_orders_core::{
    CartUpdate, ChatId, CheckoutRequest, CustomerId, Money, OrderContext, OrderNumber,
    ValidationError,
};
use futures::FutureExt;
use rust_decimal::Decimal;
use tracing::{debug, error, info, instrument, warn};

use super::background::panic_message;
use super::cart::CartStore;
use super::channels::ChatSender;
use super::dispatcher::{Channel, NotificationDispatcher};
use super::sequencer::{OrderSequencer, Persistence};
use crate::telegram::ParseMode;
use crate::telegram::messages::{
    build_cart_updated_message, build_critical_message, build_order_acknowledgment,
    build_plain_acknowledgment, build_rejection_message,
};

/// Smallest order total the store delivers by courier. Logged, not enforced.
pub const COURIER_MINIMUM_TOTAL: Money = Money::new(Decimal::from_parts(70, 0, 0, false, 0));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckoutStage {
    Validating,
    NumberAssigned,
    NotificationsDispatched,
    CartCleared,
    Responded,
    Rejected,
}

impl CheckoutStage {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::NumberAssigned => "number_assigned",
            Self::NotificationsDispatched => "notifications_dispatched",
            Self::CartCleared => "cart_cleared",
            Self::Responded => "responded",
            Self::Rejected => "rejected",
        }
    }
}

fn enter(stage: CheckoutStage) {
    debug!(stage = stage.as_str(), "Checkout stage");
}

/// Something that went wrong after the order was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedReason {
    /// The sequencer issued a `#ERROR_` number.
    FallbackOrderNumber,
    /// The counter was not written after the increment.
    CounterNotSaved(Persistence),
    /// A chat notification failed.
    NotificationFailed(Channel),
    /// Notification dispatch panicked.
    DispatchPanicked(String),
    /// Clearing the cart or answering the customer panicked.
    CheckoutPanicked(String),
    /// The HTML acknowledgment failed; the plain one was delivered.
    AcknowledgmentDowngraded,
    /// No reply reached the customer.
    CustomerNotAnswered,
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FallbackOrderNumber => f.write_str("fallback order number"),
            Self::CounterNotSaved(persistence) => {
                write!(f, "order counter not saved ({persistence:?})")
            }
            Self::NotificationFailed(channel) => write!(f, "{channel} notification failed"),
            Self::DispatchPanicked(message) => write!(f, "dispatch panicked: {message}"),
            Self::CheckoutPanicked(message) => write!(f, "checkout panicked: {message}"),
            Self::AcknowledgmentDowngraded => f.write_str("acknowledgment sent as plain text"),
            Self::CustomerNotAnswered => f.write_str("customer not answered"),
        }
    }
}

/// Result of one checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Everything went through.
    Placed { order_number: OrderNumber },
    /// The order stands but something failed along the way.
    PlacedDegraded {
        order_number: OrderNumber,
        reasons: Vec<DegradedReason>,
    },
    /// Validation failed; nothing was changed.
    Rejected { reason: ValidationError },
}

impl CheckoutOutcome {
    /// The issued order number, unless the checkout was rejected.
    #[must_use]
    pub const fn order_number(&self) -> Option<&OrderNumber> {
        match self {
            Self::Placed { order_number } | Self::PlacedDegraded { order_number, .. } => {
                Some(order_number)
            }
            Self::Rejected { .. } => None,
        }
    }

    /// `true` for both placed variants.
    #[must_use]
    pub const fn is_placed(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Runs checkouts and cart updates coming from the Web App.
#[derive(Clone)]
pub struct CheckoutService {
    sequencer: Arc<OrderSequencer>,
    dispatcher: NotificationDispatcher,
    carts: CartStore,
    chat: Arc<dyn ChatSender>,
}

impl fmt::Debug for CheckoutService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckoutService")
            .field("sequencer", &self.sequencer)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        sequencer: Arc<OrderSequencer>,
        dispatcher: NotificationDispatcher,
        carts: CartStore,
        chat: Arc<dyn ChatSender>,
    ) -> Self {
        Self {
            sequencer,
            dispatcher,
            carts,
            chat,
        }
    }

    #[must_use]
    pub const fn carts(&self) -> &CartStore {
        &self.carts
    }

    #[must_use]
    pub const fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Place an order from a `checkout_order` payload.
    ///
    /// Once validation passes the order is placed no matter what fails
    /// afterwards; such failures are listed in
    /// [`CheckoutOutcome::PlacedDegraded`].
    #[instrument(skip(self, request), fields(customer_id = %customer, order_number = tracing::field::Empty))]
    pub async fn checkout(
        &self,
        customer: CustomerId,
        chat: ChatId,
        request: &CheckoutRequest,
    ) -> CheckoutOutcome {
        enter(CheckoutStage::Validating);
        let order = match request.validate(customer, chat) {
            Ok(order) => order,
            Err(reason) => {
                enter(CheckoutStage::Rejected);
                warn!(error = %reason, "Checkout rejected");
                self.reply(chat, &build_rejection_message(&reason), ParseMode::Plain)
                    .await;
                return CheckoutOutcome::Rejected { reason };
            }
        };

        if order.items_total() != order.total {
            warn!(
                items_total = %order.items_total(),
                total = %order.total,
                "Order total differs from the sum of its lines"
            );
        }
        if order.fulfilment.is_courier() && order.total < COURIER_MINIMUM_TOTAL {
            info!(total = %order.total, "Courier order below the delivery minimum");
        }

        let assignment = self.sequencer.next_order_number().await;
        let order_number = assignment.number;
        tracing::Span::current().record("order_number", tracing::field::display(&order_number));
        enter(CheckoutStage::NumberAssigned);

        let mut reasons = Vec::new();
        if order_number.is_fallback() {
            reasons.push(DegradedReason::FallbackOrderNumber);
        }
        match assignment.persistence {
            Persistence::Saved | Persistence::NotAttempted => {}
            other => reasons.push(DegradedReason::CounterNotSaved(other)),
        }

        let finished = AssertUnwindSafe(self.finish(customer, chat, &order_number, &order))
            .catch_unwind()
            .await;
        match finished {
            Ok(tail) => reasons.extend(tail),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "Checkout panicked after the order number was assigned");
                reasons.push(DegradedReason::CheckoutPanicked(message));
                self.carts.clear(customer);
                if !self.reply_critical(chat, &order_number).await {
                    reasons.push(DegradedReason::CustomerNotAnswered);
                }
            }
        }

        if reasons.is_empty() {
            info!("Order placed");
            CheckoutOutcome::Placed { order_number }
        } else {
            let summary: Vec<String> = reasons.iter().map(ToString::to_string).collect();
            warn!(reasons = ?summary, "Order placed with degradations");
            CheckoutOutcome::PlacedDegraded {
                order_number,
                reasons,
            }
        }
    }

    /// Notify, clear the cart and answer the customer for a numbered order.
    async fn finish(
        &self,
        customer: CustomerId,
        chat: ChatId,
        order_number: &OrderNumber,
        order: &OrderContext,
    ) -> Vec<DegradedReason> {
        let mut reasons = Vec::new();

        let dispatched = AssertUnwindSafe(self.dispatcher.dispatch(order_number, order))
            .catch_unwind()
            .await;
        let critical = match dispatched {
            Ok(report) => {
                reasons.extend(report.failures().map(DegradedReason::NotificationFailed));
                false
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "Notification dispatch panicked");
                reasons.push(DegradedReason::DispatchPanicked(message));
                true
            }
        };
        enter(CheckoutStage::NotificationsDispatched);

        self.carts.clear(customer);
        enter(CheckoutStage::CartCleared);

        if critical {
            if !self.reply_critical(chat, order_number).await {
                reasons.push(DegradedReason::CustomerNotAnswered);
            }
        } else if let Some(reason) = self.acknowledge(chat, order_number).await {
            reasons.push(reason);
        }
        enter(CheckoutStage::Responded);

        reasons
    }

    /// Tell the customer to get in touch; a panicking transport counts as
    /// not delivered.
    async fn reply_critical(&self, chat: ChatId, order_number: &OrderNumber) -> bool {
        AssertUnwindSafe(self.reply(chat, &build_critical_message(order_number), ParseMode::Plain))
            .catch_unwind()
            .await
            .unwrap_or(false)
    }

    /// Replace the customer's cart from an `update_cart` payload and tell
    /// them how many items it now holds.
    #[instrument(skip(self, update), fields(customer_id = %customer))]
    pub async fn update_cart(&self, customer: CustomerId, chat: ChatId, update: &CartUpdate) -> u64 {
        let count = self.carts.replace(customer, &update.cart);
        info!(items = count, "Cart updated");
        self.reply(chat, &build_cart_updated_message(count), ParseMode::Plain)
            .await;
        count
    }

    /// Send the HTML acknowledgment, falling back to plain text once.
    async fn acknowledge(&self, chat: ChatId, order_number: &OrderNumber) -> Option<DegradedReason> {
        let html = build_order_acknowledgment(order_number);
        match self.chat.send(chat, &html, ParseMode::Html).await {
            Ok(()) => return None,
            Err(e) => warn!(error = %e, "Acknowledgment failed, retrying as plain text"),
        }

        let plain = build_plain_acknowledgment(order_number);
        match self.chat.send(chat, &plain, ParseMode::Plain).await {
            Ok(()) => Some(DegradedReason::AcknowledgmentDowngraded),
            Err(e) => {
                error!(error = %e, "Could not acknowledge order to customer");
                Some(DegradedReason::CustomerNotAnswered)
            }
        }
    }

    /// Best-effort message to a customer chat; returns whether it was
    /// delivered.
    pub async fn reply(&self, chat: ChatId, text: &str, parse_mode: ParseMode) -> bool {
        match self.chat.send(chat, text, parse_mode).await {
            Ok(()) => true,
            Err(e) => {
                warn!(chat_id = %chat, error = %e, "Reply to customer failed");
                false
            }
        }
    }
}
