//! Core types for the bakery order desk.
//!
//! This module provides type-safe wrappers for the order domain.

pub mod clock;
pub mod email;
pub mod id;
pub mod money;
pub mod order;
pub mod order_number;
pub mod phone;
pub mod web_app;

pub use clock::{Clock, ManualClock, SystemClock};
pub use email::{Email, EmailError};
pub use id::*;
pub use money::Money;
pub use order::{
    CartItem, CheckoutRequest, CustomerDetails, Fulfilment, LineItem, OrderContext, OrderDetails,
    PaymentMethod, ValidationError,
};
pub use order_number::{CounterRecord, OrderNumber, OrderNumberError, Period, StoredCounter};
pub use phone::format_phone;
pub use web_app::{CartUpdate, CartUpdateItem, WebAppAction, WebAppError};
