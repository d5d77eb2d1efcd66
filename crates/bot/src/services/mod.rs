//! Services behind the webhook: order sequencing, notification fan-out,
//! carts and checkout.

pub mod background;
pub mod cart;
pub mod channels;
pub mod checkout;
pub mod counter_store;
pub mod dispatcher;
pub mod email;
pub mod sequencer;

pub use background::{BackgroundTasks, TaskStats};
pub use cart::{Cart, CartStore};
pub use channels::{ChatSender, EmailSender};
pub use checkout::{CheckoutOutcome, CheckoutService, DegradedReason};
pub use counter_store::{CounterStore, CounterStoreError, JsonFileCounterStore};
pub use dispatcher::{Channel, ChannelStatus, DispatchReport, NotificationDispatcher};
pub use email::{EmailBody, EmailError, EmailService};
pub use sequencer::{Assignment, OrderSequencer, Persistence};
