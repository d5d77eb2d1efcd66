//! Bakery Orders Core - Shared types library.
//!
//! This crate provides the order domain used by the bot service and its tests:
//! - `bot` - Telegram webhook service that takes orders and notifies staff
//! - `integration-tests` - End-to-end checkout and sequencing tests
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no network
//! clients. Validation of mini app payloads lives here so that everything
//! downstream works with checked values.
//!
//! # Modules
//!
//! - [`types`] - Order numbers, counter records, checkout payloads, money,
//!   phone formatting, IDs and the clock abstraction

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
