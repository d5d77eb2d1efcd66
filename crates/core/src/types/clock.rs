//! Time source abstraction.
//!
//! Order numbers depend on the calendar date, so anything that issues them
//! takes a [`Clock`] instead of calling `Utc::now()` directly.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Months, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    time: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `time`.
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }

    /// Jump to `time`.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
    }

    /// Move forward by whole calendar months.
    pub fn advance_months(&self, months: u32) {
        let mut guard = self.time.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = guard.checked_add_months(Months::new(months)) {
            *guard = next;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
