//! Order numbers and the persisted counter record behind them.
//!
//! Order numbers look like `#210524/007`: day, month and two-digit year of
//! the order followed by the sequence within the current calendar month.

use core::fmt;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

/// Errors raised while building an [`OrderNumber`] or resolving a
/// [`StoredCounter`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderNumberError {
    /// Sequences start at 1.
    #[error("order sequence must start at 1")]
    ZeroSequence,
    /// The counter cannot be incremented any further.
    #[error("order counter overflowed at {0}")]
    CounterOverflow(u32),
    /// Stored month is outside 1..=12.
    #[error("stored month {0} is not a calendar month")]
    InvalidMonth(u32),
}

/// A calendar month, the unit the sequence counter rolls over on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    /// Build a period, validating the month.
    ///
    /// # Errors
    ///
    /// Returns [`OrderNumberError::InvalidMonth`] for months outside 1..=12.
    pub const fn new(year: i32, month: u32) -> Result<Self, OrderNumberError> {
        if month == 0 || month > 12 {
            return Err(OrderNumberError::InvalidMonth(month));
        }
        Ok(Self { year, month })
    }

    /// The period containing `date`.
    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Calendar year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Calendar month, 1..=12.
    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// In-memory counter state owned by the order sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRecord {
    count: u32,
    period: Period,
}

impl CounterRecord {
    /// A record with the given count and period.
    #[must_use]
    pub const fn new(count: u32, period: Period) -> Self {
        Self { count, period }
    }

    /// A fresh record for `period` with no orders yet.
    #[must_use]
    pub const fn empty(period: Period) -> Self {
        Self { count: 0, period }
    }

    /// Orders issued so far in the period.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// The period the count belongs to.
    #[must_use]
    pub const fn period(&self) -> Period {
        self.period
    }

    /// Reset to zero if `current` is a later period.
    ///
    /// An earlier `current`, as seen after the clock steps back, keeps the
    /// record in its period. Returns the period that was left behind when a
    /// rollover happened.
    pub fn roll_to(&mut self, current: Period) -> Option<Period> {
        if current <= self.period {
            return None;
        }
        let previous = self.period;
        self.period = current;
        self.count = 0;
        Some(previous)
    }

    /// Advance the counter and return the new sequence.
    ///
    /// # Errors
    ///
    /// Returns [`OrderNumberError::CounterOverflow`] when the counter is
    /// already at its maximum; the record is left unchanged.
    pub fn increment(&mut self) -> Result<u32, OrderNumberError> {
        let next = self
            .count
            .checked_add(1)
            .ok_or(OrderNumberError::CounterOverflow(self.count))?;
        self.count = next;
        Ok(next)
    }

    /// Wire representation written to the counter store.
    #[must_use]
    pub const fn to_stored(&self) -> StoredCounter {
        StoredCounter {
            counter: self.count,
            month: self.period.month,
            year: Some(self.period.year),
        }
    }
}

/// The counter record as stored on disk:
/// `{"counter": 7, "month": 5, "year": 2024}`.
///
/// `year` is optional on read so records written without it still load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCounter {
    /// Orders issued in the stored month.
    pub counter: u32,
    /// Calendar month, 1..=12.
    pub month: u32,
    /// Calendar year, absent in records written by older versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

impl StoredCounter {
    /// Turn the stored values into a record, given the period it is loaded in.
    ///
    /// A record without a year is taken to belong to `current`'s year when
    /// its month matches, and to an older period otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`OrderNumberError::InvalidMonth`] for months outside 1..=12.
    pub fn resolve(self, current: Period) -> Result<CounterRecord, OrderNumberError> {
        let year = match self.year {
            Some(year) => year,
            None if self.month == current.month => current.year,
            None => current.year - 1,
        };
        let period = Period::new(year, self.month)?;
        Ok(CounterRecord::new(self.counter, period))
    }
}

/// A human-readable order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderNumber {
    /// Regular `#DDMMYY/NNN` identifier.
    Sequenced {
        /// Date the order was placed, in the store's time zone.
        date: NaiveDate,
        /// Sequence within the month, starting at 1.
        sequence: u32,
    },
    /// Degraded identifier `#ERROR_<unix-seconds>` issued when sequencing failed.
    Fallback {
        /// Seconds since the Unix epoch at issue time.
        unix_seconds: i64,
    },
}

impl OrderNumber {
    /// Build a sequenced order number.
    ///
    /// # Errors
    ///
    /// Returns [`OrderNumberError::ZeroSequence`] for a zero sequence.
    pub const fn sequenced(date: NaiveDate, sequence: u32) -> Result<Self, OrderNumberError> {
        if sequence == 0 {
            return Err(OrderNumberError::ZeroSequence);
        }
        Ok(Self::Sequenced { date, sequence })
    }

    /// Build a fallback order number from the given instant.
    #[must_use]
    pub fn fallback<Tz: TimeZone>(at: &DateTime<Tz>) -> Self {
        Self::Fallback {
            unix_seconds: at.timestamp(),
        }
    }

    /// `true` for numbers issued in degraded mode.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    /// Sequence within the month, if this is a regular number.
    #[must_use]
    pub const fn sequence(&self) -> Option<u32> {
        match self {
            Self::Sequenced { sequence, .. } => Some(*sequence),
            Self::Fallback { .. } => None,
        }
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequenced { date, sequence } => {
                write!(f, "#{}/{sequence:03}", date.format("%d%m%y"))
            }
            Self::Fallback { unix_seconds } => write!(f, "#ERROR_{unix_seconds}"),
        }
    }
}
