//! Order number sequencing.
//!
//! The sequencer owns the in-memory counter and is the only writer of the
//! counter store. Calls are serialized by one async mutex; the counter write
//! is bounded by a timeout so the lock is always released promptly.

use std::sync::Arc;
use std::time::Duration;

use bakery_orders_core::{Clock, CounterRecord, OrderNumber, Period, StoredCounter};
use chrono::{DateTime, FixedOffset};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use super::counter_store::CounterStore;

/// Outcome of writing the counter after an increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    /// The store accepted the new count.
    Saved,
    /// The store returned an error.
    Failed(String),
    /// The store did not answer within the persist timeout.
    TimedOut,
    /// No write was attempted because no sequence was issued.
    NotAttempted,
}

/// An issued order number and what happened to the counter write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub number: OrderNumber,
    pub persistence: Persistence,
}

impl Assignment {
    /// `true` when the number is a fallback or the counter was not saved.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.number.is_fallback() || self.persistence != Persistence::Saved
    }
}

/// Issues `#DDMMYY/NNN` order numbers.
pub struct OrderSequencer {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    persist_timeout: Duration,
    state: Mutex<CounterRecord>,
}

impl std::fmt::Debug for OrderSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderSequencer")
            .field("offset", &self.offset)
            .field("persist_timeout", &self.persist_timeout)
            .finish_non_exhaustive()
    }
}

impl OrderSequencer {
    /// Load the counter and build a sequencer.
    ///
    /// Never fails: a missing, empty or unreadable record starts the current
    /// month at zero and is written back straight away. A record from an
    /// earlier month is rolled over before the first order.
    #[instrument(skip_all)]
    pub async fn load(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        offset: FixedOffset,
        persist_timeout: Duration,
    ) -> Self {
        let current = Period::of(clock.now().with_timezone(&offset).date_naive());

        let (record, dirty) = match store.load().await {
            Ok(Some(stored)) => match stored.resolve(current) {
                Ok(mut record) => {
                    let rolled = record.roll_to(current);
                    if let Some(previous) = rolled {
                        info!(from = %previous, to = %current, "Order counter rolled over at start-up");
                    }
                    info!(count = record.count(), period = %record.period(), "Order counter loaded");
                    (record, rolled.is_some())
                }
                Err(e) => {
                    warn!(error = %e, "Stored order counter is invalid, starting from 0");
                    (CounterRecord::empty(current), true)
                }
            },
            Ok(None) => {
                info!(period = %current, "No order counter stored, starting from 0");
                (CounterRecord::empty(current), true)
            }
            Err(e) => {
                warn!(error = %e, "Could not read order counter, starting from 0");
                (CounterRecord::empty(current), true)
            }
        };

        let sequencer = Self {
            store,
            clock,
            offset,
            persist_timeout,
            state: Mutex::new(record),
        };
        if dirty {
            let _ = sequencer.persist(record.to_stored()).await;
        }
        sequencer
    }

    /// Issue the next order number.
    ///
    /// Always returns a number. If the sequence cannot be advanced or
    /// formatted a `#ERROR_<unix-seconds>` fallback is returned instead.
    #[instrument(skip(self))]
    pub async fn next_order_number(&self) -> Assignment {
        let mut record = self.state.lock().await;
        let now = self.clock.now().with_timezone(&self.offset);
        let today = now.date_naive();

        if let Some(previous) = record.roll_to(Period::of(today)) {
            info!(from = %previous, to = %record.period(), "Order counter rolled over");
        }

        let sequence = match record.increment() {
            Ok(sequence) => sequence,
            Err(e) => {
                drop(record);
                return Self::fallback(&now, &e, Persistence::NotAttempted);
            }
        };

        let persistence = self.persist(record.to_stored()).await;
        drop(record);

        match OrderNumber::sequenced(today, sequence) {
            Ok(number) => {
                info!(order_number = %number, "Order number issued");
                Assignment {
                    number,
                    persistence,
                }
            }
            Err(e) => Self::fallback(&now, &e, persistence),
        }
    }

    /// Current in-memory counter.
    pub async fn snapshot(&self) -> CounterRecord {
        *self.state.lock().await
    }

    fn fallback(
        now: &DateTime<FixedOffset>,
        cause: &dyn std::fmt::Display,
        persistence: Persistence,
    ) -> Assignment {
        let number = OrderNumber::fallback(now);
        error!(order_number = %number, error = %cause, "Order sequencing failed, using fallback number");
        Assignment {
            number,
            persistence,
        }
    }

    async fn persist(&self, record: StoredCounter) -> Persistence {
        match tokio::time::timeout(self.persist_timeout, self.store.save(&record)).await {
            Ok(Ok(())) => Persistence::Saved,
            Ok(Err(e)) => {
                warn!(error = %e, counter = record.counter, "Failed to persist order counter");
                Persistence::Failed(e.to_string())
            }
            Err(_) => {
                warn!(
                    timeout_ms = u64::try_from(self.persist_timeout.as_millis()).unwrap_or(u64::MAX),
                    counter = record.counter,
                    "Timed out persisting order counter"
                );
                Persistence::TimedOut
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use bakery_orders_core::ManualClock;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::services::counter_store::CounterStoreError;

    #[derive(Default)]
    struct MemoryStore {
        record: StdMutex<Option<StoredCounter>>,
    }

    #[async_trait]
    impl CounterStore for MemoryStore {
        async fn load(&self) -> Result<Option<StoredCounter>, CounterStoreError> {
            Ok(*self.record.lock().unwrap())
        }

        async fn save(&self, record: &StoredCounter) -> Result<(), CounterStoreError> {
            *self.record.lock().unwrap() = Some(*record);
            Ok(())
        }
    }

    fn minsk() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    async fn sequencer(
        stored: Option<StoredCounter>,
        clock: Arc<ManualClock>,
    ) -> (OrderSequencer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore {
            record: StdMutex::new(stored),
        });
        let sequencer =
            OrderSequencer::load(store.clone(), clock, minsk(), Duration::from_secs(5)).await;
        (sequencer, store)
    }

    #[tokio::test]
    async fn test_first_number_of_empty_store() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 21, 9, 0, 0).unwrap(),
        ));
        let (sequencer, store) = sequencer(None, clock).await;

        // Initial record is written at load time.
        assert_eq!(
            *store.record.lock().unwrap(),
            Some(StoredCounter {
                counter: 0,
                month: 5,
                year: Some(2024)
            })
        );

        let assignment = sequencer.next_order_number().await;
        assert_eq!(assignment.number.to_string(), "#210524/001");
        assert_eq!(assignment.persistence, Persistence::Saved);
        assert!(!assignment.is_degraded());
    }

    #[tokio::test]
    async fn test_date_uses_store_offset() {
        // 22:30 UTC on the 31st is already the 1st of June in Minsk.
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 31, 22, 30, 0).unwrap(),
        ));
        let stored = StoredCounter {
            counter: 40,
            month: 5,
            year: Some(2024),
        };
        let (sequencer, _) = sequencer(Some(stored), clock).await;

        let assignment = sequencer.next_order_number().await;
        assert_eq!(assignment.number.to_string(), "#010624/001");
    }

    #[tokio::test]
    async fn test_legacy_record_same_month_continues() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 21, 9, 0, 0).unwrap(),
        ));
        let stored = StoredCounter {
            counter: 6,
            month: 5,
            year: None,
        };
        let (sequencer, store) = sequencer(Some(stored), clock).await;

        assert_eq!(
            sequencer.next_order_number().await.number.to_string(),
            "#210524/007"
        );
        assert_eq!(store.record.lock().unwrap().unwrap().year, Some(2024));
    }

    #[tokio::test]
    async fn test_rollover_while_running() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 30, 9, 0, 0).unwrap(),
        ));
        let (sequencer, _) = sequencer(None, clock.clone()).await;
        sequencer.next_order_number().await;
        sequencer.next_order_number().await;

        clock.advance_months(1);
        let assignment = sequencer.next_order_number().await;

        assert_eq!(assignment.number.to_string(), "#300424/001");
        let snapshot = sequencer.snapshot().await;
        assert_eq!(snapshot.count(), 1);
        assert_eq!(snapshot.period(), Period::new(2024, 4).unwrap());
    }

    #[tokio::test]
    async fn test_clock_stepping_back_does_not_reset_counter() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 4, 30, 21, 0, 5).unwrap(),
        ));
        let (sequencer, store) = sequencer(None, clock.clone()).await;
        assert_eq!(sequencer.next_order_number().await.number.sequence(), Some(1));

        clock.set(Utc.with_ymd_and_hms(2024, 4, 30, 20, 59, 58).unwrap());
        assert_eq!(sequencer.next_order_number().await.number.sequence(), Some(2));

        let snapshot = sequencer.snapshot().await;
        assert_eq!(snapshot.period(), Period::new(2024, 5).unwrap());
        assert_eq!(store.record.lock().unwrap().unwrap().month, 5);
    }

    #[tokio::test]
    async fn test_overflow_yields_fallback() {
        let now = Utc.with_ymd_and_hms(2024, 5, 21, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let stored = StoredCounter {
            counter: u32::MAX,
            month: 5,
            year: Some(2024),
        };
        let (sequencer, _) = sequencer(Some(stored), clock).await;

        let assignment = sequencer.next_order_number().await;
        assert_eq!(
            assignment.number.to_string(),
            format!("#ERROR_{}", now.timestamp())
        );
        assert_eq!(assignment.persistence, Persistence::NotAttempted);
        assert!(assignment.is_degraded());
    }

    #[tokio::test]
    async fn test_invalid_stored_month_reinitializes() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 21, 9, 0, 0).unwrap(),
        ));
        let stored = StoredCounter {
            counter: 9,
            month: 13,
            year: Some(2024),
        };
        let (sequencer, _) = sequencer(Some(stored), clock).await;

        assert_eq!(sequencer.snapshot().await.count(), 0);
        assert_eq!(sequencer.next_order_number().await.number.sequence(), Some(1));
    }
}
