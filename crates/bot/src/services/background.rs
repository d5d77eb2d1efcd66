//! Supervised background work.
//!
//! Email deliveries run detached from the checkout that scheduled them. Each
//! one is tracked so shutdown can wait for it, and its error or panic is
//! caught, logged and counted instead of disappearing with the task.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

#[derive(Debug, Default)]
struct Counters {
    spawned: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Outcome counts of supervised tasks since start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskStats {
    pub spawned: u64,
    pub succeeded: u64,
    /// Tasks that returned an error or panicked.
    pub failed: u64,
}

impl TaskStats {
    /// Tasks still running.
    #[must_use]
    pub const fn in_flight(&self) -> u64 {
        self.spawned
            .saturating_sub(self.succeeded)
            .saturating_sub(self.failed)
    }
}

/// Group of detached tasks with per-task error capture.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    counters: Arc<Counters>,
}

impl BackgroundTasks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `future` in the background under the caller's span.
    ///
    /// An `Err` or a panic is logged with `task` and counted as failed.
    pub fn spawn<F, E>(&self, task: &'static str, future: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        self.counters.spawned.fetch_add(1, Ordering::Relaxed);
        let counters = Arc::clone(&self.counters);

        let supervised = async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(())) => {
                    counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(task, "Background task finished");
                }
                Ok(Err(e)) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(task, error = %e, "Background task failed");
                }
                Err(panic) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(task, panic = %panic_message(panic.as_ref()), "Background task panicked");
                }
            }
        };

        self.tracker.spawn(supervised.in_current_span());
    }

    /// Snapshot of the outcome counters.
    #[must_use]
    pub fn stats(&self) -> TaskStats {
        TaskStats {
            spawned: self.counters.spawned.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Wait until every task spawned so far has finished.
    ///
    /// The group stays usable afterwards.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Close the group and wait up to `grace` for running tasks.
    ///
    /// Returns `false` if tasks were still running at the deadline.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let finished = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();

        let stats = self.stats();
        if finished {
            tracing::info!(
                succeeded = stats.succeeded,
                failed = stats.failed,
                "Background tasks drained"
            );
        } else {
            tracing::warn!(
                in_flight = stats.in_flight(),
                grace_secs = grace.as_secs(),
                "Background tasks still running at shutdown"
            );
        }
        finished
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
