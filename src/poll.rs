//! Single-handle recurring task slot.
//!
//! DESIGN
//! ======
//! Each poller kind owns one `PollSlot`. A slot holds at most one running
//! task plus the `CancellationToken` the task observes. `start` is a no-op
//! while a task is running; `stop` cancels the token and aborts the task
//! before returning, so nothing the task does after its next suspension
//! point can be observed. Writes between suspension points must check the
//! token (see `Page::write_guarded`).

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub(crate) struct PollSlot {
    active: Mutex<Option<PollTask>>,
}

impl PollSlot {
    pub(crate) const fn new() -> Self {
        Self { active: Mutex::new(None) }
    }

    fn lock(&self) -> MutexGuard<'_, Option<PollTask>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the task built by `make` unless one is already running.
    /// Returns whether a new task was started.
    pub(crate) fn start<F, Fut>(&self, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut active = self.lock();
        if active.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            return false;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(make(cancel.clone()));
        *active = Some(PollTask { cancel, handle });
        true
    }

    /// Cancel and abort the running task. Returns whether one was running.
    pub(crate) fn stop(&self) -> bool {
        match self.lock().take() {
            Some(task) => {
                let was_running = !task.handle.is_finished();
                task.cancel.cancel();
                task.handle.abort();
                was_running
            }
            None => false,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lock().as_ref().is_some_and(|task| !task.handle.is_finished())
    }
}

impl Drop for PollSlot {
    fn drop(&mut self) {
        if let Some(task) = self.lock().take() {
            task.cancel.cancel();
            task.handle.abort();
        }
    }
}

/// Shortest period a poll loop will tick at.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Ticker whose first tick lands one full `period` from now. Missed ticks
/// are delayed, never bunched. A zero period is raised to `MIN_PERIOD`.
pub(crate) fn ticker(period: Duration) -> Interval {
    let period = period.max(MIN_PERIOD);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[cfg(test)]
#[path = "poll_test.rs"]
mod tests;
