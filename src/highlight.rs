//! Highlight poller — asks the backend which slots have a detection.
//!
//! DESIGN
//! ======
//! A recurring task fetches `/api/trigger_highlight` every interval and
//! hands each reported slot to the alert notifier. The first fetch happens
//! one full interval after `start`.
//!
//! ERROR HANDLING
//! ==============
//! Detection polling is a continuous best-effort signal: a failed tick is
//! logged at `warn` and the loop carries on with the next tick. This is the
//! opposite of upload polling, which gives up on the first failure.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alert::AlertNotifier;
use crate::backend::Backend;
use crate::page::Page;
use crate::poll::{self, PollSlot};

pub struct HighlightPoller {
    backend: Arc<dyn Backend>,
    notifier: Arc<AlertNotifier>,
    page: Page,
    interval: Duration,
    poll: PollSlot,
}

impl HighlightPoller {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, notifier: Arc<AlertNotifier>, page: Page, interval: Duration) -> Self {
        Self { backend, notifier, page, interval, poll: PollSlot::new() }
    }

    /// Begin polling. No-op while already polling; returns whether a new
    /// loop was started.
    pub fn start(&self) -> bool {
        let backend = Arc::clone(&self.backend);
        let notifier = Arc::clone(&self.notifier);
        let interval = self.interval;
        let started = self
            .poll
            .start(move |cancel| run_highlight_loop(backend, notifier, interval, cancel));
        if started {
            info!(interval = ?interval, "highlight polling started");
        } else {
            debug!("highlight polling already running");
        }
        started
    }

    /// Cancel polling and clear every cell highlight. Safe to call when
    /// not running.
    pub fn stop(&self) {
        if self.poll.stop() {
            info!("highlight polling stopped");
        }
        self.page.clear_highlights();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.poll.is_running()
    }
}

async fn run_highlight_loop(
    backend: Arc<dyn Backend>,
    notifier: Arc<AlertNotifier>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = poll::ticker(period);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let reply = tokio::select! {
            () = cancel.cancelled() => break,
            reply = backend.trigger_highlight() => reply,
        };

        match reply {
            Ok(response) => {
                for slot in response.indices() {
                    if !notifier.notify_guarded(&cancel, slot) {
                        return;
                    }
                }
            }
            Err(e) => warn!(error = %e, "highlight poll failed; retrying next tick"),
        }
    }
}

#[cfg(test)]
#[path = "highlight_test.rs"]
mod tests;
