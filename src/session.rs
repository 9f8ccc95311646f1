//! Session controller — the Idle/Live state machine and page lifecycle hooks.
//!
//! DESIGN
//! ======
//! The controller is the composition root. It takes the feed dispatcher,
//! both pollers and the alert notifier as constructor parameters, so each
//! collaborator can be exercised alone against fakes.
//!
//! ```text
//!            enter_live                 exit_live / force_stop
//!   Idle ─────────────────▶ Live ─────────────────────────────▶ Idle
//! ```
//!
//! Teardown (`force_stop`) is synchronous: stop notifications are
//! fire-and-forget and the highlight task is cancelled before returning,
//! so it is safe from a page-hide handler that will never be resumed.
//!
//! Uploads are independent of the session state; the upload poller runs
//! the same way in Idle and Live.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::alert::AlertNotifier;
use crate::backend::{Backend, UploadPayload};
use crate::config::Timings;
use crate::dispatcher::FeedDispatcher;
use crate::highlight::HighlightPoller;
use crate::page::{AlertSound, Page, PageHost};
use crate::slots::SlotRegistry;
use crate::upload::{UploadJob, UploadPoller};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Live,
}

pub struct SessionController {
    state: Mutex<SessionState>,
    page: Page,
    backend: Arc<dyn Backend>,
    feeds: FeedDispatcher,
    highlights: HighlightPoller,
    alerts: Arc<AlertNotifier>,
    uploads: UploadPoller,
}

impl SessionController {
    /// Wire a controller from its collaborators and render the page-load
    /// state.
    #[must_use]
    pub fn new(
        page: Page,
        backend: Arc<dyn Backend>,
        feeds: FeedDispatcher,
        highlights: HighlightPoller,
        alerts: Arc<AlertNotifier>,
        uploads: UploadPoller,
    ) -> Self {
        page.reset();
        Self { state: Mutex::new(SessionState::Idle), page, backend, feeds, highlights, alerts, uploads }
    }

    /// Build every collaborator over one shared page sized to `registry`.
    #[must_use]
    pub fn build(
        registry: Arc<SlotRegistry>,
        backend: Arc<dyn Backend>,
        host: Arc<dyn PageHost>,
        sound: Arc<dyn AlertSound>,
        timings: Timings,
    ) -> Self {
        let page = Page::new(registry.len());
        let alerts = Arc::new(AlertNotifier::new(Arc::clone(&registry), page.clone(), sound, timings.popup));
        let feeds = FeedDispatcher::new(Arc::clone(&registry), page.clone(), Arc::clone(&backend));
        let highlights = HighlightPoller::new(
            Arc::clone(&backend),
            Arc::clone(&alerts),
            page.clone(),
            timings.highlight_poll,
        );
        let uploads = UploadPoller::new(Arc::clone(&backend), page.clone(), host, timings);
        Self::new(page, backend, feeds, highlights, alerts, uploads)
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    /// Shared page handle, for observers that render it.
    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }

    #[must_use]
    pub fn alerts(&self) -> &AlertNotifier {
        &self.alerts
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Start button: unlock audio, show the grid, bind feeds and start
    /// detection polling. No-op while already Live.
    pub fn enter_live(&self) {
        // The Start click is the user gesture the audio unlock needs.
        let audio = self.alerts.unlock_audio();

        let mut state = self.lock_state();
        if *state == SessionState::Live {
            debug!("enter_live ignored: already live");
            return;
        }
        *state = SessionState::Live;
        self.page.show_view(SessionState::Live);
        let feeds = self.feeds.start_all();
        self.highlights.start();
        info!(feeds, audio_unlocked = audio, "session live");
    }

    /// Stop button: tear the session down. No-op while Idle.
    pub fn exit_live(&self) {
        if self.state() == SessionState::Idle {
            debug!("exit_live ignored: already idle");
            return;
        }
        self.force_stop();
    }

    /// Unconditional teardown from any state: stop every feed, cancel
    /// detection polling, dismiss the popup and show the idle view.
    /// Never waits on the backend.
    pub fn force_stop(&self) {
        let mut state = self.lock_state();
        let was = *state;
        *state = SessionState::Idle;
        self.highlights.stop();
        self.alerts.dismiss();
        let notified = self.feeds.stop_all();
        self.page.show_view(SessionState::Idle);
        info!(from = ?was, notified, "session stopped");
    }

    // =========================================================================
    // LIFECYCLE HOOKS
    // =========================================================================

    /// Stop control in the page header.
    pub fn stop_from_header(&self) {
        self.exit_live();
    }

    /// In-app navigation away from the grid.
    pub fn on_navigate(&self) {
        self.force_stop();
    }

    /// Page hidden or unloading: tear down and tell the backend to stop
    /// everything without waiting for a reply.
    pub fn on_page_hide(&self) {
        self.force_stop();
        self.backend.stop_beacon();
    }

    /// Page restored from the back/forward cache.
    pub fn on_page_restore(&self) {
        self.uploads.on_page_restore();
    }

    /// Submit a video for processing. Returns `false` if an upload is
    /// already in flight.
    pub fn begin_upload(&self, payload: UploadPayload) -> bool {
        self.uploads.begin_upload(payload)
    }

    #[must_use]
    pub fn current_upload(&self) -> Option<UploadJob> {
        self.uploads.current_job()
    }

    #[must_use]
    pub fn upload_running(&self) -> bool {
        self.uploads.is_running()
    }

    #[must_use]
    pub fn highlights_running(&self) -> bool {
        self.highlights.is_running()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
