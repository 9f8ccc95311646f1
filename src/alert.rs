//! Alert notifier — detection popup, cell highlight and alert sound.
//!
//! DESIGN
//! ======
//! Only one popup is ever shown. Each `notify` overwrites the popup,
//! aborts the pending expiry task and schedules a fresh one, so the
//! visible window always runs `popup` duration from the latest call.
//! A generation counter guards the expiry task against the race where it
//! wakes just as a newer `notify` replaces it.
//!
//! Pollers call `notify_guarded` with their cancellation token. The token
//! is checked under the same lock `dismiss` takes, so a detection racing a
//! session stop is either cleared by the dismiss or never shown.
//!
//! Audio needs a one-time unlock from a user gesture before the platform
//! allows playback. The unlock plays muted, then pauses and rewinds.
//!
//! ERROR HANDLING
//! ==============
//! Audio failures (blocked unlock, blocked playback) are logged at `debug`
//! and never prevent the popup from showing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::page::{AlertSound, Page, PopupContent, PopupState};
use crate::slots::{SlotRegistry, SourceRef};

/// Sound file played on every detection.
pub const ALERT_SOUND_PATH: &str = "/static/Alert/alert-33762.mp3";

/// The detection currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub slot_index: usize,
    pub displayed_until: Instant,
}

#[derive(Default)]
struct AlertState {
    current: Option<AlertEvent>,
    expiry: Option<JoinHandle<()>>,
    generation: u64,
}

fn lock(state: &Mutex<AlertState>) -> MutexGuard<'_, AlertState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct AlertNotifier {
    registry: Arc<SlotRegistry>,
    page: Page,
    sound: Arc<dyn AlertSound>,
    display_for: Duration,
    state: Arc<Mutex<AlertState>>,
    audio_unlocked: AtomicBool,
}

impl AlertNotifier {
    #[must_use]
    pub fn new(registry: Arc<SlotRegistry>, page: Page, sound: Arc<dyn AlertSound>, display_for: Duration) -> Self {
        Self {
            registry,
            page,
            sound,
            display_for,
            state: Arc::new(Mutex::new(AlertState::default())),
            audio_unlocked: AtomicBool::new(false),
        }
    }

    /// Show the detection popup for `slot_index`, highlight its cell and
    /// play the alert sound. Replaces any popup already showing.
    pub fn notify(&self, slot_index: usize) {
        self.show(slot_index, None);
    }

    /// Same as [`AlertNotifier::notify`] unless `cancel` has fired. The
    /// check runs under the alert lock, so once the poller is stopped and
    /// [`AlertNotifier::dismiss`] has returned, no popup or sound follows.
    /// Returns whether the alert was shown.
    pub fn notify_guarded(&self, cancel: &CancellationToken, slot_index: usize) -> bool {
        self.show(slot_index, Some(cancel))
    }

    fn show(&self, slot_index: usize, cancel: Option<&CancellationToken>) -> bool {
        let content = PopupContent {
            camera_name: self.registry.name_for(slot_index),
            stream_link: self
                .registry
                .source_for(slot_index)
                .and_then(SourceRef::stream_link)
                .map(str::to_string),
        };

        let mut state = lock(&self.state);
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            debug!(slot = slot_index, "detection dropped: polling stopped");
            return false;
        }
        info!(slot = slot_index, camera = %content.camera_name, "detection alert");
        if let Some(pending) = state.expiry.take() {
            pending.abort();
        }
        state.generation += 1;
        state.current = Some(AlertEvent { slot_index, displayed_until: Instant::now() + self.display_for });
        self.page.set_popup(PopupState::shown(content));
        self.page.set_highlight(slot_index, true);
        state.expiry = Some(self.spawn_expiry(state.generation));
        self.play_sound();
        true
    }

    fn spawn_expiry(&self, generation: u64) -> JoinHandle<()> {
        let shared = Arc::clone(&self.state);
        let page = self.page.clone();
        let display_for = self.display_for;
        tokio::spawn(async move {
            tokio::time::sleep(display_for).await;
            let mut state = lock(&shared);
            if state.generation != generation {
                return;
            }
            state.current = None;
            state.expiry = None;
            page.set_popup(PopupState::hidden());
            page.clear_highlights();
        })
    }

    /// Hide the popup and clear highlights now, cancelling any expiry.
    pub fn dismiss(&self) {
        let mut state = lock(&self.state);
        if let Some(pending) = state.expiry.take() {
            pending.abort();
        }
        state.generation += 1;
        state.current = None;
        self.page.set_popup(PopupState::hidden());
        self.page.clear_highlights();
    }

    /// The alert currently displayed, if any.
    #[must_use]
    pub fn current(&self) -> Option<AlertEvent> {
        lock(&self.state).current.clone()
    }

    /// Attempt the one-time audio unlock. Call from a user gesture.
    /// Returns whether audio is unlocked afterwards.
    pub fn unlock_audio(&self) -> bool {
        if self.audio_unlocked.load(Ordering::Acquire) {
            return true;
        }
        self.sound.set_volume(0.0);
        let unlocked = match self.sound.play() {
            Ok(()) => {
                self.sound.pause();
                self.sound.rewind();
                true
            }
            Err(e) => {
                debug!(error = %e, "alert audio unlock blocked");
                false
            }
        };
        self.sound.set_volume(1.0);
        self.audio_unlocked.store(unlocked, Ordering::Release);
        unlocked
    }

    #[must_use]
    pub fn audio_unlocked(&self) -> bool {
        self.audio_unlocked.load(Ordering::Acquire)
    }

    fn play_sound(&self) {
        self.sound.set_source(ALERT_SOUND_PATH);
        self.sound.rewind();
        if let Err(e) = self.sound.play() {
            debug!(error = %e, "alert sound playback blocked");
        }
    }
}

impl Drop for AlertNotifier {
    fn drop(&mut self) {
        if let Some(pending) = lock(&self.state).expiry.take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
#[path = "alert_test.rs"]
mod tests;
