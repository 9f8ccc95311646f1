//! Client-observable page state and the host seams the controller drives.
//!
//! DESIGN
//! ======
//! `PageModel` is a plain snapshot of everything a user can see: the two
//! mutually exclusive views, the Start/Stop buttons, one cell per grid slot,
//! the upload progress indicator and the detection popup. `Page` is the
//! shared handle components write through. Every write replaces whole
//! fields under a single lock, so concurrent writers resolve as
//! "last write wins" with no merged partial states.
//!
//! Effects that are not state (reloading the page, blocking alerts, audio)
//! go through the `PageHost` and `AlertSound` traits so tests can record
//! them and the binary can map them onto a terminal.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::session::SessionState;

// =============================================================================
// CELL STATE
// =============================================================================

/// Display surface of one grid cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceState {
    /// Bound stream address, `None` when cleared.
    pub src: Option<String>,
    pub visible: bool,
    pub placeholder_visible: bool,
}

impl SurfaceState {
    /// Surface showing a live stream with its placeholder hidden.
    #[must_use]
    pub fn streaming(src: String) -> Self {
        Self { src: Some(src), visible: true, placeholder_visible: false }
    }

    /// Surface with no stream binding and the placeholder shown.
    #[must_use]
    pub fn cleared() -> Self {
        Self { src: None, visible: false, placeholder_visible: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellState {
    pub surface: SurfaceState,
    pub highlighted: bool,
}

impl CellState {
    fn initial() -> Self {
        Self { surface: SurfaceState::cleared(), highlighted: false }
    }
}

// =============================================================================
// PROGRESS + POPUP
// =============================================================================

/// Upload progress bar, its caption and the submit control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    pub bar_visible: bool,
    pub bar_percent: u8,
    pub text: Option<String>,
    pub submit_enabled: bool,
}

impl ProgressState {
    /// Hidden indicator with the submit control enabled.
    #[must_use]
    pub fn idle() -> Self {
        Self { bar_visible: false, bar_percent: 0, text: None, submit_enabled: true }
    }

    /// Visible indicator with the submit control disabled.
    #[must_use]
    pub fn active(percent: u8, text: &str) -> Self {
        Self { bar_visible: true, bar_percent: percent.min(100), text: Some(text.to_string()), submit_enabled: false }
    }
}

/// Body of the detection popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupContent {
    pub camera_name: String,
    /// Remote stream address offered as a "View Stream" link.
    pub stream_link: Option<String>,
}

impl PopupContent {
    /// Markup for the popup element. Name and link are escaped.
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut html = format!("Detection on <b>{}</b>", escape_html(&self.camera_name));
        if let Some(link) = &self.stream_link {
            html.push_str(&format!("<br><a href='{}' target='_blank'>View Stream</a>", escape_html(link)));
        }
        html
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupState {
    pub visible: bool,
    pub content: Option<PopupContent>,
}

impl PopupState {
    #[must_use]
    pub fn hidden() -> Self {
        Self { visible: false, content: None }
    }

    #[must_use]
    pub fn shown(content: PopupContent) -> Self {
        Self { visible: true, content: Some(content) }
    }
}

// =============================================================================
// PAGE MODEL
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageModel {
    pub idle_view_visible: bool,
    pub live_view_visible: bool,
    pub start_button_visible: bool,
    pub stop_button_visible: bool,
    pub cells: Vec<CellState>,
    pub progress: ProgressState,
    pub popup: PopupState,
}

impl PageModel {
    /// Page-load state: idle view, every feed cleared, nothing in progress.
    #[must_use]
    pub fn initial(slot_count: usize) -> Self {
        Self {
            idle_view_visible: true,
            live_view_visible: false,
            start_button_visible: true,
            stop_button_visible: false,
            cells: vec![CellState::initial(); slot_count],
            progress: ProgressState::idle(),
            popup: PopupState::hidden(),
        }
    }

    /// Cell at a 1-based slot index.
    #[must_use]
    pub fn cell(&self, index: usize) -> Option<&CellState> {
        index.checked_sub(1).and_then(|i| self.cells.get(i))
    }

    fn cell_mut(&mut self, index: usize) -> Option<&mut CellState> {
        index.checked_sub(1).and_then(|i| self.cells.get_mut(i))
    }

    /// Indices of highlighted cells, ascending.
    #[must_use]
    pub fn highlighted(&self) -> Vec<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.highlighted)
            .map(|(i, _)| i + 1)
            .collect()
    }

    fn show_view(&mut self, state: SessionState) {
        let live = state == SessionState::Live;
        self.idle_view_visible = !live;
        self.live_view_visible = live;
        self.start_button_visible = !live;
        self.stop_button_visible = live;
    }
}

// =============================================================================
// SHARED HANDLE
// =============================================================================

/// Shared, cloneable handle to the page model.
#[derive(Debug, Clone)]
pub struct Page {
    inner: Arc<Mutex<PageModel>>,
}

impl Page {
    #[must_use]
    pub fn new(slot_count: usize) -> Self {
        Self { inner: Arc::new(Mutex::new(PageModel::initial(slot_count))) }
    }

    fn lock(&self) -> MutexGuard<'_, PageModel> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current page state.
    #[must_use]
    pub fn snapshot(&self) -> PageModel {
        self.lock().clone()
    }

    /// Restore the page-load state while keeping the grid size.
    pub fn reset(&self) {
        let mut model = self.lock();
        let slot_count = model.cells.len();
        *model = PageModel::initial(slot_count);
    }

    /// Show exactly one of the idle/live views and the matching button.
    pub fn show_view(&self, state: SessionState) {
        self.lock().show_view(state);
    }

    /// Overwrite a cell's display surface. Out-of-range indices are ignored.
    pub fn set_surface(&self, index: usize, surface: SurfaceState) {
        if let Some(cell) = self.lock().cell_mut(index) {
            cell.surface = surface;
        }
    }

    pub fn set_highlight(&self, index: usize, highlighted: bool) {
        if let Some(cell) = self.lock().cell_mut(index) {
            cell.highlighted = highlighted;
        }
    }

    pub fn clear_highlights(&self) {
        for cell in &mut self.lock().cells {
            cell.highlighted = false;
        }
    }

    pub fn set_progress(&self, progress: ProgressState) {
        self.lock().progress = progress;
    }

    pub fn set_popup(&self, popup: PopupState) {
        self.lock().popup = popup;
    }

    /// Apply `write` unless `cancel` has fired. The check and the write
    /// happen under the same lock, so a write never lands after the
    /// canceller's own cleanup. Returns whether the write was applied.
    pub fn write_guarded(&self, cancel: &CancellationToken, write: impl FnOnce(&mut PageModel)) -> bool {
        let mut model = self.lock();
        if cancel.is_cancelled() {
            return false;
        }
        write(&mut model);
        true
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

// =============================================================================
// HOST SEAMS
// =============================================================================

/// Page-level effects outside the model.
pub trait PageHost: Send + Sync {
    /// Surface a user-visible failure message.
    fn alert(&self, message: &str);
    /// Reload the page to pick up newly processed content.
    fn reload(&self);
}

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("playback blocked until a user gesture")]
    Blocked,
    #[error("audio output unavailable: {0}")]
    Unavailable(String),
}

/// Media element used for the detection alert sound.
pub trait AlertSound: Send + Sync {
    fn set_source(&self, src: &str);
    fn set_volume(&self, volume: f32);
    /// Start playback from the current position.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::Blocked`] when the platform refuses playback.
    fn play(&self) -> Result<(), AudioError>;
    fn pause(&self);
    /// Seek back to the beginning.
    fn rewind(&self);
}

#[cfg(test)]
#[path = "page_test.rs"]
mod tests;
