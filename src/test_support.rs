//! Scripted collaborators shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::{
    Backend, BackendError, HighlightResponse, ProgressFn, ProgressResponse, UploadPayload, UploadResponse,
};
use crate::config::Timings;
use crate::page::{AlertSound, AudioError, PageHost};
use crate::session::SessionController;
use crate::slots::{SlotRegistry, SourceRef};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Error value for scripted transport failures.
pub(crate) fn unavailable() -> BackendError {
    BackendError::Status { status: 503 }
}

// =============================================================================
// FakeBackend
// =============================================================================

/// Backend replaying queued replies. Empty queues answer with an empty
/// highlight set and 0% progress.
#[derive(Default)]
pub(crate) struct FakeBackend {
    upload_reply: Mutex<Option<Result<UploadResponse, BackendError>>>,
    upload_progress: Mutex<Vec<u8>>,
    progress_replies: Mutex<VecDeque<Result<ProgressResponse, BackendError>>>,
    highlight_replies: Mutex<VecDeque<Result<HighlightResponse, BackendError>>>,
    pub(crate) uploads: AtomicUsize,
    pub(crate) progress_calls: AtomicUsize,
    pub(crate) highlight_calls: AtomicUsize,
    pub(crate) beacons: AtomicUsize,
    stops: Mutex<Vec<Option<SourceRef>>>,
    polled_jobs: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn reply_upload(&self, reply: Result<UploadResponse, BackendError>) {
        *lock(&self.upload_reply) = Some(reply);
    }

    pub(crate) fn reply_job(&self, job_id: &str) {
        self.reply_upload(Ok(UploadResponse { job_id: Some(job_id.to_string()) }));
    }

    /// Transmission percentages reported during the next upload.
    pub(crate) fn report_upload_progress(&self, steps: &[u8]) {
        *lock(&self.upload_progress) = steps.to_vec();
    }

    pub(crate) fn push_progress(&self, percent: f64) {
        lock(&self.progress_replies).push_back(Ok(ProgressResponse::with_percent(percent)));
    }

    pub(crate) fn push_progress_error(&self) {
        lock(&self.progress_replies).push_back(Err(unavailable()));
    }

    pub(crate) fn push_highlight(&self, reply: HighlightResponse) {
        lock(&self.highlight_replies).push_back(Ok(reply));
    }

    pub(crate) fn push_highlight_error(&self) {
        lock(&self.highlight_replies).push_back(Err(unavailable()));
    }

    pub(crate) fn stops(&self) -> Vec<Option<SourceRef>> {
        lock(&self.stops).clone()
    }

    pub(crate) fn polled_jobs(&self) -> Vec<String> {
        lock(&self.polled_jobs).clone()
    }

    pub(crate) fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Backend for FakeBackend {
    async fn upload(&self, _payload: UploadPayload, on_progress: ProgressFn) -> Result<UploadResponse, BackendError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let steps = lock(&self.upload_progress).clone();
        for percent in steps {
            on_progress(percent);
        }
        lock(&self.upload_reply)
            .take()
            .unwrap_or_else(|| Ok(UploadResponse::default()))
    }

    async fn video_progress(&self, job_id: &str) -> Result<ProgressResponse, BackendError> {
        self.progress_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.polled_jobs).push(job_id.to_string());
        lock(&self.progress_replies)
            .pop_front()
            .unwrap_or_else(|| Ok(ProgressResponse::default()))
    }

    async fn trigger_highlight(&self) -> Result<HighlightResponse, BackendError> {
        self.highlight_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.highlight_replies)
            .pop_front()
            .unwrap_or_else(|| Ok(HighlightResponse::default()))
    }

    fn stop_video(&self, source: Option<&SourceRef>) {
        lock(&self.stops).push(source.cloned());
    }

    fn stop_beacon(&self) {
        self.beacons.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// RecordingHost
// =============================================================================

#[derive(Default)]
pub(crate) struct RecordingHost {
    alerts: Mutex<Vec<String>>,
    pub(crate) reloads: AtomicUsize,
}

impl RecordingHost {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn alerts(&self) -> Vec<String> {
        lock(&self.alerts).clone()
    }

    pub(crate) fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl PageHost for RecordingHost {
    fn alert(&self, message: &str) {
        lock(&self.alerts).push(message.to_string());
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// FakeSound
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SoundCall {
    Source(String),
    Volume(f32),
    Play { volume: f32 },
    Pause,
    Rewind,
}

/// Media element double. While `blocked` is set every `play` fails.
pub(crate) struct FakeSound {
    calls: Mutex<Vec<SoundCall>>,
    volume: Mutex<f32>,
    pub(crate) blocked: AtomicBool,
}

impl FakeSound {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self { calls: Mutex::new(Vec::new()), volume: Mutex::new(1.0), blocked: AtomicBool::new(false) })
    }

    pub(crate) fn blocked() -> Arc<Self> {
        let sound = Self::new();
        sound.blocked.store(true, Ordering::SeqCst);
        sound
    }

    pub(crate) fn calls(&self) -> Vec<SoundCall> {
        lock(&self.calls).clone()
    }

    /// Volumes of every play attempt, in order.
    pub(crate) fn plays(&self) -> Vec<f32> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SoundCall::Play { volume } => Some(volume),
                _ => None,
            })
            .collect()
    }
}

impl AlertSound for FakeSound {
    fn set_source(&self, src: &str) {
        lock(&self.calls).push(SoundCall::Source(src.to_string()));
    }

    fn set_volume(&self, volume: f32) {
        *lock(&self.volume) = volume;
        lock(&self.calls).push(SoundCall::Volume(volume));
    }

    fn play(&self) -> Result<(), AudioError> {
        let volume = *lock(&self.volume);
        lock(&self.calls).push(SoundCall::Play { volume });
        if self.blocked.load(Ordering::SeqCst) {
            Err(AudioError::Blocked)
        } else {
            Ok(())
        }
    }

    fn pause(&self) {
        lock(&self.calls).push(SoundCall::Pause);
    }

    fn rewind(&self) {
        lock(&self.calls).push(SoundCall::Rewind);
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A fully wired controller over fakes.
pub(crate) struct Harness {
    pub(crate) backend: Arc<FakeBackend>,
    pub(crate) host: Arc<RecordingHost>,
    pub(crate) sound: Arc<FakeSound>,
    pub(crate) session: SessionController,
}

impl Harness {
    pub(crate) fn new(registry: SlotRegistry) -> Self {
        Self::with_sound(registry, FakeSound::new())
    }

    pub(crate) fn with_sound(registry: SlotRegistry, sound: Arc<FakeSound>) -> Self {
        let backend = FakeBackend::new();
        let host = RecordingHost::new();
        let session = SessionController::build(
            Arc::new(registry),
            Arc::clone(&backend) as Arc<dyn Backend>,
            Arc::clone(&host) as Arc<dyn PageHost>,
            Arc::clone(&sound) as Arc<dyn AlertSound>,
            Timings::default(),
        );
        Self { backend, host, sound, session }
    }
}

/// Let spawned tasks run without advancing the clock.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
