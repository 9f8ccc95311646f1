//! Upload progress poller — submits a video and follows its processing job.
//!
//! DESIGN
//! ======
//! One upload runs at a time, as a single task in a `PollSlot`:
//! 1. Submit the form, mirroring bytes-sent progress on the bar.
//! 2. Read the job id from the reply.
//! 3. Poll `/api/video_progress` every interval, displaying the latest
//!    reported percentage (values are not forced to be monotonic).
//! 4. At 100%, stop polling, wait the completion grace period, reset the
//!    indicator and reload the page.
//!
//! Polls are serialized: the next tick is not awaited until the previous
//! fetch has returned. Every page write checks the task's cancellation
//! token under the page lock, so nothing lands after `on_page_restore`.
//!
//! ERROR HANDLING
//! ==============
//! Any submission failure or polling failure ends the job: the indicator
//! is reset, the submit control re-enabled and a message shown. Nothing is
//! retried; the user resubmits.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendError, ProgressFn, UploadPayload};
use crate::config::Timings;
use crate::page::{Page, PageHost, ProgressState};
use crate::poll::{self, PollSlot};

pub const UPLOAD_STARTED_TEXT: &str = "0% video processed";
pub const PROCESSING_TEXT: &str = "Video under processing...";
pub const SUBMISSION_FAILED_MESSAGE: &str = "Upload failed. Please try again.";
pub const PROCESSING_FAILED_MESSAGE: &str = "Processing failed. Please try again.";

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload submission failed: {0}")]
    Submission(#[source] BackendError),
    #[error("upload reply carried no job id")]
    MissingJobId,
    #[error("progress polling failed for job {job_id}: {source}")]
    Progress {
        job_id: String,
        #[source]
        source: BackendError,
    },
    #[error("upload cancelled")]
    Cancelled,
}

impl UploadError {
    /// Message shown to the user, if this failure is user-visible.
    #[must_use]
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::Submission(_) | Self::MissingJobId => Some(SUBMISSION_FAILED_MESSAGE),
            Self::Progress { .. } => Some(PROCESSING_FAILED_MESSAGE),
            Self::Cancelled => None,
        }
    }
}

// =============================================================================
// JOB
// =============================================================================

/// A server-side processing job being followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub job_id: String,
    pub last_percent: u8,
}

#[derive(Clone)]
struct UploadContext {
    backend: Arc<dyn Backend>,
    page: Page,
    host: Arc<dyn PageHost>,
    timings: Timings,
    job: Arc<Mutex<Option<UploadJob>>>,
}

impl UploadContext {
    fn job(&self) -> MutexGuard<'_, Option<UploadJob>> {
        self.job.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// POLLER
// =============================================================================

pub struct UploadPoller {
    ctx: UploadContext,
    poll: PollSlot,
}

impl UploadPoller {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, page: Page, host: Arc<dyn PageHost>, timings: Timings) -> Self {
        Self {
            ctx: UploadContext { backend, page, host, timings, job: Arc::new(Mutex::new(None)) },
            poll: PollSlot::new(),
        }
    }

    /// Start submitting `payload`. The submit control is disabled before
    /// this returns. Returns `false` if an upload is already in flight.
    pub fn begin_upload(&self, payload: UploadPayload) -> bool {
        if self.poll.is_running() {
            debug!("upload already in flight");
            return false;
        }
        self.ctx.page.set_progress(ProgressState::active(0, UPLOAD_STARTED_TEXT));
        info!(file = %payload.file_name, bytes = payload.bytes.len(), "upload submitted");

        let ctx = self.ctx.clone();
        self.poll.start(move |cancel| async move {
            match run_upload(&ctx, payload, &cancel).await {
                Ok(job) => info!(job_id = %job.job_id, "upload job finished"),
                Err(UploadError::Cancelled) => debug!("upload task cancelled"),
                Err(e) => fail_upload(&ctx, &cancel, &e),
            }
        })
    }

    /// Page restored from cache: the task may not have survived, so reset
    /// the indicator and re-enable submission unconditionally.
    pub fn on_page_restore(&self) {
        if self.poll.stop() {
            info!("upload task dropped on page restore");
        }
        *self.ctx.job() = None;
        self.ctx.page.set_progress(ProgressState::idle());
    }

    /// Job currently being followed, if any.
    #[must_use]
    pub fn current_job(&self) -> Option<UploadJob> {
        self.ctx.job().clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.poll.is_running()
    }
}

fn fail_upload(ctx: &UploadContext, cancel: &CancellationToken, error: &UploadError) {
    warn!(error = %error, "upload failed");
    *ctx.job() = None;
    let reset = ctx.page.write_guarded(cancel, |model| model.progress = ProgressState::idle());
    if reset {
        if let Some(message) = error.user_message() {
            ctx.host.alert(message);
        }
    }
}

async fn run_upload(
    ctx: &UploadContext,
    payload: UploadPayload,
    cancel: &CancellationToken,
) -> Result<UploadJob, UploadError> {
    let page = ctx.page.clone();
    let progress_cancel = cancel.clone();
    let on_progress: ProgressFn = Arc::new(move |percent| {
        page.write_guarded(&progress_cancel, |model| {
            model.progress = ProgressState::active(percent, PROCESSING_TEXT);
        });
    });

    let reply = tokio::select! {
        () = cancel.cancelled() => return Err(UploadError::Cancelled),
        reply = ctx.backend.upload(payload, on_progress) => reply.map_err(UploadError::Submission)?,
    };
    let job_id = reply.job_id().ok_or(UploadError::MissingJobId)?.to_string();
    info!(job_id = %job_id, "upload accepted; following processing");

    ctx.page.write_guarded(cancel, |model| {
        model.progress = ProgressState::active(model.progress.bar_percent, UPLOAD_STARTED_TEXT);
    });
    *ctx.job() = Some(UploadJob { job_id: job_id.clone(), last_percent: 0 });

    let period = ctx.timings.progress_poll;
    let mut ticker = poll::ticker(period);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return Err(UploadError::Cancelled),
            _ = ticker.tick() => {}
        }

        let reply = tokio::select! {
            () = cancel.cancelled() => return Err(UploadError::Cancelled),
            reply = ctx.backend.video_progress(&job_id) => reply,
        };
        let percent = match reply {
            Ok(progress) => progress.percent(),
            Err(source) => return Err(UploadError::Progress { job_id, source }),
        };

        debug!(job_id = %job_id, percent, "processing progress");
        ctx.page.write_guarded(cancel, |model| {
            model.progress = ProgressState::active(percent, PROCESSING_TEXT);
        });
        if let Some(job) = ctx.job().as_mut() {
            job.last_percent = percent;
        }
        if percent >= 100 {
            break;
        }
    }

    info!(job_id = %job_id, grace = ?ctx.timings.completion_grace, "processing complete; reloading after grace");
    tokio::select! {
        () = cancel.cancelled() => return Err(UploadError::Cancelled),
        () = tokio::time::sleep(ctx.timings.completion_grace) => {}
    }

    let job = ctx.job().take().unwrap_or(UploadJob { job_id, last_percent: 100 });
    if ctx.page.write_guarded(cancel, |model| model.progress = ProgressState::idle()) {
        ctx.host.reload();
    }
    Ok(job)
}

#[cfg(test)]
#[path = "upload_test.rs"]
mod tests;
