//! Backend — the HTTP endpoints the controller consumes.
//!
//! DESIGN
//! ======
//! `Backend` is the seam between the controller and the monitoring server.
//! Components hold an `Arc<dyn Backend>` so tests can script replies.
//! `HttpBackend` is the production implementation over `reqwest`.
//!
//! Stop notifications are fire-and-forget: the trait methods are sync and
//! must return immediately. `HttpBackend` spawns the request onto the
//! current runtime and never reports the result back to the caller, so
//! local teardown cannot be delayed or blocked by the server.
//!
//! ERROR HANDLING
//! ==============
//! Request/response failures surface as `BackendError` from the async
//! methods; callers decide whether a failure is fatal. Failures of
//! fire-and-forget calls are logged at `debug` and dropped.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ControllerConfig, HttpTimeouts};
use crate::slots::SourceRef;

pub const VIDEO_PROGRESS_PATH: &str = "/api/video_progress";
pub const TRIGGER_HIGHLIGHT_PATH: &str = "/api/trigger_highlight";
pub const STOP_VIDEO_PATH: &str = "/stop_video";

/// Multipart field the server reads the video from.
pub const UPLOAD_FIELD: &str = "video";

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned status {status}")]
    Status { status: u16 },
    #[error("response decode failed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("payload read failed: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// Reply to an upload submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub job_id: Option<String>,
}

impl UploadResponse {
    /// Job identifier, ignoring blank values.
    #[must_use]
    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}

/// Reply from `/api/video_progress`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressResponse {
    #[serde(default)]
    pub percent: Option<f64>,
}

impl ProgressResponse {
    #[must_use]
    pub fn with_percent(percent: f64) -> Self {
        Self { percent: Some(percent) }
    }

    /// Reported percentage clamped to 0..=100. Missing or NaN reads as 0;
    /// fractions round down so only a true 100 completes a job.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percent(&self) -> u8 {
        match self.percent {
            Some(raw) if raw >= 100.0 => 100,
            Some(raw) if raw > 0.0 => raw.floor() as u8,
            _ => 0,
        }
    }
}

/// Reply from `/api/trigger_highlight`: a single slot or a list of slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cameras: Option<Vec<usize>>,
}

impl HighlightResponse {
    #[must_use]
    pub fn single(index: usize) -> Self {
        Self { camera: Some(index), cameras: None }
    }

    #[must_use]
    pub fn many(indices: Vec<usize>) -> Self {
        Self { camera: None, cameras: Some(indices) }
    }

    /// Normalized slot indices: `cameras` wins when present, otherwise
    /// `camera`. Zero is never a slot; duplicates keep first position.
    #[must_use]
    pub fn indices(&self) -> Vec<usize> {
        let raw = match (&self.cameras, self.camera) {
            (Some(list), _) => list.clone(),
            (None, Some(index)) => vec![index],
            (None, None) => Vec::new(),
        };
        let mut out: Vec<usize> = Vec::with_capacity(raw.len());
        for index in raw {
            if index != 0 && !out.contains(&index) {
                out.push(index);
            }
        }
        out
    }
}

// =============================================================================
// UPLOAD PAYLOAD
// =============================================================================

/// Percent-of-bytes-sent callback for upload transmission.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Contents of the upload form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPayload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Extra text fields submitted alongside the file.
    pub fields: Vec<(String, String)>,
}

impl UploadPayload {
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { file_name: file_name.into(), bytes, fields: Vec::new() }
    }

    /// Read a video file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] if the file cannot be read.
    pub async fn from_path(path: &Path) -> Result<Self, BackendError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "upload.mp4".to_string(), |name| name.to_string_lossy().into_owned());
        Ok(Self::new(file_name, bytes))
    }
}

/// Rounded percentage of `sent` over `total`. An empty body is complete.
#[must_use]
pub fn transfer_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = (sent.saturating_mul(100) + total / 2) / total;
    u8::try_from(percent.min(100)).unwrap_or(100)
}

// =============================================================================
// BACKEND TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Submit the upload form. `on_progress` receives 0..=100 as the body
    /// is transmitted.
    async fn upload(&self, payload: UploadPayload, on_progress: ProgressFn) -> Result<UploadResponse, BackendError>;

    async fn video_progress(&self, job_id: &str) -> Result<ProgressResponse, BackendError>;

    async fn trigger_highlight(&self) -> Result<HighlightResponse, BackendError>;

    /// Best-effort stop for one source, or for everything when `None`.
    /// Must not block.
    fn stop_video(&self, source: Option<&SourceRef>);

    /// Unload-time "stop everything" notification. Must not block.
    fn stop_beacon(&self);
}

// =============================================================================
// HTTP BACKEND
// =============================================================================

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    upload_path: String,
    request_timeout: Duration,
}

impl HttpBackend {
    /// # Errors
    ///
    /// Returns [`BackendError::Request`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, upload_path: &str, timeouts: HttpTimeouts) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            upload_path: upload_path.to_string(),
            request_timeout: Duration::from_secs(timeouts.request_secs),
        })
    }

    /// # Errors
    ///
    /// Returns [`BackendError::Request`] if the HTTP client cannot be built.
    pub fn from_config(config: &ControllerConfig) -> Result<Self, BackendError> {
        Self::new(&config.base_url, &config.upload_path, config.http)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read_json<T>(response: reqwest::Response) -> Result<T, BackendError>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status { status: status.as_u16() });
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn upload(&self, payload: UploadPayload, on_progress: ProgressFn) -> Result<UploadResponse, BackendError> {
        let total = payload.bytes.len() as u64;
        let chunks: Vec<Vec<u8>> = payload.bytes.chunks(UPLOAD_CHUNK_BYTES).map(<[u8]>::to_vec).collect();

        on_progress(0);
        let mut sent: u64 = 0;
        let body = futures_util::stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            on_progress(transfer_percent(sent, total));
            Ok::<Vec<u8>, std::io::Error>(chunk)
        });

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(body), total).file_name(payload.file_name);
        let mut form = Form::new().part(UPLOAD_FIELD, part);
        for (name, value) in payload.fields {
            form = form.text(name, value);
        }

        let response = self
            .client
            .post(self.url(&self.upload_path))
            .header("X-Requested-With", "XMLHttpRequest")
            .multipart(form)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn video_progress(&self, job_id: &str) -> Result<ProgressResponse, BackendError> {
        let response = self
            .client
            .get(self.url(VIDEO_PROGRESS_PATH))
            .query(&[("job_id", job_id)])
            .timeout(self.request_timeout)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn trigger_highlight(&self) -> Result<HighlightResponse, BackendError> {
        let response = self
            .client
            .get(self.url(TRIGGER_HIGHLIGHT_PATH))
            .timeout(self.request_timeout)
            .send()
            .await?;
        Self::read_json(response).await
    }

    fn stop_video(&self, source: Option<&SourceRef>) {
        let mut request = self.client.get(self.url(STOP_VIDEO_PATH)).timeout(self.request_timeout);
        match source {
            Some(SourceRef::Device(tag)) => request = request.query(&[("cam", tag)]),
            Some(SourceRef::Remote(url)) => request = request.query(&[("url", url)]),
            None => {}
        }
        spawn_detached("stop_video", async move {
            request.send().await?.error_for_status()?;
            Ok(())
        });
    }

    fn stop_beacon(&self) {
        let request = self.client.post(self.url(STOP_VIDEO_PATH)).timeout(self.request_timeout);
        spawn_detached("stop_beacon", async move {
            request.send().await?.error_for_status()?;
            Ok(())
        });
    }
}

/// Run a best-effort request without waiting for it.
fn spawn_detached<F>(call: &'static str, request: F)
where
    F: Future<Output = Result<(), reqwest::Error>> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = request.await {
                    debug!(call, error = %e, "best-effort request failed");
                }
            });
        }
        Err(_) => debug!(call, "no async runtime; best-effort request skipped"),
    }
}

#[cfg(test)]
#[path = "backend_test.rs"]
mod tests;
