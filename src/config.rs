//! Controller configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::slots::{SlotError, SlotRegistry};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_UPLOAD_PATH: &str = "/upload_video";

const DEFAULT_HIGHLIGHT_POLL_MS: u64 = 2000;
const DEFAULT_PROGRESS_POLL_MS: u64 = 2000;
const DEFAULT_COMPLETION_GRACE_MS: u64 = 5000;
const DEFAULT_POPUP_MS: u64 = 5000;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid base URL '{0}': expected http:// or https://")]
    InvalidBaseUrl(String),
}

/// Timer periods used by the pollers and the alert popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub highlight_poll: Duration,
    pub progress_poll: Duration,
    /// Delay between a job reaching 100% and the page reload.
    pub completion_grace: Duration,
    /// How long a detection popup stays up.
    pub popup: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            highlight_poll: Duration::from_millis(DEFAULT_HIGHLIGHT_POLL_MS),
            progress_poll: Duration::from_millis(DEFAULT_PROGRESS_POLL_MS),
            completion_grace: Duration::from_millis(DEFAULT_COMPLETION_GRACE_MS),
            popup: Duration::from_millis(DEFAULT_POPUP_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// Applies to polling and stop calls. Uploads are not time-limited.
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub base_url: String,
    pub upload_path: String,
    pub slots_file: Option<PathBuf>,
    pub timings: Timings,
    pub http: HttpTimeouts,
}

impl ControllerConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `CAMGRID_BASE_URL`: backend origin (default `http://127.0.0.1:5000`)
    /// - `CAMGRID_UPLOAD_PATH`: upload form action (default `/upload_video`)
    /// - `CAMGRID_SLOTS_FILE`: JSON slot registry; built-in grid when absent
    /// - `CAMGRID_HIGHLIGHT_POLL_MS`, `CAMGRID_PROGRESS_POLL_MS`: default 2000
    /// - `CAMGRID_COMPLETION_GRACE_MS`, `CAMGRID_POPUP_MS`: default 5000
    /// - `CAMGRID_REQUEST_TIMEOUT_SECS`: default 30
    /// - `CAMGRID_CONNECT_TIMEOUT_SECS`: default 5
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] for a base URL without an
    /// http(s) scheme.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = env_string("CAMGRID_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = normalize_base_url(&base_url)?;
        let upload_path = env_string("CAMGRID_UPLOAD_PATH").unwrap_or_else(|| DEFAULT_UPLOAD_PATH.to_string());
        let slots_file = env_string("CAMGRID_SLOTS_FILE").map(PathBuf::from);

        let timings = Timings {
            highlight_poll: env_duration_ms("CAMGRID_HIGHLIGHT_POLL_MS", DEFAULT_HIGHLIGHT_POLL_MS),
            progress_poll: env_duration_ms("CAMGRID_PROGRESS_POLL_MS", DEFAULT_PROGRESS_POLL_MS),
            completion_grace: env_duration_ms("CAMGRID_COMPLETION_GRACE_MS", DEFAULT_COMPLETION_GRACE_MS),
            popup: env_duration_ms("CAMGRID_POPUP_MS", DEFAULT_POPUP_MS),
        };
        let http = HttpTimeouts {
            request_secs: env_parse("CAMGRID_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("CAMGRID_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self { base_url, upload_path, slots_file, timings, http })
    }

    /// Same as [`ControllerConfig::from_env`] with the base URL replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if `base_url` is not http(s).
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ConfigError> {
        self.base_url = normalize_base_url(base_url)?;
        Ok(self)
    }

    /// Load the slot registry named by `slots_file`, or the built-in grid.
    ///
    /// # Errors
    ///
    /// Propagates [`SlotError`] from reading or parsing the file.
    pub fn load_registry(&self) -> Result<SlotRegistry, SlotError> {
        match &self.slots_file {
            Some(path) => SlotRegistry::from_json_file(path),
            None => Ok(SlotRegistry::default_grid()),
        }
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Err(ConfigError::InvalidBaseUrl(raw.to_string()))
    }
}

fn env_string(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

/// Millisecond duration from the environment. Zero falls back to the
/// default: a zero-period interval panics the polling task.
fn env_duration_ms(key: &str, default_ms: u64) -> Duration {
    match env_parse(key, default_ms) {
        0 => Duration::from_millis(default_ms),
        ms => Duration::from_millis(ms),
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
