//! Slot registry — fixed mapping of grid position to camera identity.
//!
//! DESIGN
//! ======
//! The grid has exactly [`GRID_SLOTS`] positions, indexed from 1. Every
//! position always has a `CameraSlot`; positions without a configured camera
//! carry `source: None` and are never started. The registry is immutable for
//! the lifetime of a session, so components share it behind an `Arc`.
//!
//! A source is either a local capture device (a bare tag such as `0`) or a
//! remote stream URL. Scheme detection is prefix-based and matches what the
//! backend's `/video_feed` route distinguishes: `rtsp://`, `http://` and
//! `https://` are remote, anything else is a device tag.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Number of positions in the camera grid. Every loop over slots uses this.
pub const GRID_SLOTS: usize = 20;

const REMOTE_SCHEMES: [&str; 3] = ["rtsp://", "http://", "https://"];

const DEFAULT_NAMES: [&str; GRID_SLOTS] = [
    "Front Door",
    "Back Door",
    "Garage",
    "Living Room",
    "Driveway",
    "Office",
    "Kitchen",
    "Hallway",
    "Porch",
    "Yard",
    "Gate",
    "Parking",
    "Lobby",
    "Stairs",
    "Elevator",
    "Warehouse",
    "Shop",
    "Server Room",
    "Rooftop",
    "Basement",
];

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SlotError {
    #[error("failed to read slot file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid slot file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("too many slots: {count} configured, grid holds {max}")]
    TooManySlots { count: usize, max: usize },
}

// =============================================================================
// SOURCE REFERENCE
// =============================================================================

/// Where a slot's video comes from. Prefer [`SourceRef::parse`], which
/// maps blank input to "no source" instead of an empty identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// Local capture device tag, passed to the backend verbatim.
    Device(String),
    /// Remote stream URL (rtsp/http/https).
    Remote(String),
}

impl SourceRef {
    /// Classify a raw source string. Blank input means "no source".
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if REMOTE_SCHEMES.iter().any(|scheme| raw.starts_with(scheme)) {
            Some(Self::Remote(raw.to_string()))
        } else {
            Some(Self::Device(raw.to_string()))
        }
    }

    /// Server-relative address of the image stream for this source.
    #[must_use]
    pub fn stream_path(&self) -> String {
        match self {
            Self::Device(tag) => format!("/video_feed?cam={tag}"),
            Self::Remote(url) => format!("/video_feed?url={}", urlencoding::encode(url)),
        }
    }

    /// Identifier sent with a stop notification, or `None` when empty.
    ///
    /// [`SourceRef::parse`] and registry files never produce an empty
    /// identifier; only a hand-built `SourceRef` can carry one, and such a
    /// source never generates a stop call.
    #[must_use]
    pub fn stop_target(&self) -> Option<&str> {
        let id = match self {
            Self::Device(tag) => tag,
            Self::Remote(url) => url,
        };
        if id.is_empty() { None } else { Some(id) }
    }

    /// Link a user can open directly. Only remote sources have one.
    #[must_use]
    pub fn stream_link(&self) -> Option<&str> {
        match self {
            Self::Remote(url) => Some(url),
            Self::Device(_) => None,
        }
    }
}

// =============================================================================
// CAMERA SLOT
// =============================================================================

/// One grid position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSlot {
    /// 1-based grid index.
    pub index: usize,
    pub name: String,
    pub source: Option<SourceRef>,
}

/// File representation: `[{"name": "Gate", "source": "rtsp://..."}, ...]`.
/// Sources may be written as numbers for device indices (`"source": 0`).
#[derive(Debug, Deserialize)]
struct SlotEntry {
    name: String,
    #[serde(default)]
    source: Option<RawSource>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSource {
    Number(u64),
    Text(String),
}

impl RawSource {
    fn into_source(self) -> Option<SourceRef> {
        match self {
            Self::Number(n) => Some(SourceRef::Device(n.to_string())),
            Self::Text(text) => SourceRef::parse(&text),
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRegistry {
    slots: Vec<CameraSlot>,
}

impl SlotRegistry {
    /// Build a registry from `(name, source)` pairs in grid order. Positions
    /// past the end of `entries` become unnamed, unbound slots.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::TooManySlots`] if more than [`GRID_SLOTS`]
    /// entries are supplied.
    pub fn from_entries<I>(entries: I) -> Result<Self, SlotError>
    where
        I: IntoIterator<Item = (String, Option<SourceRef>)>,
    {
        let entries: Vec<_> = entries.into_iter().collect();
        if entries.len() > GRID_SLOTS {
            return Err(SlotError::TooManySlots { count: entries.len(), max: GRID_SLOTS });
        }

        let mut entries = entries.into_iter();
        let slots = (1..=GRID_SLOTS)
            .map(|index| match entries.next() {
                Some((name, source)) => CameraSlot { index, name, source },
                None => CameraSlot { index, name: fallback_name(index), source: None },
            })
            .collect();
        Ok(Self { slots })
    }

    /// The deployment default: twenty named positions, slot 1 bound to
    /// local device `0`, everything else unbound.
    #[must_use]
    pub fn default_grid() -> Self {
        let slots = DEFAULT_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| CameraSlot {
                index: i + 1,
                name: (*name).to_string(),
                source: if i == 0 { Some(SourceRef::Device("0".into())) } else { None },
            })
            .collect();
        Self { slots }
    }

    /// Parse a registry from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::Parse`] for malformed JSON and
    /// [`SlotError::TooManySlots`] for oversized lists.
    pub fn from_json(text: &str) -> Result<Self, SlotError> {
        let entries: Vec<SlotEntry> = serde_json::from_str(text)?;
        Self::from_entries(
            entries
                .into_iter()
                .map(|entry| (entry.name, entry.source.and_then(RawSource::into_source))),
        )
    }

    /// Load a registry from a JSON file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::Io`] if the file cannot be read, otherwise the
    /// errors of [`SlotRegistry::from_json`].
    pub fn from_json_file(path: &Path) -> Result<Self, SlotError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| SlotError::Io { path: path.to_path_buf(), source })?;
        Self::from_json(&text)
    }

    /// Slot at a 1-based index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&CameraSlot> {
        index.checked_sub(1).and_then(|i| self.slots.get(i))
    }

    /// Display name for a slot, `Camera {index}` when unmapped.
    #[must_use]
    pub fn name_for(&self, index: usize) -> String {
        match self.get(index) {
            Some(slot) if !slot.name.trim().is_empty() => slot.name.clone(),
            _ => fallback_name(index),
        }
    }

    /// Source bound to a slot, if any.
    #[must_use]
    pub fn source_for(&self, index: usize) -> Option<&SourceRef> {
        self.get(index).and_then(|slot| slot.source.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CameraSlot> {
        self.slots.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots with a bound source.
    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.source.is_some()).count()
    }
}

impl Default for SlotRegistry {
    fn default() -> Self {
        Self::default_grid()
    }
}

fn fallback_name(index: usize) -> String {
    format!("Camera {index}")
}

#[cfg(test)]
#[path = "slots_test.rs"]
mod tests;
