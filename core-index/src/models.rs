//! Media records and the date-bucketed index.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Image extensions recognized by the indexer.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "heic", "heif", "tiff", "tif", "dng", "cr2",
    "nef", "arw",
];

/// Video extensions recognized by the indexer.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "m4v", "3gp", "mts", "m2ts", "wmv",
];

/// Media classification derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    /// Unrecognized extension; excluded from indexing.
    Unknown,
}

impl MediaType {
    /// Classify a file extension (case-insensitive, without the dot).
    pub fn from_extension(extension: &str) -> Self {
        let ext = extension.to_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            MediaType::Image
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            MediaType::Video
        } else {
            MediaType::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Content-derived identifier for one physical media file.
///
/// Stable across rescans of an unchanged file; recomputed when content
/// changes. See `identity` for the derivation tiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MediaId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Pixel dimensions, when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// One indexed photo/video file and its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    /// Content-derived identifier.
    pub id: MediaId,
    /// Absolute path the file was enumerated at.
    pub original_path: PathBuf,
    /// File name including extension.
    pub name: String,
    /// Lowercase extension without the dot.
    pub extension: String,
    /// Size in bytes.
    pub size: u64,
    pub media_type: MediaType,
    /// Drives date bucketing.
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// Playback duration in seconds, for videos.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Whether the record exists as a readable file on this device,
    /// as opposed to a remote-only placeholder.
    pub is_local: bool,
}

impl MediaRecord {
    /// The `YYYY/MM/DD` bucket derived from `created_at`.
    pub fn date_path(&self) -> String {
        format_date_path(&self.created_at)
    }
}

/// Format a timestamp as a `YYYY/MM/DD` bucket key.
pub fn format_date_path(ts: &DateTime<Utc>) -> String {
    format!("{:04}/{:02}/{:02}", ts.year(), ts.month(), ts.day())
}

/// Media records sharing one `YYYY/MM/DD` bucket.
///
/// Invariant: every record's own `created_at` matches `date_path`.
/// Re-bucketing on a date correction means removing the record here and
/// inserting it into the bucket matching its new date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaIndex {
    pub date_path: String,
    pub records: Vec<MediaRecord>,
}

impl MediaIndex {
    pub fn new(date_path: impl Into<String>) -> Self {
        Self {
            date_path: date_path.into(),
            records: Vec::new(),
        }
    }

    /// Insert or replace by media id.
    pub fn upsert(&mut self, record: MediaRecord) {
        if let Some(existing) = self.records.iter_mut().find(|r| r.id == record.id) {
            *existing = record;
        } else {
            self.records.push(record);
        }
    }

    pub fn find(&self, id: &MediaId) -> Option<&MediaRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The full local index: bucket key (`YYYY/MM/DD`) to bucket.
pub type MediaIndexMap = BTreeMap<String, MediaIndex>;
