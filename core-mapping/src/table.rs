//! The per-device cloud mapping table.
//!
//! One [`CloudMappingTable`] per device: rows keyed by media id, each linking
//! a local path to its canonical cloud path with an explicit sync status.
//! The table is pure data; persistence lives in `store` and policy in the
//! sync engine.

use chrono::{DateTime, Utc};
use core_index::{MediaId, MediaType};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{MappingError, Result};

// ============================================================================
// Sync status
// ============================================================================

/// Authoritative sync state of one mapping row.
///
/// A plain enum, not a version vector: convergence across devices is
/// best-effort, last-writer-wins per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    /// Local and cloud copies agree.
    Synced,
    /// Local file not yet uploaded.
    PendingUpload,
    /// Known remotely, not yet present locally.
    PendingDownload,
    /// Locally deleted; cloud copy awaiting removal.
    PendingDelete,
    /// Reserved. Never produced by the current reconciliation rules.
    Conflict,
    /// Last transfer attempt failed; retried on a future pass.
    Error,
    Unknown,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::PendingUpload => "pendingUpload",
            SyncStatus::PendingDownload => "pendingDownload",
            SyncStatus::PendingDelete => "pendingDelete",
            SyncStatus::Conflict => "conflict",
            SyncStatus::Error => "error",
            SyncStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "synced" => Ok(SyncStatus::Synced),
            "pendingUpload" => Ok(SyncStatus::PendingUpload),
            "pendingDownload" => Ok(SyncStatus::PendingDownload),
            "pendingDelete" => Ok(SyncStatus::PendingDelete),
            "conflict" => Ok(SyncStatus::Conflict),
            "error" => Ok(SyncStatus::Error),
            "unknown" => Ok(SyncStatus::Unknown),
            other => Err(MappingError::Parse(format!(
                "Unknown sync status: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// Mapping record
// ============================================================================

/// One row of a device's mapping table, keyed by `media_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRecord {
    pub media_id: MediaId,
    /// Where the file lives (or will live) on this device.
    pub local_path: PathBuf,
    /// Canonical remote location, rooted at the cloud namespace.
    pub cloud_path: String,
    pub media_type: MediaType,
    pub created_at: DateTime<Utc>,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

// ============================================================================
// Cloud mapping table
// ============================================================================

/// A device's full mapping table, the unit published to the cloud namespace
/// and persisted locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudMappingTable {
    /// Stable for the lifetime of the device installation.
    pub device_id: String,
    pub device_name: String,
    pub last_updated: DateTime<Utc>,
    pub mappings: Vec<MappingRecord>,
}

impl CloudMappingTable {
    pub fn new(device_id: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: device_name.into(),
            last_updated: Utc::now(),
            mappings: Vec::new(),
        }
    }

    /// Look up a row by media id. Missing ids are not an error.
    pub fn find(&self, media_id: &MediaId) -> Option<&MappingRecord> {
        self.mappings.iter().find(|m| &m.media_id == media_id)
    }

    pub fn find_mut(&mut self, media_id: &MediaId) -> Option<&mut MappingRecord> {
        self.mappings.iter_mut().find(|m| &m.media_id == media_id)
    }

    pub fn contains(&self, media_id: &MediaId) -> bool {
        self.find(media_id).is_some()
    }

    /// Insert or replace the row with the same media id, and touch
    /// `last_updated`.
    pub fn upsert(&mut self, record: MappingRecord) {
        if let Some(existing) = self.find_mut(&record.media_id) {
            *existing = record;
        } else {
            self.mappings.push(record);
        }
        self.last_updated = Utc::now();
    }

    /// Remove the row for `media_id`. Returns whether a row existed.
    pub fn remove(&mut self, media_id: &MediaId) -> bool {
        let before = self.mappings.len();
        self.mappings.retain(|m| &m.media_id != media_id);
        let removed = self.mappings.len() != before;
        if removed {
            self.last_updated = Utc::now();
        }
        removed
    }

    /// Rows currently in the given status.
    pub fn with_status(&self, status: SyncStatus) -> Vec<MappingRecord> {
        self.mappings
            .iter()
            .filter(|m| m.sync_status == status)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Encode as pretty JSON, the published wire and on-disk form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| MappingError::Parse(e.to_string()))
    }

    /// Decode a table previously produced by [`encode`](Self::encode).
    pub fn decode(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| MappingError::Parse(e.to_string()))
    }
}
