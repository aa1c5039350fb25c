//! Media Enumeration Abstraction
//!
//! Platform collaborator that yields raw file metadata for media candidates
//! under a set of scan roots. On desktop this is a directory walk; on mobile
//! platforms it would wrap the photo-library APIs. The indexer turns this raw
//! output into content-addressed media records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::error::Result;

/// Raw metadata for one enumerated file, before indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMediaFile {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Creation timestamp, when the platform exposes one.
    pub created_at: Option<DateTime<Utc>>,
    /// Last-modified timestamp.
    pub modified_at: DateTime<Utc>,
}

/// Media enumeration capability.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Enumerate every regular file under the given roots.
    ///
    /// Directories that cannot be read are skipped, not fatal; the
    /// implementation decides how deep to recurse. No filtering by media
    /// type happens here — that is the indexer's job.
    async fn enumerate(&self, roots: &[PathBuf]) -> Result<Vec<RawMediaFile>>;
}
