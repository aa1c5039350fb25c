//! Local scanner: turns raw file enumeration into the media index.

use bridge_traits::{FileSystemAccess, MediaSource, RawMediaFile};
use chrono::{DateTime, NaiveDate, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::identity::ContentIdentity;
use crate::models::{MediaIndex, MediaIndexMap, MediaRecord, MediaType};

/// Result of one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Files the platform source enumerated.
    pub files_seen: u64,
    /// Records that made it into the index.
    pub records_indexed: u64,
    /// Files skipped (unknown type or unreadable).
    pub files_skipped: u64,
}

/// Builds a date-bucketed [`MediaIndexMap`] from a [`MediaSource`].
pub struct LocalScanner {
    source: Arc<dyn MediaSource>,
    fs: Arc<dyn FileSystemAccess>,
    identity: ContentIdentity,
}

impl LocalScanner {
    pub fn new(
        source: Arc<dyn MediaSource>,
        fs: Arc<dyn FileSystemAccess>,
        identity: ContentIdentity,
    ) -> Self {
        Self {
            source,
            fs,
            identity,
        }
    }

    /// Scan the given roots and build a fresh index.
    ///
    /// Files with unrecognized extensions are excluded. A file that cannot
    /// be read for hashing is logged and skipped; it does not fail the scan.
    pub async fn scan(&self, roots: &[std::path::PathBuf]) -> Result<(MediaIndexMap, ScanStats)> {
        let files = self.source.enumerate(roots).await?;
        let mut stats = ScanStats {
            files_seen: files.len() as u64,
            ..ScanStats::default()
        };

        let mut index = MediaIndexMap::new();
        for file in &files {
            match self.index_file(file).await {
                Ok(Some(record)) => {
                    stats.records_indexed += 1;
                    let date_path = record.date_path();
                    index
                        .entry(date_path.clone())
                        .or_insert_with(|| MediaIndex::new(date_path))
                        .upsert(record);
                }
                Ok(None) => stats.files_skipped += 1,
                Err(e) => {
                    warn!(path = ?file.path, error = %e, "Skipping unreadable media file");
                    stats.files_skipped += 1;
                }
            }
        }

        info!(
            files_seen = stats.files_seen,
            records_indexed = stats.records_indexed,
            files_skipped = stats.files_skipped,
            "Local scan complete"
        );
        Ok((index, stats))
    }

    async fn index_file(&self, file: &RawMediaFile) -> Result<Option<MediaRecord>> {
        let extension = file
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let media_type = MediaType::from_extension(&extension);
        if media_type == MediaType::Unknown {
            debug!(path = ?file.path, "Unrecognized extension, not indexing");
            return Ok(None);
        }

        let name = file
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();

        // Files that came back down from the cloud keep their capture date in
        // the cache path even though filesystem timestamps were rewritten.
        let created_at = date_from_path(&file.path).unwrap_or(file.modified_at);

        let id = self.identity.media_id(self.fs.as_ref(), file).await?;

        Ok(Some(MediaRecord {
            id,
            original_path: file.path.clone(),
            name,
            extension,
            size: file.size,
            media_type,
            created_at,
            modified_at: file.modified_at,
            resolution: None,
            duration_secs: None,
            is_local: true,
        }))
    }
}

/// Parse a capture date from a `.../YYYY/MM/DD/filename` path, if the three
/// parent components form a valid calendar date (4/2/2 digits).
pub fn date_from_path(path: &Path) -> Option<DateTime<Utc>> {
    let day = component(path, 1)?;
    let month = component(path, 2)?;
    let year = component(path, 3)?;

    if year.len() != 4 || month.len() != 2 || day.len() != 2 {
        return None;
    }
    if ![year, month, day]
        .iter()
        .all(|s| s.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }

    let date = NaiveDate::from_ymd_opt(
        year.parse().ok()?,
        month.parse().ok()?,
        day.parse().ok()?,
    )?;
    Some(DateTime::from_naive_utc_and_offset(
        date.and_hms_opt(0, 0, 0)?,
        Utc,
    ))
}

/// The `n`-th ancestor component above the file name (1 = direct parent).
fn component(path: &Path, n: usize) -> Option<&str> {
    let mut current = path.parent();
    for _ in 1..n {
        current = current?.parent();
    }
    current?.file_name()?.to_str()
}
