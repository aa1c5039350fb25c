//! Media Enumeration via Directory Walk

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    scanner::{MediaSource, RawMediaFile},
};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Default recursion depth bound for the walk.
const DEFAULT_MAX_DEPTH: usize = 16;

/// Recursive directory walk implementing [`MediaSource`].
///
/// Hidden entries (leading `.`) are skipped; unreadable directories are
/// logged and skipped rather than failing the enumeration.
pub struct WalkMediaSource {
    max_depth: usize,
}

impl WalkMediaSource {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    async fn walk(&self, root: &Path, out: &mut Vec<RawMediaFile>) {
        // Iterative walk; recursion in async fns would need boxing.
        let mut pending: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 0)];

        while let Some((dir, depth)) = pending.pop() {
            let mut read_dir = match fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(e) => {
                    warn!(path = ?dir, error = %e, "Skipping unreadable directory");
                    continue;
                }
            };

            loop {
                let entry = match read_dir.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(path = ?dir, error = %e, "Directory iteration failed");
                        break;
                    }
                };

                let path = entry.path();
                if is_hidden(&path) {
                    continue;
                }

                let metadata = match entry.metadata().await {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(path = ?path, error = %e, "Skipping unreadable entry");
                        continue;
                    }
                };

                if metadata.is_dir() {
                    if depth + 1 < self.max_depth {
                        pending.push((path, depth + 1));
                    }
                    continue;
                }

                if !metadata.is_file() {
                    continue;
                }

                let modified_at = metadata
                    .modified()
                    .ok()
                    .map(system_time_to_utc)
                    .unwrap_or_else(Utc::now);
                let created_at = metadata.created().ok().map(system_time_to_utc);

                out.push(RawMediaFile {
                    path,
                    size: metadata.len(),
                    created_at,
                    modified_at,
                });
            }
        }
    }
}

impl Default for WalkMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSource for WalkMediaSource {
    async fn enumerate(&self, roots: &[PathBuf]) -> Result<Vec<RawMediaFile>> {
        let mut files = Vec::new();
        for root in roots {
            self.walk(root, &mut files).await;
        }
        debug!(roots = roots.len(), files = files.len(), "Enumerated media candidates");
        Ok(files)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn system_time_to_utc(t: std::time::SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}
