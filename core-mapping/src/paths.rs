//! Cloud namespace layout.
//!
//! Everything a device publishes lives under one fixed root:
//!
//! ```text
//! /<namespace>/.mappings/<deviceId>/mapping.json   per-device tables
//! /<namespace>/<YYYY>/<MM>/<DD>/<fileName>         media blobs
//! ```

use std::path::{Path, PathBuf};

pub const DEFAULT_NAMESPACE: &str = "photosync";

/// Directory under the mappings root holding published device tables.
pub const MAPPINGS_DIR: &str = ".mappings";

/// File name of a device's published table.
pub const MAPPING_FILE: &str = "mapping.json";

/// Path builder for the shared cloud namespace.
#[derive(Debug, Clone)]
pub struct CloudNamespace {
    root: String,
}

impl Default for CloudNamespace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl CloudNamespace {
    pub fn new(namespace: impl AsRef<str>) -> Self {
        let trimmed = namespace.as_ref().trim_matches('/');
        Self {
            root: format!("/{}", trimmed),
        }
    }

    /// The namespace root, e.g. `/photosync`.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Directory containing every device's published mapping table.
    pub fn mappings_root(&self) -> String {
        format!("{}/{}", self.root, MAPPINGS_DIR)
    }

    /// A single device's published mapping table.
    pub fn device_mapping_path(&self, device_id: &str) -> String {
        format!("{}/{}/{}/{}", self.root, MAPPINGS_DIR, device_id, MAPPING_FILE)
    }

    /// Directory of a device's published table, for `mkdir` purposes.
    pub fn device_mapping_dir(&self, device_id: &str) -> String {
        format!("{}/{}/{}", self.root, MAPPINGS_DIR, device_id)
    }

    /// Canonical blob location for a media file, e.g.
    /// `/photosync/2024/06/01/img.jpg`.
    pub fn media_path(&self, date_path: &str, file_name: &str) -> String {
        format!("{}/{}/{}", self.root, date_path, file_name)
    }

    /// The `YYYY/MM/DD/fileName` tail of a cloud path, if it lies under this
    /// namespace.
    pub fn relative_media_path<'a>(&self, cloud_path: &'a str) -> Option<&'a str> {
        cloud_path
            .strip_prefix(self.root.as_str())?
            .strip_prefix('/')
    }

    /// Rewrite a remote record's cloud path into this device's cache
    /// directory, preserving the date layout so the capture date survives
    /// the round trip.
    pub fn local_cache_path(&self, cache_dir: &Path, cloud_path: &str) -> Option<PathBuf> {
        let relative = self.relative_media_path(cloud_path)?;
        let mut path = cache_dir.to_path_buf();
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        Some(path)
    }

    /// Whether `path` lies inside the device's cloud-cache directory, i.e.
    /// it was downloaded rather than locally authored.
    pub fn is_cache_path(cache_dir: &Path, path: &Path) -> bool {
        path.starts_with(cache_dir)
    }
}
