//! Device identity.
//!
//! Each installation gets one UUID on first run, persisted alongside the
//! mapping table. Other devices key their merge isolation on it, so it must
//! never change for the lifetime of the installation.

use bridge_traits::FileSystemAccess;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;

pub const DEVICE_FILE: &str = "device.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub device_id: String,
    pub device_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

impl DeviceIdentity {
    /// Generate a fresh identity. Used only when no persisted one exists.
    pub fn generate(device_name: impl Into<String>) -> Self {
        Self {
            device_id: Uuid::new_v4().to_string(),
            device_name: device_name.into(),
            last_sync: None,
        }
    }

    /// Load the persisted identity, or generate and persist a new one.
    ///
    /// A corrupt identity file is treated as absent: losing the old id means
    /// this device republishes under a new one, which other devices simply
    /// see as an additional table.
    pub async fn load_or_generate(
        fs: &dyn FileSystemAccess,
        dir: &Path,
        device_name: &str,
    ) -> Result<Self> {
        let path = dir.join(DEVICE_FILE);
        if fs.exists(&path).await? {
            let data = fs.read_file(&path).await?;
            match serde_json::from_slice::<DeviceIdentity>(&data) {
                Ok(identity) => return Ok(identity),
                Err(e) => {
                    warn!(path = ?path, error = %e, "Corrupt device identity file, regenerating");
                }
            }
        }

        let identity = Self::generate(device_name);
        info!(device_id = %identity.device_id, "Generated new device identity");
        identity.save(fs, dir).await?;
        Ok(identity)
    }

    /// Persist to `<dir>/device.json`.
    pub async fn save(&self, fs: &dyn FileSystemAccess, dir: &Path) -> Result<()> {
        fs.create_dir_all(dir).await?;
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| crate::error::MappingError::Parse(e.to_string()))?;
        fs.write_file(&dir.join(DEVICE_FILE), Bytes::from(data))
            .await?;
        Ok(())
    }

    pub fn device_file_path(dir: &Path) -> PathBuf {
        dir.join(DEVICE_FILE)
    }
}
