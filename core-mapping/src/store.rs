//! Local persistence of the mapping table.
//!
//! The on-disk file is the single persisted source of truth for this device
//! and is rewritten wholesale after each mutating sync phase. Writes go to a
//! sibling temp file followed by a rename so a crash never leaves a
//! truncated table behind.

use bridge_traits::FileSystemAccess;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;
use crate::table::CloudMappingTable;

pub const MAPPING_TABLE_FILE: &str = "cloud_mapping.json";

/// Loads and saves the device's [`CloudMappingTable`].
pub struct TableStore {
    path: PathBuf,
}

impl TableStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(MAPPING_TABLE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted table.
    ///
    /// A missing file yields `Ok(None)`; the caller decides what an absent
    /// table means. A present-but-malformed file is a parse error: the sync
    /// pass must not proceed on (and later overwrite) state it cannot read.
    pub async fn load(&self, fs: &dyn FileSystemAccess) -> Result<Option<CloudMappingTable>> {
        if !fs.exists(&self.path).await? {
            return Ok(None);
        }
        let data = fs.read_file(&self.path).await?;
        let table = CloudMappingTable::decode(&data)?;
        debug!(path = ?self.path, rows = table.len(), "Loaded mapping table");
        Ok(Some(table))
    }

    /// Load the persisted table, substituting a fresh empty one when the
    /// file is missing or unreadable. For bootstrap contexts where starting
    /// over is preferable to refusing to start.
    pub async fn load_or_default(
        &self,
        fs: &dyn FileSystemAccess,
        device_id: &str,
        device_name: &str,
    ) -> CloudMappingTable {
        match self.load(fs).await {
            Ok(Some(table)) => table,
            Ok(None) => CloudMappingTable::new(device_id, device_name),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Unreadable mapping table, starting fresh");
                CloudMappingTable::new(device_id, device_name)
            }
        }
    }

    /// Persist the table atomically: write `<path>.tmp`, then rename over
    /// the live file.
    pub async fn save(&self, fs: &dyn FileSystemAccess, table: &CloudMappingTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs.create_dir_all(parent).await?;
        }
        let data = table.encode()?;
        let tmp = self.path.with_extension("json.tmp");
        fs.write_file(&tmp, Bytes::from(data)).await?;
        fs.rename(&tmp, &self.path).await?;
        debug!(path = ?self.path, rows = table.len(), "Persisted mapping table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MappingError;
    use bridge_local::LocalFileSystem;

    #[tokio::test]
    async fn test_missing_table_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::with_data_directory(dir.path().to_path_buf());
        let store = TableStore::new(dir.path());

        assert!(store.load(&fs).await.unwrap().is_none());

        let table = store.load_or_default(&fs, "dev-1", "Laptop").await;
        assert_eq!(table.device_id, "dev-1");
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::with_data_directory(dir.path().to_path_buf());
        let store = TableStore::new(dir.path());

        let table = CloudMappingTable::new("dev-1", "Laptop");
        store.save(&fs, &table).await.unwrap();

        let loaded = store.load(&fs).await.unwrap().unwrap();
        assert_eq!(loaded, table);

        // No temp file left behind.
        assert!(!dir.path().join("cloud_mapping.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_malformed_table_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::with_data_directory(dir.path().to_path_buf());
        let store = TableStore::new(dir.path());
        tokio::fs::write(store.path(), b"{truncated")
            .await
            .unwrap();

        let err = store.load(&fs).await.unwrap_err();
        assert!(matches!(err, MappingError::Parse(_)));

        // Bootstrap path degrades to a fresh table instead.
        let table = store.load_or_default(&fs, "dev-1", "Laptop").await;
        assert!(table.is_empty());
    }
}
