//! # Mapping Reconciler
//!
//! Two steps, run in sequence each sync pass:
//!
//! 1. [`apply_scan`]: fold a fresh local scan into the device's mapping
//!    table. New media becomes `pendingUpload`; previously synced,
//!    locally-authored media that vanished from the scan becomes
//!    `pendingDelete`.
//! 2. [`merge_remote`]: fold another device's published table in. Unknown
//!    media becomes `pendingDownload` with the local path rewritten into
//!    this device's cache directory. A local row always wins over a remote
//!    one, whatever its status, so a device never oscillates on ids it
//!    already has an opinion about.

use bridge_traits::FileTransport;
use core_index::MediaIndexMap;
use core_mapping::{CloudMappingTable, CloudNamespace, MappingRecord, SyncStatus};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Counts of mutations applied by one reconciliation step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub added_for_upload: usize,
    pub marked_for_delete: usize,
    pub added_for_download: usize,
    pub rearmed_for_retry: usize,
}

/// Fold a fresh scan into the local table.
///
/// Deletion detection applies only to `synced` rows whose `local_path` lies
/// outside `cache_dir`: a downloaded copy disappearing from the cache is a
/// local cache eviction, not a user deletion, and an unresolved
/// `pendingUpload`/`pendingDownload`/`error` row is never silently
/// discarded.
pub fn apply_scan(
    table: &mut CloudMappingTable,
    index: &MediaIndexMap,
    namespace: &CloudNamespace,
    cache_dir: &Path,
) -> ReconcileStats {
    let mut stats = ReconcileStats::default();

    let mut seen = HashSet::new();
    for bucket in index.values() {
        for record in &bucket.records {
            seen.insert(record.id.clone());
            if table.contains(&record.id) {
                continue;
            }
            let cloud_path = namespace.media_path(&bucket.date_path, &record.name);
            table.upsert(MappingRecord {
                media_id: record.id.clone(),
                local_path: record.original_path.clone(),
                cloud_path,
                media_type: record.media_type,
                created_at: record.created_at,
                file_size: record.size,
                last_synced: None,
                sync_status: SyncStatus::PendingUpload,
            });
            stats.added_for_upload += 1;
        }
    }

    // Rows that failed a transfer on an earlier pass get a fresh attempt:
    // the retry unit is the next full sync pass, never within one.
    let to_rearm: Vec<_> = table
        .mappings
        .iter()
        .filter(|m| m.sync_status == SyncStatus::Error)
        .map(|m| m.media_id.clone())
        .collect();
    for media_id in to_rearm {
        if let Some(row) = table.find_mut(&media_id) {
            let next = if CloudNamespace::is_cache_path(cache_dir, &row.local_path) {
                SyncStatus::PendingDownload
            } else if seen.contains(&row.media_id) {
                SyncStatus::PendingUpload
            } else {
                // Locally authored and no longer on disk: the cloud copy
                // (if the failed operation ever created one) must go.
                SyncStatus::PendingDelete
            };
            debug!(media_id = %row.media_id, next = %next, "Re-arming errored row");
            row.sync_status = next;
            stats.rearmed_for_retry += 1;
        }
    }

    let to_delete: Vec<_> = table
        .mappings
        .iter()
        .filter(|m| {
            m.sync_status == SyncStatus::Synced
                && !CloudNamespace::is_cache_path(cache_dir, &m.local_path)
                && !seen.contains(&m.media_id)
        })
        .map(|m| m.media_id.clone())
        .collect();
    for media_id in to_delete {
        if let Some(row) = table.find_mut(&media_id) {
            debug!(media_id = %media_id, "Locally deleted file, marking for cloud deletion");
            row.sync_status = SyncStatus::PendingDelete;
            stats.marked_for_delete += 1;
        }
    }

    info!(
        added_for_upload = stats.added_for_upload,
        marked_for_delete = stats.marked_for_delete,
        rearmed_for_retry = stats.rearmed_for_retry,
        "Applied scan to mapping table"
    );
    stats
}

/// Fold one remote device's table into the local one.
///
/// Local entries are never overwritten: only media ids absent from the
/// local table produce new `pendingDownload` rows. A remote `pendingDelete`
/// row is skipped (pulling it would race the owner's deletion), as is any
/// row whose cloud path falls outside the namespace.
pub fn merge_remote(
    local: &mut CloudMappingTable,
    remote: &CloudMappingTable,
    namespace: &CloudNamespace,
    cache_dir: &Path,
) -> ReconcileStats {
    let mut stats = ReconcileStats::default();

    for record in &remote.mappings {
        if local.contains(&record.media_id) {
            continue;
        }
        // A remote row about to be deleted must not be resurrected here;
        // anything else is content another device may still serve.
        if record.sync_status == SyncStatus::PendingDelete {
            continue;
        }
        let Some(local_path) = namespace.local_cache_path(cache_dir, &record.cloud_path) else {
            warn!(
                device_id = %remote.device_id,
                cloud_path = %record.cloud_path,
                "Remote record outside namespace, skipping"
            );
            continue;
        };
        local.upsert(MappingRecord {
            media_id: record.media_id.clone(),
            local_path,
            cloud_path: record.cloud_path.clone(),
            media_type: record.media_type,
            created_at: record.created_at,
            file_size: record.file_size,
            last_synced: None,
            sync_status: SyncStatus::PendingDownload,
        });
        stats.added_for_download += 1;
    }

    info!(
        device_id = %remote.device_id,
        added_for_download = stats.added_for_download,
        "Merged remote mapping table"
    );
    stats
}

/// Download every other device's published table.
///
/// One device's table being missing, empty, or malformed never aborts the
/// pass: it is logged and that device is skipped.
pub async fn fetch_remote_tables(
    transport: &dyn FileTransport,
    namespace: &CloudNamespace,
    own_device_id: &str,
) -> Result<Vec<CloudMappingTable>> {
    let mappings_root = namespace.mappings_root();
    if !transport.exists(&mappings_root).await? {
        debug!("No mappings directory published yet");
        return Ok(Vec::new());
    }

    let mut tables = Vec::new();
    for entry in transport.list(&mappings_root).await? {
        if !entry.is_directory {
            continue;
        }
        let device_id = entry.name();
        if device_id == own_device_id {
            continue;
        }

        let mapping_path = namespace.device_mapping_path(device_id);
        let data = match transport.get(&mapping_path).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                warn!(device_id, "Device directory has no mapping file, skipping");
                continue;
            }
            Err(e) => {
                warn!(device_id, error = %e, "Failed to fetch remote mapping, skipping");
                continue;
            }
        };
        if data.is_empty() {
            warn!(device_id, "Remote mapping file is empty, skipping");
            continue;
        }
        match CloudMappingTable::decode(&data) {
            Ok(table) => {
                debug!(device_id, rows = table.len(), "Fetched remote mapping table");
                tables.push(table);
            }
            Err(e) => {
                warn!(device_id, error = %e, "Malformed remote mapping table, skipping");
            }
        }
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_index::{MediaId, MediaIndex, MediaRecord, MediaType};
    use std::path::PathBuf;

    fn cache_dir() -> PathBuf {
        PathBuf::from("/home/u/.cache/photosync/media")
    }

    fn media(id: &str, name: &str) -> MediaRecord {
        let created = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        MediaRecord {
            id: MediaId::new(id),
            original_path: PathBuf::from(format!("/home/u/Pictures/{}", name)),
            name: name.to_string(),
            extension: "jpg".to_string(),
            size: 2 * 1024 * 1024,
            media_type: MediaType::Image,
            created_at: created,
            modified_at: created,
            resolution: None,
            duration_secs: None,
            is_local: true,
        }
    }

    fn index_of(records: Vec<MediaRecord>) -> MediaIndexMap {
        let mut map = MediaIndexMap::new();
        for r in records {
            let dp = r.date_path();
            map.entry(dp.clone())
                .or_insert_with(|| MediaIndex::new(dp))
                .upsert(r);
        }
        map
    }

    fn mapping(id: &str, local: &str, status: SyncStatus) -> MappingRecord {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        MappingRecord {
            media_id: MediaId::new(id),
            local_path: PathBuf::from(local),
            cloud_path: format!("/photosync/2024/06/01/{}.jpg", id),
            media_type: MediaType::Image,
            created_at: ts,
            file_size: 1024,
            last_synced: None,
            sync_status: status,
        }
    }

    #[test]
    fn test_new_scan_entry_becomes_pending_upload() {
        let ns = CloudNamespace::default();
        let mut table = CloudMappingTable::new("dev-1", "Laptop");
        let index = index_of(vec![media("a", "beach.jpg")]);

        let stats = apply_scan(&mut table, &index, &ns, &cache_dir());

        assert_eq!(stats.added_for_upload, 1);
        let row = table.find(&MediaId::new("a")).unwrap();
        assert_eq!(row.sync_status, SyncStatus::PendingUpload);
        assert_eq!(row.cloud_path, "/photosync/2024/06/01/beach.jpg");
    }

    #[test]
    fn test_existing_rows_untouched_by_rescan() {
        let ns = CloudNamespace::default();
        let mut table = CloudMappingTable::new("dev-1", "Laptop");
        table.upsert(mapping("a", "/home/u/Pictures/a.jpg", SyncStatus::Synced));
        let index = index_of(vec![media("a", "a.jpg")]);

        let stats = apply_scan(&mut table, &index, &ns, &cache_dir());

        assert_eq!(stats.added_for_upload, 0);
        assert_eq!(
            table.find(&MediaId::new("a")).unwrap().sync_status,
            SyncStatus::Synced
        );
    }

    #[test]
    fn test_missing_synced_local_file_marked_pending_delete() {
        let ns = CloudNamespace::default();
        let mut table = CloudMappingTable::new("dev-1", "Laptop");
        table.upsert(mapping("gone", "/home/u/Pictures/gone.jpg", SyncStatus::Synced));

        let stats = apply_scan(&mut table, &index_of(vec![]), &ns, &cache_dir());

        assert_eq!(stats.marked_for_delete, 1);
        assert_eq!(
            table.find(&MediaId::new("gone")).unwrap().sync_status,
            SyncStatus::PendingDelete
        );
    }

    #[test]
    fn test_deletion_detection_skips_cache_and_unresolved_rows() {
        let ns = CloudNamespace::default();
        let mut table = CloudMappingTable::new("dev-1", "Laptop");
        // Downloaded copy: cache eviction is not a user deletion.
        table.upsert(mapping(
            "cached",
            "/home/u/.cache/photosync/media/2024/06/01/cached.jpg",
            SyncStatus::Synced,
        ));
        // Unresolved transfers must not be discarded.
        table.upsert(mapping("up", "/home/u/Pictures/up.jpg", SyncStatus::PendingUpload));

        let stats = apply_scan(&mut table, &index_of(vec![]), &ns, &cache_dir());

        assert_eq!(stats.marked_for_delete, 0);
        assert_eq!(
            table.find(&MediaId::new("cached")).unwrap().sync_status,
            SyncStatus::Synced
        );
        assert_eq!(
            table.find(&MediaId::new("up")).unwrap().sync_status,
            SyncStatus::PendingUpload
        );
    }

    #[test]
    fn test_error_rows_rearmed_for_retry_on_next_scan() {
        let ns = CloudNamespace::default();
        let mut table = CloudMappingTable::new("dev-1", "Laptop");
        // Failed upload whose local file is still present.
        table.upsert(mapping("a", "/home/u/Pictures/a.jpg", SyncStatus::Error));
        // Failed download into the cache directory.
        table.upsert(mapping(
            "b",
            "/home/u/.cache/photosync/media/2024/06/01/b.jpg",
            SyncStatus::Error,
        ));
        // Failed transfer of a locally authored file that has since vanished.
        table.upsert(mapping("c", "/home/u/Pictures/c.jpg", SyncStatus::Error));

        let stats = apply_scan(&mut table, &index_of(vec![media("a", "a.jpg")]), &ns, &cache_dir());

        assert_eq!(stats.rearmed_for_retry, 3);
        assert_eq!(
            table.find(&MediaId::new("a")).unwrap().sync_status,
            SyncStatus::PendingUpload
        );
        assert_eq!(
            table.find(&MediaId::new("b")).unwrap().sync_status,
            SyncStatus::PendingDownload
        );
        assert_eq!(
            table.find(&MediaId::new("c")).unwrap().sync_status,
            SyncStatus::PendingDelete
        );
    }

    #[test]
    fn test_merge_adds_unknown_remote_as_pending_download() {
        let ns = CloudNamespace::default();
        let mut local = CloudMappingTable::new("dev-1", "Laptop");
        local.upsert(mapping("x", "/home/u/Pictures/x.jpg", SyncStatus::PendingUpload));

        let mut remote = CloudMappingTable::new("dev-2", "Phone");
        remote.upsert(mapping("y", "/phone/y.jpg", SyncStatus::PendingUpload));

        let stats = merge_remote(&mut local, &remote, &ns, &cache_dir());

        assert_eq!(stats.added_for_download, 1);
        let y = local.find(&MediaId::new("y")).unwrap();
        assert_eq!(y.sync_status, SyncStatus::PendingDownload);
        assert_eq!(
            y.local_path,
            PathBuf::from("/home/u/.cache/photosync/media/2024/06/01/y.jpg")
        );
        assert_eq!(y.cloud_path, "/photosync/2024/06/01/y.jpg");
    }

    #[test]
    fn test_merge_never_overwrites_local_entry() {
        let ns = CloudNamespace::default();
        for status in [
            SyncStatus::Synced,
            SyncStatus::PendingUpload,
            SyncStatus::PendingDelete,
            SyncStatus::Error,
        ] {
            let mut local = CloudMappingTable::new("dev-1", "Laptop");
            local.upsert(mapping("x", "/home/u/Pictures/x.jpg", status));

            let mut remote = CloudMappingTable::new("dev-2", "Phone");
            remote.upsert(mapping("x", "/phone/x.jpg", SyncStatus::Synced));

            merge_remote(&mut local, &remote, &ns, &cache_dir());

            let row = local.find(&MediaId::new("x")).unwrap();
            assert_eq!(row.sync_status, status);
            assert_eq!(row.local_path, PathBuf::from("/home/u/Pictures/x.jpg"));
        }
    }

    #[test]
    fn test_merge_pulls_remote_rows_regardless_of_transfer_state() {
        // A remote row still marked error or pendingDownload on its owner
        // is content that exists (or will exist) in the cloud; it must
        // still reach this device.
        let ns = CloudNamespace::default();
        for status in [
            SyncStatus::PendingUpload,
            SyncStatus::PendingDownload,
            SyncStatus::Error,
        ] {
            let mut local = CloudMappingTable::new("dev-1", "Laptop");
            let mut remote = CloudMappingTable::new("dev-2", "Phone");
            remote.upsert(mapping("r", "/phone/r.jpg", status));

            let stats = merge_remote(&mut local, &remote, &ns, &cache_dir());

            assert_eq!(stats.added_for_download, 1, "status {}", status);
            assert_eq!(
                local.find(&MediaId::new("r")).unwrap().sync_status,
                SyncStatus::PendingDownload
            );
        }
    }

    mod fetch {
        use super::*;
        use async_trait::async_trait;
        use bridge_traits::error::{BridgeError, Result as BridgeResult};
        use bridge_traits::{RemoteEntry, TransportCredentials};
        use bytes::Bytes;
        use mockall::mock;
        use mockall::predicate::eq;

        mock! {
            Transport {}

            #[async_trait]
            impl bridge_traits::FileTransport for Transport {
                async fn connect(
                    &self,
                    endpoint: &str,
                    credentials: &TransportCredentials,
                ) -> BridgeResult<bool>;
                async fn is_connected(&self) -> bool;
                async fn list(&self, path: &str) -> BridgeResult<Vec<RemoteEntry>>;
                async fn mkdir(&self, path: &str) -> BridgeResult<()>;
                async fn mkdir_recursive(&self, path: &str) -> BridgeResult<()>;
                async fn exists(&self, path: &str) -> BridgeResult<bool>;
                async fn get(&self, path: &str) -> BridgeResult<Bytes>;
                async fn put(&self, path: &str, data: Bytes) -> BridgeResult<()>;
                async fn delete(&self, path: &str) -> BridgeResult<()>;
            }
        }

        fn device_dir(id: &str) -> RemoteEntry {
            RemoteEntry {
                path: format!("/photosync/.mappings/{}/", id),
                is_directory: true,
            }
        }

        #[tokio::test]
        async fn test_fetch_skips_own_device_and_bad_tables() {
            let ns = CloudNamespace::default();
            let good = CloudMappingTable::new("dev-good", "Phone");
            let encoded = Bytes::from(good.encode().unwrap());

            let mut transport = MockTransport::new();
            transport
                .expect_exists()
                .with(eq("/photosync/.mappings"))
                .returning(|_| Ok(true));
            transport.expect_list().returning(|_| {
                Ok(vec![
                    device_dir("dev-self"),
                    device_dir("dev-good"),
                    device_dir("dev-bad"),
                    device_dir("dev-missing"),
                ])
            });
            transport
                .expect_get()
                .with(eq("/photosync/.mappings/dev-good/mapping.json"))
                .returning(move |_| Ok(encoded.clone()));
            transport
                .expect_get()
                .with(eq("/photosync/.mappings/dev-bad/mapping.json"))
                .returning(|_| Ok(Bytes::from_static(b"{garbage")));
            transport
                .expect_get()
                .with(eq("/photosync/.mappings/dev-missing/mapping.json"))
                .returning(|path| Err(BridgeError::NotFound(path.to_string())));

            let tables = fetch_remote_tables(&transport, &ns, "dev-self")
                .await
                .unwrap();
            assert_eq!(tables.len(), 1);
            assert_eq!(tables[0].device_id, "dev-good");
        }

        #[tokio::test]
        async fn test_fetch_without_mappings_dir_is_empty() {
            let ns = CloudNamespace::default();
            let mut transport = MockTransport::new();
            transport.expect_exists().returning(|_| Ok(false));

            let tables = fetch_remote_tables(&transport, &ns, "dev-self")
                .await
                .unwrap();
            assert!(tables.is_empty());
        }
    }

    #[test]
    fn test_merge_skips_remote_pending_delete() {
        let ns = CloudNamespace::default();
        let mut local = CloudMappingTable::new("dev-1", "Laptop");
        let mut remote = CloudMappingTable::new("dev-2", "Phone");
        remote.upsert(mapping("doomed", "/phone/doomed.jpg", SyncStatus::PendingDelete));

        let stats = merge_remote(&mut local, &remote, &ns, &cache_dir());

        assert_eq!(stats.added_for_download, 0);
        assert!(local.is_empty());
    }
}
