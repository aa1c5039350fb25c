//! # Transfer Scheduler
//!
//! Bounded-concurrency batch executor for uploads, downloads and deletions.
//!
//! ## Overview
//!
//! A batch is the set of mapping rows in one pending status. Each row is
//! dispatched as its own task through a counting semaphore (default 5
//! permits), every task runs to a terminal outcome, and one failing item
//! never aborts the batch. Outcomes are returned to the caller, which owns
//! the mapping table; the scheduler itself never mutates it.
//!
//! Progress is reported as an overall percentage interpolated across the
//! batch's slice of the pass ([`ProgressWindow`]), accumulated under a lock
//! dedicated to progress so transfer tasks never contend on the sync lock.

use bridge_traits::{remote_parent, FileSystemAccess, FileTransport};
use core_index::MediaId;
use core_mapping::MappingRecord;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::Result;
use crate::task::{TaskState, TransferKind, TransferTask};

/// Default maximum in-flight transport operations per batch.
pub const DEFAULT_MAX_CONCURRENT_TRANSFERS: usize = 5;

// ============================================================================
// Outcomes and progress
// ============================================================================

/// Terminal result of one batch item, applied to the mapping table by the
/// orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Transfer succeeded (or was skipped as already present); row becomes
    /// `synced`.
    Synced { media_id: MediaId, bytes: u64 },
    /// Cloud copy is gone; row is removed from the table.
    Removed { media_id: MediaId },
    /// Item failed; row becomes `error` and is retried on a later pass.
    Failed { media_id: MediaId, message: String },
}

impl ItemOutcome {
    pub fn media_id(&self) -> &MediaId {
        match self {
            ItemOutcome::Synced { media_id, .. }
            | ItemOutcome::Removed { media_id }
            | ItemOutcome::Failed { media_id, .. } => media_id,
        }
    }
}

/// Aggregate counts for one completed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: u64,
    pub failed: u64,
    pub bytes: u64,
}

impl BatchReport {
    pub fn from_outcomes(outcomes: &[ItemOutcome]) -> Self {
        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Synced { bytes, .. } => {
                    report.succeeded += 1;
                    report.bytes += bytes;
                }
                ItemOutcome::Removed { .. } => report.succeeded += 1,
                ItemOutcome::Failed { .. } => report.failed += 1,
            }
        }
        report
    }
}

/// The slice of the pass's overall 0-100 range a batch may report within.
#[derive(Debug, Clone, Copy)]
pub struct ProgressWindow {
    pub start: u8,
    pub end: u8,
}

impl ProgressWindow {
    pub fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Interpolate completed weight into the window. Saturates at `end`.
    pub fn percent(&self, done: u64, total: u64) -> u8 {
        if total == 0 {
            return self.end;
        }
        let span = self.end.saturating_sub(self.start) as u64;
        let offset = (done.min(total) * span) / total;
        self.start + offset as u8
    }
}

struct ProgressState {
    done_weight: u64,
    last_percent: u8,
}

/// Callback invoked whenever a batch's overall percentage advances, with the
/// new percent and the owning phase's wire name. Lets the orchestrator keep
/// its observer snapshot moving between phase boundaries.
pub type ProgressSink = Arc<dyn Fn(u8, &str) + Send + Sync>;

// ============================================================================
// Scheduler
// ============================================================================

/// Executes one batch of same-status mapping rows against the transport.
pub struct TransferScheduler {
    transport: Arc<dyn FileTransport>,
    fs: Arc<dyn FileSystemAccess>,
    event_bus: EventBus,
    max_concurrent: usize,
    /// Live task list exposed to UI collaborators. Not durable state.
    tasks: Arc<Mutex<Vec<TransferTask>>>,
    progress_sink: Option<ProgressSink>,
}

impl TransferScheduler {
    pub fn new(
        transport: Arc<dyn FileTransport>,
        fs: Arc<dyn FileSystemAccess>,
        event_bus: EventBus,
        max_concurrent: usize,
    ) -> Self {
        Self {
            transport,
            fs,
            event_bus,
            max_concurrent: max_concurrent.max(1),
            tasks: Arc::new(Mutex::new(Vec::new())),
            progress_sink: None,
        }
    }

    /// Install a callback observing intra-batch progress.
    pub fn with_progress_sink(mut self, sink: ProgressSink) -> Self {
        self.progress_sink = Some(sink);
        self
    }

    /// Snapshot of the current transfer-task list.
    pub async fn tasks(&self) -> Vec<TransferTask> {
        self.tasks.lock().await.clone()
    }

    /// Clear the task list at the start of a pass.
    pub async fn reset_tasks(&self) {
        self.tasks.lock().await.clear();
    }

    /// Run one batch to completion and return per-item outcomes.
    ///
    /// All items are dispatched through the semaphore and awaited; item
    /// order within the batch is unspecified.
    pub async fn run_batch(
        &self,
        records: Vec<MappingRecord>,
        kind: TransferKind,
        window: ProgressWindow,
        phase_name: &str,
    ) -> Result<Vec<ItemOutcome>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        // Deletes carry no payload; weight them uniformly so progress still
        // moves.
        let total_weight: u64 = records.iter().map(|r| r.file_size.max(1)).sum();
        let progress = Arc::new(Mutex::new(ProgressState {
            done_weight: 0,
            last_percent: window.start,
        }));
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        let mut join_set = JoinSet::new();
        for record in records {
            let task = TransferTask::new(record.media_id.clone(), kind, record.file_size);
            self.tasks.lock().await.push(task.clone());
            self.emit_task(&task);

            let transport = Arc::clone(&self.transport);
            let fs = Arc::clone(&self.fs);
            let semaphore = Arc::clone(&semaphore);
            let progress = Arc::clone(&progress);
            let tasks = Arc::clone(&self.tasks);
            let event_bus = self.event_bus.clone();
            let sink = self.progress_sink.clone();
            let phase = phase_name.to_string();

            join_set.spawn(async move {
                // Closed only if the scheduler is dropped mid-batch.
                let Ok(_permit) = semaphore.acquire().await else {
                    return ItemOutcome::Failed {
                        media_id: record.media_id.clone(),
                        message: "Scheduler shut down".to_string(),
                    };
                };

                Self::update_task(&tasks, &event_bus, &task.id, TaskState::InProgress, 0, None)
                    .await;

                let outcome = match kind {
                    TransferKind::Upload => {
                        Self::upload_item(transport.as_ref(), fs.as_ref(), &record).await
                    }
                    TransferKind::Download => {
                        Self::download_item(transport.as_ref(), fs.as_ref(), &record).await
                    }
                    TransferKind::Delete => Self::delete_item(transport.as_ref(), &record).await,
                };

                let (state, bytes, error) = match &outcome {
                    ItemOutcome::Synced { bytes, .. } => (TaskState::Completed, *bytes, None),
                    ItemOutcome::Removed { .. } => (TaskState::Completed, 0, None),
                    ItemOutcome::Failed { message, .. } => {
                        (TaskState::Failed, 0, Some(message.clone()))
                    }
                };
                Self::update_task(&tasks, &event_bus, &task.id, state, bytes, error).await;

                // Progress accumulates item weight under its own lock and
                // only ever reports a higher percentage than before.
                let weight = record.file_size.max(1);
                let mut guard = progress.lock().await;
                guard.done_weight += weight;
                let percent = window.percent(guard.done_weight, total_weight);
                if percent > guard.last_percent {
                    guard.last_percent = percent;
                    if let Some(sink) = &sink {
                        sink(percent, &phase);
                    }
                    event_bus
                        .emit(CoreEvent::Sync(SyncEvent::Progress {
                            phase,
                            percent,
                            status: format!("{} {}", kind, record.media_id),
                        }))
                        .ok();
                }

                outcome
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "Transfer task panicked"),
            }
        }
        Ok(outcomes)
    }

    // ------------------------------------------------------------------------
    // Per-item operations
    // ------------------------------------------------------------------------

    async fn upload_item(
        transport: &dyn FileTransport,
        fs: &dyn FileSystemAccess,
        record: &MappingRecord,
    ) -> ItemOutcome {
        let media_id = record.media_id.clone();

        match fs.exists(&record.local_path).await {
            Ok(true) => {}
            Ok(false) => {
                return ItemOutcome::Failed {
                    media_id,
                    message: format!("Local file missing: {}", record.local_path.display()),
                }
            }
            Err(e) => {
                return ItemOutcome::Failed {
                    media_id,
                    message: e.to_string(),
                }
            }
        }

        // Already present remotely, e.g. uploaded by a previous interrupted
        // pass. Skip the transfer and settle the row.
        match transport.exists(&record.cloud_path).await {
            Ok(true) => {
                debug!(cloud_path = %record.cloud_path, "Remote copy exists, skipping upload");
                return ItemOutcome::Synced {
                    media_id,
                    bytes: 0,
                };
            }
            Ok(false) => {}
            Err(e) => {
                return ItemOutcome::Failed {
                    media_id,
                    message: e.to_string(),
                }
            }
        }

        let data = match fs.read_file(&record.local_path).await {
            Ok(data) => data,
            Err(e) => {
                return ItemOutcome::Failed {
                    media_id,
                    message: e.to_string(),
                }
            }
        };
        let bytes = data.len() as u64;

        match transport.put(&record.cloud_path, data.clone()).await {
            Ok(()) => ItemOutcome::Synced { media_id, bytes },
            // Missing ancestor directory: create it and retry exactly once.
            Err(e) if e.is_not_found() => {
                if let Some(parent) = remote_parent(&record.cloud_path) {
                    if let Err(e) = transport.mkdir_recursive(parent).await {
                        return ItemOutcome::Failed {
                            media_id,
                            message: e.to_string(),
                        };
                    }
                }
                match transport.put(&record.cloud_path, data).await {
                    Ok(()) => ItemOutcome::Synced { media_id, bytes },
                    Err(e) => ItemOutcome::Failed {
                        media_id,
                        message: e.to_string(),
                    },
                }
            }
            Err(e) => ItemOutcome::Failed {
                media_id,
                message: e.to_string(),
            },
        }
    }

    async fn download_item(
        transport: &dyn FileTransport,
        fs: &dyn FileSystemAccess,
        record: &MappingRecord,
    ) -> ItemOutcome {
        let media_id = record.media_id.clone();

        let data = match transport.get(&record.cloud_path).await {
            Ok(data) => data,
            Err(e) => {
                return ItemOutcome::Failed {
                    media_id,
                    message: e.to_string(),
                }
            }
        };
        let bytes = data.len() as u64;

        if let Some(parent) = record.local_path.parent() {
            if let Err(e) = fs.create_dir_all(parent).await {
                return ItemOutcome::Failed {
                    media_id,
                    message: e.to_string(),
                };
            }
        }
        match fs.write_file(&record.local_path, data).await {
            Ok(()) => ItemOutcome::Synced { media_id, bytes },
            Err(e) => ItemOutcome::Failed {
                media_id,
                message: e.to_string(),
            },
        }
    }

    async fn delete_item(transport: &dyn FileTransport, record: &MappingRecord) -> ItemOutcome {
        let media_id = record.media_id.clone();

        match transport.exists(&record.cloud_path).await {
            // Already gone; the row is still retired.
            Ok(false) => {
                debug!(cloud_path = %record.cloud_path, "Remote copy already absent");
                return ItemOutcome::Removed { media_id };
            }
            Ok(true) => {}
            Err(e) => {
                return ItemOutcome::Failed {
                    media_id,
                    message: e.to_string(),
                }
            }
        }

        match transport.delete(&record.cloud_path).await {
            Ok(()) => ItemOutcome::Removed { media_id },
            Err(e) => ItemOutcome::Failed {
                media_id,
                message: e.to_string(),
            },
        }
    }

    // ------------------------------------------------------------------------
    // Task bookkeeping
    // ------------------------------------------------------------------------

    async fn update_task(
        tasks: &Mutex<Vec<TransferTask>>,
        event_bus: &EventBus,
        task_id: &str,
        state: TaskState,
        bytes: u64,
        error: Option<String>,
    ) {
        let mut guard = tasks.lock().await;
        if let Some(task) = guard.iter_mut().find(|t| t.id == task_id) {
            match state {
                TaskState::Pending => {}
                TaskState::InProgress => task.start(),
                TaskState::Completed => task.complete(bytes),
                TaskState::Failed => {
                    task.fail(error.clone().unwrap_or_else(|| "Unknown error".to_string()))
                }
            }
            let snapshot = task.clone();
            drop(guard);
            event_bus
                .emit(CoreEvent::Sync(SyncEvent::TransferUpdated {
                    task_id: snapshot.id,
                    media_id: snapshot.media_id.to_string(),
                    kind: snapshot.kind.as_str().to_string(),
                    state: snapshot.state.as_str().to_string(),
                    bytes: snapshot.transferred_bytes,
                    error: snapshot.error,
                }))
                .ok();
        }
    }

    fn emit_task(&self, task: &TransferTask) {
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::TransferUpdated {
                task_id: task.id.clone(),
                media_id: task.media_id.to_string(),
                kind: task.kind.as_str().to_string(),
                state: task.state.as_str().to_string(),
                bytes: task.transferred_bytes,
                error: task.error.clone(),
            }))
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_window_interpolation() {
        let window = ProgressWindow::new(40, 60);
        assert_eq!(window.percent(0, 100), 40);
        assert_eq!(window.percent(50, 100), 50);
        assert_eq!(window.percent(100, 100), 60);
        // Over-reporting saturates at the window end.
        assert_eq!(window.percent(150, 100), 60);
        // Empty batches jump straight to the end.
        assert_eq!(window.percent(0, 0), 60);
    }

    #[test]
    fn test_batch_report_from_outcomes() {
        let outcomes = vec![
            ItemOutcome::Synced {
                media_id: MediaId::new("a"),
                bytes: 100,
            },
            ItemOutcome::Removed {
                media_id: MediaId::new("b"),
            },
            ItemOutcome::Failed {
                media_id: MediaId::new("c"),
                message: "nope".to_string(),
            },
        ];
        let report = BatchReport::from_outcomes(&outcomes);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.bytes, 100);
    }

    mod batches {
        use super::*;
        use async_trait::async_trait;
        use bridge_traits::error::{BridgeError, Result as BridgeResult};
        use bridge_traits::{FileMetadata, RemoteEntry, TransportCredentials};
        use bytes::Bytes;
        use chrono::{TimeZone, Utc};
        use core_index::MediaType;
        use core_mapping::SyncStatus;
        use core_runtime::events::EventBus;
        use std::collections::{HashMap, HashSet};
        use std::path::{Path, PathBuf};
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Mutex as StdMutex;

        /// Rejects a put whose parent collection does not exist, the way a
        /// WebDAV server answers an upload into a missing ancestor.
        struct StrictDirTransport {
            dirs: StdMutex<HashSet<String>>,
            files: StdMutex<HashMap<String, Bytes>>,
            put_attempts: AtomicUsize,
            reject_all_puts: bool,
        }

        impl StrictDirTransport {
            fn new() -> Self {
                Self {
                    dirs: StdMutex::new(HashSet::new()),
                    files: StdMutex::new(HashMap::new()),
                    put_attempts: AtomicUsize::new(0),
                    reject_all_puts: false,
                }
            }

            fn rejecting_all_puts() -> Self {
                Self {
                    reject_all_puts: true,
                    ..Self::new()
                }
            }

            fn has_dir(&self, path: &str) -> bool {
                self.dirs.lock().unwrap().contains(path)
            }

            fn has_file(&self, path: &str) -> bool {
                self.files.lock().unwrap().contains_key(path)
            }
        }

        #[async_trait]
        impl FileTransport for StrictDirTransport {
            async fn connect(&self, _: &str, _: &TransportCredentials) -> BridgeResult<bool> {
                Ok(true)
            }

            async fn is_connected(&self) -> bool {
                true
            }

            async fn list(&self, _: &str) -> BridgeResult<Vec<RemoteEntry>> {
                Ok(Vec::new())
            }

            async fn mkdir(&self, path: &str) -> BridgeResult<()> {
                self.dirs
                    .lock()
                    .unwrap()
                    .insert(path.trim_end_matches('/').to_string());
                Ok(())
            }

            async fn exists(&self, path: &str) -> BridgeResult<bool> {
                let path = path.trim_end_matches('/');
                Ok(self.files.lock().unwrap().contains_key(path)
                    || self.dirs.lock().unwrap().contains(path))
            }

            async fn get(&self, path: &str) -> BridgeResult<Bytes> {
                self.files
                    .lock()
                    .unwrap()
                    .get(path)
                    .cloned()
                    .ok_or_else(|| BridgeError::NotFound(path.to_string()))
            }

            async fn put(&self, path: &str, data: Bytes) -> BridgeResult<()> {
                self.put_attempts.fetch_add(1, Ordering::SeqCst);
                if self.reject_all_puts {
                    return Err(BridgeError::NotFound(path.to_string()));
                }
                let parent = remote_parent(path).unwrap_or("/");
                if !self.dirs.lock().unwrap().contains(parent) {
                    return Err(BridgeError::NotFound(parent.to_string()));
                }
                self.files.lock().unwrap().insert(path.to_string(), data);
                Ok(())
            }

            async fn delete(&self, path: &str) -> BridgeResult<()> {
                self.files
                    .lock()
                    .unwrap()
                    .remove(path)
                    .map(|_| ())
                    .ok_or_else(|| BridgeError::NotFound(path.to_string()))
            }
        }

        /// Serves exactly one local file; everything else is absent.
        struct OneFileFs {
            path: PathBuf,
            data: Bytes,
        }

        #[async_trait]
        impl FileSystemAccess for OneFileFs {
            async fn get_data_directory(&self) -> BridgeResult<PathBuf> {
                Ok(PathBuf::from("/data"))
            }

            async fn exists(&self, path: &Path) -> BridgeResult<bool> {
                Ok(path == self.path)
            }

            async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata> {
                if path == self.path {
                    Ok(FileMetadata {
                        size: self.data.len() as u64,
                        created_at: None,
                        modified_at: None,
                        is_directory: false,
                    })
                } else {
                    Err(BridgeError::NotFound(path.display().to_string()))
                }
            }

            async fn create_dir_all(&self, _: &Path) -> BridgeResult<()> {
                Ok(())
            }

            async fn read_file(&self, path: &Path) -> BridgeResult<Bytes> {
                if path == self.path {
                    Ok(self.data.clone())
                } else {
                    Err(BridgeError::NotFound(path.display().to_string()))
                }
            }

            async fn write_file(&self, _: &Path, _: Bytes) -> BridgeResult<()> {
                Ok(())
            }

            async fn delete_file(&self, path: &Path) -> BridgeResult<()> {
                Err(BridgeError::NotFound(path.display().to_string()))
            }

            async fn rename(&self, _: &Path, _: &Path) -> BridgeResult<()> {
                Ok(())
            }

            async fn list_directory(&self, _: &Path) -> BridgeResult<Vec<PathBuf>> {
                Ok(Vec::new())
            }

            async fn open_read_stream(
                &self,
                path: &Path,
            ) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
                Err(BridgeError::NotFound(path.display().to_string()))
            }
        }

        fn local_file() -> PathBuf {
            PathBuf::from("/home/u/Pictures/a.jpg")
        }

        fn local_fs() -> Arc<OneFileFs> {
            Arc::new(OneFileFs {
                path: local_file(),
                data: Bytes::from_static(b"jpeg"),
            })
        }

        fn upload_record(id: &str) -> MappingRecord {
            let ts = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
            MappingRecord {
                media_id: MediaId::new(id),
                local_path: local_file(),
                cloud_path: format!("/photosync/2024/06/01/{}.jpg", id),
                media_type: MediaType::Image,
                created_at: ts,
                file_size: 4,
                last_synced: None,
                sync_status: SyncStatus::PendingUpload,
            }
        }

        #[tokio::test]
        async fn test_upload_creates_missing_parent_and_retries_once() {
            let transport = Arc::new(StrictDirTransport::new());
            let scheduler = TransferScheduler::new(
                Arc::clone(&transport) as Arc<dyn FileTransport>,
                local_fs(),
                EventBus::new(64),
                2,
            );

            let outcomes = scheduler
                .run_batch(
                    vec![upload_record("a")],
                    TransferKind::Upload,
                    ProgressWindow::new(40, 70),
                    "uploadPendingFiles",
                )
                .await
                .unwrap();

            assert_eq!(
                outcomes,
                vec![ItemOutcome::Synced {
                    media_id: MediaId::new("a"),
                    bytes: 4,
                }]
            );
            // One rejected put, the ancestor chain created, one retry.
            assert_eq!(transport.put_attempts.load(Ordering::SeqCst), 2);
            assert!(transport.has_dir("/photosync/2024/06/01"));
            assert!(transport.has_file("/photosync/2024/06/01/a.jpg"));
        }

        #[tokio::test]
        async fn test_upload_gives_up_after_single_retry() {
            let transport = Arc::new(StrictDirTransport::rejecting_all_puts());
            let scheduler = TransferScheduler::new(
                Arc::clone(&transport) as Arc<dyn FileTransport>,
                local_fs(),
                EventBus::new(64),
                2,
            );

            let outcomes = scheduler
                .run_batch(
                    vec![upload_record("a")],
                    TransferKind::Upload,
                    ProgressWindow::new(40, 70),
                    "uploadPendingFiles",
                )
                .await
                .unwrap();

            assert_eq!(outcomes.len(), 1);
            match &outcomes[0] {
                ItemOutcome::Failed { media_id, .. } => assert_eq!(media_id, &MediaId::new("a")),
                other => panic!("expected failed outcome, got {:?}", other),
            }
            assert_eq!(transport.put_attempts.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn test_progress_sink_sees_intra_batch_percents() {
            let transport = Arc::new(StrictDirTransport::new());
            transport.mkdir_recursive("/photosync/2024/06/01").await.unwrap();

            let seen: Arc<StdMutex<Vec<(u8, String)>>> = Arc::new(StdMutex::new(Vec::new()));
            let sink_seen = Arc::clone(&seen);
            // Single permit keeps completion order deterministic.
            let scheduler = TransferScheduler::new(
                Arc::clone(&transport) as Arc<dyn FileTransport>,
                local_fs(),
                EventBus::new(64),
                1,
            )
            .with_progress_sink(Arc::new(move |percent, phase| {
                sink_seen.lock().unwrap().push((percent, phase.to_string()));
            }));

            let outcomes = scheduler
                .run_batch(
                    vec![upload_record("a"), upload_record("b")],
                    TransferKind::Upload,
                    ProgressWindow::new(40, 70),
                    "uploadPendingFiles",
                )
                .await
                .unwrap();

            assert_eq!(outcomes.len(), 2);
            let seen = seen.lock().unwrap();
            assert_eq!(
                seen.as_slice(),
                &[
                    (55, "uploadPendingFiles".to_string()),
                    (70, "uploadPendingFiles".to_string()),
                ]
            );
        }
    }
}
