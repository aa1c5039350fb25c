//! # Sync Orchestrator
//!
//! Drives one full sync pass as a sequential state machine.
//!
//! ## Overview
//!
//! The `SyncOrchestrator` is the engine's public surface. One pass runs the
//! phases below in order, checking the cancellation token before entering
//! each one:
//!
//! ```text
//! preparing → uploadLocalMapping → downloadMergeRemoteMappings
//!   → ensureCloudDirectories → deleteMarkedFiles → uploadPendingFiles
//!   → downloadPendingFiles → persistFinalMapping → completed
//! ```
//!
//! Deletes run before uploads so stale mapping reads on other devices
//! cannot resurrect removed files, and uploads run before downloads so this
//! device's changes are published before it pulls everyone else's.
//!
//! Only one pass may run per process: a concurrent `start_sync` is rejected
//! with [`SyncError::InProgress`], not queued. Cancellation is cooperative;
//! already-applied mapping mutations stay applied (partial progress is safe
//! to resume) and in-flight transfers within a phase are not interrupted.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncConfig, SyncOrchestrator};
//!
//! # async fn example(orchestrator: SyncOrchestrator) -> core_sync::Result<()> {
//! let outcome = orchestrator.start_sync().await?;
//! println!("pass finished: {:?}", outcome);
//! # Ok(())
//! # }
//! ```

use bridge_traits::{remote_parent, FileSystemAccess, FileTransport, MediaSource};
use bytes::Bytes;
use chrono::Utc;
use core_index::{ContentIdentity, LocalScanner, MediaIndexMap};
use core_mapping::{
    CloudMappingTable, CloudNamespace, DeviceIdentity, SyncStatus, TableStore,
};
use core_runtime::events::{CoreEvent, EventBus, ScanEvent, SyncEvent};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::reconciler;
use crate::scheduler::{
    BatchReport, ItemOutcome, ProgressWindow, TransferScheduler, DEFAULT_MAX_CONCURRENT_TRANSFERS,
};
use crate::task::{TransferKind, TransferTask};

// ============================================================================
// Phases and outcomes
// ============================================================================

/// The sequential states of one sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Preparing,
    UploadLocalMapping,
    DownloadMergeRemoteMappings,
    EnsureCloudDirectories,
    DeleteMarkedFiles,
    UploadPendingFiles,
    DownloadPendingFiles,
    PersistFinalMapping,
    Completed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Preparing => "preparing",
            SyncPhase::UploadLocalMapping => "uploadLocalMapping",
            SyncPhase::DownloadMergeRemoteMappings => "downloadMergeRemoteMappings",
            SyncPhase::EnsureCloudDirectories => "ensureCloudDirectories",
            SyncPhase::DeleteMarkedFiles => "deleteMarkedFiles",
            SyncPhase::UploadPendingFiles => "uploadPendingFiles",
            SyncPhase::DownloadPendingFiles => "downloadPendingFiles",
            SyncPhase::PersistFinalMapping => "persistFinalMapping",
            SyncPhase::Completed => "completed",
        }
    }

    /// The slice of the overall 0-100 progress range this phase reports in.
    /// Transfer phases get the bulk of the range.
    pub fn window(&self) -> ProgressWindow {
        match self {
            SyncPhase::Idle => ProgressWindow::new(0, 0),
            SyncPhase::Preparing => ProgressWindow::new(0, 5),
            SyncPhase::UploadLocalMapping => ProgressWindow::new(5, 15),
            SyncPhase::DownloadMergeRemoteMappings => ProgressWindow::new(15, 25),
            SyncPhase::EnsureCloudDirectories => ProgressWindow::new(25, 30),
            SyncPhase::DeleteMarkedFiles => ProgressWindow::new(30, 40),
            SyncPhase::UploadPendingFiles => ProgressWindow::new(40, 70),
            SyncPhase::DownloadPendingFiles => ProgressWindow::new(70, 95),
            SyncPhase::PersistFinalMapping => ProgressWindow::new(95, 100),
            SyncPhase::Completed => ProgressWindow::new(100, 100),
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal result of one sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Success,
    Cancelled,
    Error(String),
}

/// Read-only view of the running (or last) pass, for UI observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub phase: SyncPhase,
    pub percent: u8,
    pub status: String,
    pub outcome: Option<SyncOutcome>,
}

impl Default for SyncSnapshot {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            percent: 0,
            status: "Idle".to_string(),
            outcome: None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Sync engine configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Human-readable name this device publishes.
    pub device_name: String,
    /// Directories scanned for local media.
    pub scan_roots: Vec<PathBuf>,
    /// Root of the shared cloud namespace.
    pub namespace: CloudNamespace,
    /// Local directory downloaded media lands in, laid out `YYYY/MM/DD/`.
    pub cache_dir: PathBuf,
    /// Directory holding the mapping table and device identity.
    pub data_dir: PathBuf,
    /// Maximum concurrent transport operations per batch.
    pub max_concurrent_transfers: usize,
}

impl SyncConfig {
    pub fn new(device_name: impl Into<String>, data_dir: PathBuf, cache_dir: PathBuf) -> Self {
        Self {
            device_name: device_name.into(),
            scan_roots: Vec::new(),
            namespace: CloudNamespace::default(),
            cache_dir,
            data_dir,
            max_concurrent_transfers: DEFAULT_MAX_CONCURRENT_TRANSFERS,
        }
    }

    pub fn with_scan_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.scan_roots = roots;
        self
    }

    pub fn with_namespace(mut self, namespace: CloudNamespace) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_max_concurrent_transfers(mut self, n: usize) -> Self {
        self.max_concurrent_transfers = n.max(1);
        self
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

struct PassCounters {
    uploaded: u64,
    downloaded: u64,
    deleted: u64,
    failed: u64,
}

pub struct SyncOrchestrator {
    transport: Arc<dyn FileTransport>,
    fs: Arc<dyn FileSystemAccess>,
    scanner: LocalScanner,
    scheduler: TransferScheduler,
    store: TableStore,
    event_bus: EventBus,
    config: SyncConfig,
    /// Mutual exclusion over sync passes. Never held across public calls
    /// other than the pass itself.
    sync_lock: Mutex<()>,
    /// Cancellation token for the in-flight pass, if any.
    cancel: Mutex<Option<CancellationToken>>,
    /// Observer view. A std lock: the scheduler's progress sink updates it
    /// from inside transfer tasks, and reads never block on async work.
    snapshot: Arc<RwLock<SyncSnapshot>>,
}

impl SyncOrchestrator {
    pub fn new(
        transport: Arc<dyn FileTransport>,
        fs: Arc<dyn FileSystemAccess>,
        source: Arc<dyn MediaSource>,
        event_bus: EventBus,
        config: SyncConfig,
    ) -> Self {
        let scanner = LocalScanner::new(source, Arc::clone(&fs), ContentIdentity::default());
        let snapshot = Arc::new(RwLock::new(SyncSnapshot::default()));
        // Intra-phase transfer progress flows back into the observer
        // snapshot, not just onto the event bus.
        let sink_snapshot = Arc::clone(&snapshot);
        let scheduler = TransferScheduler::new(
            Arc::clone(&transport),
            Arc::clone(&fs),
            event_bus.clone(),
            config.max_concurrent_transfers,
        )
        .with_progress_sink(Arc::new(move |percent, _phase| {
            let mut snap = sink_snapshot
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            snap.percent = snap.percent.max(percent);
        }));
        let store = TableStore::new(&config.data_dir);
        Self {
            transport,
            fs,
            scanner,
            scheduler,
            store,
            event_bus,
            config,
            sync_lock: Mutex::new(()),
            cancel: Mutex::new(None),
            snapshot,
        }
    }

    // ------------------------------------------------------------------------
    // Public surface
    // ------------------------------------------------------------------------

    /// Run one full sync pass.
    ///
    /// Rejects with [`SyncError::InProgress`] if a pass is already running
    /// and with [`SyncError::NotConnected`] if the transport is not in a
    /// connected state.
    #[instrument(skip(self), fields(device = %self.config.device_name))]
    pub async fn start_sync(&self) -> Result<SyncOutcome> {
        let _guard = self.sync_lock.try_lock().map_err(|_| SyncError::InProgress)?;

        if !self.transport.is_connected().await {
            return Err(SyncError::NotConnected);
        }

        let token = CancellationToken::new();
        *self.cancel.lock().await = Some(token.clone());

        let started = Instant::now();
        let result = self.run_pass(&token, started).await;

        *self.cancel.lock().await = None;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(SyncError::Cancelled) => SyncOutcome::Cancelled,
            Err(e) => {
                let phase = self.snapshot().phase;
                error!(error = %e, phase = %phase, "Sync pass failed");
                self.event_bus
                    .emit(CoreEvent::Sync(SyncEvent::Failed {
                        message: e.to_string(),
                        phase: phase.as_str().to_string(),
                    }))
                    .ok();
                SyncOutcome::Error(e.to_string())
            }
        };

        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        snapshot.outcome = Some(outcome.clone());
        if let SyncOutcome::Error(message) = &outcome {
            snapshot.status = format!("Sync failed: {}", message);
        }
        drop(snapshot);
        Ok(outcome)
    }

    /// Request cancellation of the running pass.
    ///
    /// Cooperative: the pass stops before its next phase; in-flight
    /// transfers finish. A no-op when no pass is running.
    pub async fn cancel_sync(&self) {
        if let Some(token) = self.cancel.lock().await.as_ref() {
            info!("Sync cancellation requested");
            token.cancel();
        }
    }

    /// Current phase/progress/status view.
    pub fn snapshot(&self) -> SyncSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Live transfer-task list of the current (or last) pass.
    pub async fn transfer_tasks(&self) -> Vec<TransferTask> {
        self.scheduler.tasks().await
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    // ------------------------------------------------------------------------
    // The pass
    // ------------------------------------------------------------------------

    async fn run_pass(&self, token: &CancellationToken, started: Instant) -> Result<SyncOutcome> {
        let mut counters = PassCounters {
            uploaded: 0,
            downloaded: 0,
            deleted: 0,
            failed: 0,
        };

        // -- preparing --------------------------------------------------------
        self.enter_phase(SyncPhase::Preparing, token).await?;
        self.scheduler.reset_tasks().await;

        let identity = DeviceIdentity::load_or_generate(
            self.fs.as_ref(),
            &self.config.data_dir,
            &self.config.device_name,
        )
        .await?;
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Started {
                device_id: identity.device_id.clone(),
                device_name: identity.device_name.clone(),
            }))
            .ok();

        // A malformed local table is pass-fatal: refusing to run beats
        // silently overwriting state we could not read.
        let mut table = match self.store.load(self.fs.as_ref()).await? {
            Some(table) => table,
            None => CloudMappingTable::new(&identity.device_id, &identity.device_name),
        };

        let index = self.scan_local().await?;
        reconciler::apply_scan(
            &mut table,
            &index,
            &self.config.namespace,
            &self.config.cache_dir,
        );
        self.store.save(self.fs.as_ref(), &table).await?;

        // -- uploadLocalMapping ----------------------------------------------
        self.enter_phase(SyncPhase::UploadLocalMapping, token).await?;
        self.publish_mapping(&identity, &table).await?;

        // -- downloadMergeRemoteMappings -------------------------------------
        self.enter_phase(SyncPhase::DownloadMergeRemoteMappings, token)
            .await?;
        let remote_tables = reconciler::fetch_remote_tables(
            self.transport.as_ref(),
            &self.config.namespace,
            &identity.device_id,
        )
        .await?;
        for remote in &remote_tables {
            reconciler::merge_remote(
                &mut table,
                remote,
                &self.config.namespace,
                &self.config.cache_dir,
            );
        }
        self.store.save(self.fs.as_ref(), &table).await?;

        // -- ensureCloudDirectories ------------------------------------------
        self.enter_phase(SyncPhase::EnsureCloudDirectories, token).await?;
        self.ensure_cloud_directories(&table).await?;

        // -- deleteMarkedFiles -----------------------------------------------
        self.enter_phase(SyncPhase::DeleteMarkedFiles, token).await?;
        let report = self
            .run_transfer_phase(
                &mut table,
                SyncStatus::PendingDelete,
                TransferKind::Delete,
                SyncPhase::DeleteMarkedFiles,
            )
            .await?;
        counters.deleted += report.succeeded;
        counters.failed += report.failed;

        // -- uploadPendingFiles ----------------------------------------------
        self.enter_phase(SyncPhase::UploadPendingFiles, token).await?;
        let report = self
            .run_transfer_phase(
                &mut table,
                SyncStatus::PendingUpload,
                TransferKind::Upload,
                SyncPhase::UploadPendingFiles,
            )
            .await?;
        counters.uploaded += report.succeeded;
        counters.failed += report.failed;

        // -- downloadPendingFiles --------------------------------------------
        self.enter_phase(SyncPhase::DownloadPendingFiles, token).await?;
        let report = self
            .run_transfer_phase(
                &mut table,
                SyncStatus::PendingDownload,
                TransferKind::Download,
                SyncPhase::DownloadPendingFiles,
            )
            .await?;
        counters.downloaded += report.succeeded;
        counters.failed += report.failed;

        // -- persistFinalMapping ---------------------------------------------
        self.enter_phase(SyncPhase::PersistFinalMapping, token).await?;
        self.store.save(self.fs.as_ref(), &table).await?;

        let mut identity = identity;
        identity.last_sync = Some(Utc::now());
        identity.save(self.fs.as_ref(), &self.config.data_dir).await?;

        // -- completed --------------------------------------------------------
        self.set_snapshot(SyncPhase::Completed, 100, "Sync completed".to_string());
        let duration_secs = started.elapsed().as_secs();
        info!(
            uploaded = counters.uploaded,
            downloaded = counters.downloaded,
            deleted = counters.deleted,
            failed = counters.failed,
            duration_secs,
            "Sync pass completed"
        );
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Completed {
                uploaded: counters.uploaded,
                downloaded: counters.downloaded,
                deleted: counters.deleted,
                failed: counters.failed,
                duration_secs,
            }))
            .ok();
        Ok(SyncOutcome::Success)
    }

    // ------------------------------------------------------------------------
    // Phase helpers
    // ------------------------------------------------------------------------

    /// Cancellation gate and phase-entry bookkeeping. Partial progress from
    /// earlier phases stays applied when cancellation is observed.
    async fn enter_phase(&self, phase: SyncPhase, token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            warn!(phase = %phase, "Cancellation observed, aborting pass");
            self.event_bus
                .emit(CoreEvent::Sync(SyncEvent::Cancelled {
                    phase: phase.as_str().to_string(),
                }))
                .ok();
            let percent = self.snapshot().percent;
            self.set_snapshot(phase, percent, "Cancelled".to_string());
            return Err(SyncError::Cancelled);
        }

        let percent = phase.window().start;
        info!(phase = %phase, percent, "Entering sync phase");
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::PhaseChanged {
                phase: phase.as_str().to_string(),
                percent,
            }))
            .ok();
        self.set_snapshot(phase, percent, format!("Phase: {}", phase));
        Ok(())
    }

    fn set_snapshot(&self, phase: SyncPhase, percent: u8, status: String) {
        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        snapshot.phase = phase;
        // Monotone within a pass; a fresh pass resets via Preparing's 0.
        if phase == SyncPhase::Preparing {
            snapshot.percent = percent;
            snapshot.outcome = None;
        } else {
            snapshot.percent = snapshot.percent.max(percent);
        }
        snapshot.status = status;
    }

    async fn scan_local(&self) -> Result<MediaIndexMap> {
        self.event_bus
            .emit(CoreEvent::Scan(ScanEvent::Started {
                roots: self.config.scan_roots.len() as u32,
            }))
            .ok();
        let (index, stats) = self.scanner.scan(&self.config.scan_roots).await?;
        self.event_bus
            .emit(CoreEvent::Scan(ScanEvent::Completed {
                files_seen: stats.files_seen,
                records_indexed: stats.records_indexed,
            }))
            .ok();
        Ok(index)
    }

    /// Publish this device's table to its well-known path in the namespace.
    async fn publish_mapping(
        &self,
        identity: &DeviceIdentity,
        table: &CloudMappingTable,
    ) -> Result<()> {
        let dir = self.config.namespace.device_mapping_dir(&identity.device_id);
        self.transport.mkdir_recursive(&dir).await?;
        let path = self.config.namespace.device_mapping_path(&identity.device_id);
        let data = table.encode()?;
        self.transport.put(&path, Bytes::from(data)).await?;
        info!(path = %path, rows = table.len(), "Published mapping table");
        Ok(())
    }

    /// Pre-create every remote date directory uploads will land in, so the
    /// upload batch rarely hits the missing-parent retry path.
    async fn ensure_cloud_directories(&self, table: &CloudMappingTable) -> Result<()> {
        let mut dirs = BTreeSet::new();
        for record in &table.mappings {
            if record.sync_status != SyncStatus::PendingUpload {
                continue;
            }
            if let Some(parent) = remote_parent(&record.cloud_path) {
                dirs.insert(parent.to_string());
            }
        }
        for dir in dirs {
            self.transport.mkdir_recursive(&dir).await?;
        }
        Ok(())
    }

    /// Run one batch and fold its outcomes back into the table, then
    /// persist. The table is only ever mutated here and in the reconciler,
    /// both under the sync lock.
    async fn run_transfer_phase(
        &self,
        table: &mut CloudMappingTable,
        status: SyncStatus,
        kind: TransferKind,
        phase: SyncPhase,
    ) -> Result<BatchReport> {
        let batch = table.with_status(status);
        if batch.is_empty() {
            return Ok(BatchReport::default());
        }

        let outcomes = self
            .scheduler
            .run_batch(batch, kind, phase.window(), phase.as_str())
            .await?;

        for outcome in &outcomes {
            match outcome {
                ItemOutcome::Synced { media_id, .. } => {
                    if let Some(row) = table.find_mut(media_id) {
                        row.sync_status = SyncStatus::Synced;
                        row.last_synced = Some(Utc::now());
                    }
                }
                ItemOutcome::Removed { media_id } => {
                    table.remove(media_id);
                }
                ItemOutcome::Failed { media_id, message } => {
                    warn!(media_id = %media_id, message, "Transfer item failed");
                    if let Some(row) = table.find_mut(media_id) {
                        row.sync_status = SyncStatus::Error;
                    }
                }
            }
        }
        self.store.save(self.fs.as_ref(), table).await?;
        Ok(BatchReport::from_outcomes(&outcomes))
    }
}
