//! # Core Sync Module
//!
//! The media synchronization engine for Photo Sync Core:
//! - [`reconciler`]: folds local scans and remote device tables into the
//!   mapping table
//! - [`scheduler`]: bounded-concurrency upload/download/delete batches
//! - [`orchestrator`]: the phase state machine driving one sync pass
//!
//! The engine is constructed with its collaborators (transport, filesystem,
//! media source) injected; there is no ambient global instance.

pub mod error;
pub mod orchestrator;
pub mod reconciler;
pub mod scheduler;
pub mod task;

pub use error::{Result, SyncError};
pub use orchestrator::{SyncConfig, SyncOrchestrator, SyncOutcome, SyncPhase, SyncSnapshot};
pub use reconciler::{apply_scan, fetch_remote_tables, merge_remote, ReconcileStats};
pub use scheduler::{
    BatchReport, ItemOutcome, ProgressSink, ProgressWindow, TransferScheduler,
    DEFAULT_MAX_CONCURRENT_TRANSFERS,
};
pub use task::{TaskState, TransferKind, TransferTask};
