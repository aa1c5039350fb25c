//! # Transfer Task Tracking
//!
//! In-memory records of individual transport operations, exposed to UI
//! collaborators through the live task list and `TransferUpdated` events.
//! Tasks are observability state only; the mapping table remains the
//! durable source of truth.

use core_index::MediaId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Kind and state
// ============================================================================

/// The transport operation a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferKind {
    Upload,
    Download,
    Delete,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Upload => "upload",
            TransferKind::Download => "download",
            TransferKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for TransferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of one transfer task: `pending → inProgress → completed|failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::InProgress => "inProgress",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Transfer task
// ============================================================================

/// One tracked transport operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferTask {
    pub id: String,
    pub media_id: MediaId,
    pub kind: TransferKind,
    pub state: TaskState,
    /// Total size of the payload in bytes (0 for deletes).
    pub total_bytes: u64,
    /// Bytes counted toward batch progress so far.
    pub transferred_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferTask {
    pub fn new(media_id: MediaId, kind: TransferKind, total_bytes: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            media_id,
            kind,
            state: TaskState::Pending,
            total_bytes,
            transferred_bytes: 0,
            error: None,
        }
    }

    pub fn start(&mut self) {
        self.state = TaskState::InProgress;
    }

    pub fn complete(&mut self, transferred_bytes: u64) {
        self.state = TaskState::Completed;
        self.transferred_bytes = transferred_bytes;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.state = TaskState::Failed;
        self.error = Some(message.into());
    }
}
