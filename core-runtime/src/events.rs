//! # Event Bus System
//!
//! Provides an event-driven architecture for Photo Sync Core using
//! `tokio::sync::broadcast`. The sync orchestrator and transfer scheduler
//! publish typed events here; UI collaborators subscribe to render phase,
//! progress and per-transfer state without polling the engine.
//!
//! This is the typed replacement for an ad-hoc map of progress callbacks:
//! producers emit [`CoreEvent`] values, and each subscriber gets an
//! independent broadcast receiver.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, SyncEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::PhaseChanged {
//!         phase: "uploadPendingFiles".to_string(),
//!         percent: 40,
//!     }))
//!     .ok();
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: subscriber was too slow and missed `n`
//!   events. Non-fatal; the subscriber keeps receiving new events.
//! - **`RecvError::Closed`**: all senders dropped, treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Local scan events
    Scan(ScanEvent),
    /// Sync-pass events
    Sync(SyncEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Scan(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Started { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Cancelled { .. }) => EventSeverity::Warning,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Scan Events
// ============================================================================

/// Events emitted while indexing local media.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ScanEvent {
    /// A scan of the local roots started.
    Started {
        /// Number of scan roots.
        roots: u32,
    },
    /// The scan finished.
    Completed {
        /// Files enumerated by the platform source.
        files_seen: u64,
        /// Records that made it into the media index.
        records_indexed: u64,
    },
}

impl ScanEvent {
    fn description(&self) -> &str {
        match self {
            ScanEvent::Started { .. } => "Local scan started",
            ScanEvent::Completed { .. } => "Local scan completed",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted over the course of one sync pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A sync pass was accepted and is running.
    Started {
        /// This device's stable identifier.
        device_id: String,
        /// Human-readable device name.
        device_name: String,
    },
    /// The orchestrator entered a new phase.
    PhaseChanged {
        /// Phase name (e.g. "deleteMarkedFiles").
        phase: String,
        /// Overall percent at phase entry (0-100).
        percent: u8,
    },
    /// Incremental progress within the current phase.
    Progress {
        /// Current phase name.
        phase: String,
        /// Overall percent (0-100), monotonically non-decreasing per pass.
        percent: u8,
        /// Human-readable status line.
        status: String,
    },
    /// A transfer task changed state.
    TransferUpdated {
        /// Transfer task identifier.
        task_id: String,
        /// Media identifier the task operates on.
        media_id: String,
        /// Operation kind ("upload", "download", "delete").
        kind: String,
        /// Task state ("pending", "inProgress", "completed", "failed").
        state: String,
        /// Bytes moved by this task so far.
        bytes: u64,
        /// Failure message, for failed tasks.
        error: Option<String>,
    },
    /// The pass finished successfully.
    Completed {
        /// Files uploaded.
        uploaded: u64,
        /// Files downloaded.
        downloaded: u64,
        /// Cloud files deleted.
        deleted: u64,
        /// Items that ended in an error status.
        failed: u64,
        /// Wall-clock duration of the pass in seconds.
        duration_secs: u64,
    },
    /// The pass aborted with an error.
    Failed {
        /// Human-readable error message.
        message: String,
        /// Phase during which the failure occurred.
        phase: String,
    },
    /// The pass was cancelled cooperatively.
    Cancelled {
        /// Phase at which cancellation was observed.
        phase: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync pass started",
            SyncEvent::PhaseChanged { .. } => "Sync phase changed",
            SyncEvent::Progress { .. } => "Sync in progress",
            SyncEvent::TransferUpdated { .. } => "Transfer task updated",
            SyncEvent::Completed { .. } => "Sync pass completed",
            SyncEvent::Failed { .. } => "Sync pass failed",
            SyncEvent::Cancelled { .. } => "Sync pass cancelled",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future
    /// events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering
/// capabilities.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n`
    /// events. Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_creation() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        let event = CoreEvent::Scan(ScanEvent::Started { roots: 1 });

        // Should error when no subscribers
        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_event_emission_with_subscribers() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe();

        let event = CoreEvent::Sync(SyncEvent::Started {
            device_id: "dev-1".to_string(),
            device_name: "laptop".to_string(),
        });

        let result = bus.emit(event.clone());
        assert_eq!(result.unwrap(), 1);

        let received = sub.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Sync(SyncEvent::PhaseChanged {
            phase: "preparing".to_string(),
            percent: 0,
        });

        bus.emit(event.clone()).ok();

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Sync(_)));

        bus.emit(CoreEvent::Scan(ScanEvent::Started { roots: 2 })).ok();

        let sync_event = CoreEvent::Sync(SyncEvent::Cancelled {
            phase: "uploadPendingFiles".to_string(),
        });
        bus.emit(sync_event.clone()).ok();

        // Should only receive the sync event
        let received = stream.recv().await.unwrap();
        assert_eq!(received, sync_event);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2); // Very small buffer
        let mut sub = bus.subscribe();

        for i in 0..5 {
            let event = CoreEvent::Sync(SyncEvent::Progress {
                phase: "uploadPendingFiles".to_string(),
                percent: i * 10,
                status: format!("{} of 5", i),
            });
            bus.emit(event).ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn test_event_severity() {
        let error_event = CoreEvent::Sync(SyncEvent::Failed {
            message: "transport gone".to_string(),
            phase: "downloadPendingFiles".to_string(),
        });
        assert_eq!(error_event.severity(), EventSeverity::Error);

        let info_event = CoreEvent::Sync(SyncEvent::Completed {
            uploaded: 3,
            downloaded: 1,
            deleted: 0,
            failed: 0,
            duration_secs: 12,
        });
        assert_eq!(info_event.severity(), EventSeverity::Info);

        let debug_event = CoreEvent::Scan(ScanEvent::Completed {
            files_seen: 10,
            records_indexed: 8,
        });
        assert_eq!(debug_event.severity(), EventSeverity::Debug);
    }

    #[tokio::test]
    async fn test_event_serialization() {
        let event = CoreEvent::Sync(SyncEvent::TransferUpdated {
            task_id: "task-1".to_string(),
            media_id: "abc123".to_string(),
            kind: "upload".to_string(),
            state: "completed".to_string(),
            bytes: 2048,
            error: None,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("abc123"));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());

        assert!(stream.try_recv().is_none());
    }
}
