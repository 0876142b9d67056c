//! Lifecycle event broadcasting.
//!
//! Content transitions (publish, delete, ...) are published on an
//! [`EventBus`]; the cleaner daemon subscribes and reacts to the ones it
//! cares about.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ Event sources   │────>│    EventBus     │────>│  CleanerDaemon  │
//! │ (stdin, tests)  │     │  (broadcast)    │     │   (listener)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! event_bus.publish(LifecycleEvent::workflow("publish", id, path, "ns:news"));
//!
//! let mut rx = event_bus.subscribe();
//! while let Ok(event) = rx.recv().await {
//!     // Handle event
//! }
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::observability::metrics;

/// Default channel capacity for the event bus.
/// This determines how many events can be buffered before slow receivers
/// start missing events (lagging).
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Category of events emitted by document workflow transitions.
pub const WORKFLOW_CATEGORY: &str = "workflow";

/// Workflow action that published a document.
pub const ACTION_PUBLISH: &str = "publish";

/// Workflow action that deleted a document.
pub const ACTION_DELETE: &str = "delete";

/// A content lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub category: String,
    pub action: String,
    /// Identifier of the item the transition was invoked on.
    pub subject_id: Uuid,
    #[serde(default)]
    pub subject_path: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    /// A workflow event for `action` on the given subject.
    pub fn workflow(
        action: impl Into<String>,
        subject_id: Uuid,
        subject_path: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            category: WORKFLOW_CATEGORY.to_string(),
            action: action.into(),
            subject_id,
            subject_path: subject_path.into(),
            content_type: content_type.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_workflow(&self) -> bool {
        self.category == WORKFLOW_CATEGORY
    }
}

/// Central event bus for broadcasting lifecycle events.
///
/// Uses a tokio broadcast channel to allow multiple subscribers to receive
/// the same events. Events are cloned for each subscriber. Clones share the
/// channel and the counters.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
    counters: Arc<EventCounters>,
}

#[derive(Debug, Default)]
struct EventCounters {
    published: AtomicU64,
    /// Events sent while nobody was subscribed.
    dropped: AtomicU64,
}

impl EventBus {
    /// Create a new event bus with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            counters: Arc::default(),
        }
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// If there are no subscribers, the event is dropped and 0 is returned.
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(count) => {
                metrics::record_lifecycle_event("delivered");
                count
            }
            Err(broadcast::error::SendError(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_lifecycle_event("dropped");
                tracing::debug!(
                    action = %event.action,
                    subject_id = %event.subject_id,
                    "No subscribers, lifecycle event dropped"
                );
                0
            }
        }
    }

    /// Subscribe to events from this bus.
    ///
    /// If the receiver falls behind, it will receive `RecvError::Lagged`
    /// indicating how many events were missed.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the total number of events published.
    pub fn events_published(&self) -> u64 {
        self.counters.published.load(Ordering::Relaxed)
    }

    /// Get the number of events dropped (no subscribers).
    pub fn events_dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
