//! Domain event system: a run's timeline as it happens.
//!
//! Events are published at every phase transition of a run. Each carries
//! the run id, and tool events carry the tool name and storage key, so a
//! subscriber can rebuild the full timeline of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A run (or its single retry) started
    RunStarted {
        run_id: String,
        workflow: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    /// The conversation loop began an iteration
    IterationStarted {
        run_id: String,
        iteration: u32,
        timestamp: DateTime<Utc>,
    },

    /// The model responded
    ResponseGenerated {
        run_id: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool invocation was handed to its tool
    ToolDispatched {
        run_id: String,
        tool_name: String,
        storage_key: String,
        parallel: bool,
        timestamp: DateTime<Utc>,
    },

    /// A tool invocation settled
    ToolCompleted {
        run_id: String,
        tool_name: String,
        storage_key: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A guarded tool was short-circuited by a gate decision
    BlockingTriggered {
        run_id: String,
        tool_name: String,
        storage_key: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The retry supervisor started its one retry
    RetryTriggered {
        run_id: String,
        trigger: String,
        timestamp: DateTime<Utc>,
    },

    /// A run produced its outcome
    RunFinished {
        run_id: String,
        status: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::IterationStarted { run_id, .. }
            | Self::ResponseGenerated { run_id, .. }
            | Self::ToolDispatched { run_id, .. }
            | Self::ToolCompleted { run_id, .. }
            | Self::BlockingTriggered { run_id, .. }
            | Self::RetryTriggered { run_id, .. }
            | Self::RunFinished { run_id, .. } => run_id,
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
