//! Domain event system — observability for the orchestration loop.
//!
//! Events are published when something interesting happens in a task.
//! Subscribers (loggers, UIs, tests) react without coupling to the loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A new decision cycle began
    CycleStarted {
        iteration: u32,
        cost_estimate: u64,
        timestamp: DateTime<Utc>,
    },

    /// The model's reply was parsed into a decision
    DecisionParsed {
        iteration: u32,
        action: String,
        is_final: bool,
        timestamp: DateTime<Utc>,
    },

    /// The approval gate resolved a risky decision
    ApprovalResolved {
        capability: String,
        approved: bool,
        timestamp: DateTime<Utc>,
    },

    /// A capability was executed
    CapabilityExecuted {
        capability: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Compaction ran before a send. `performed` is false when there was
    /// nothing old enough to summarize and history is unchanged.
    CompactionCompleted {
        performed: bool,
        turns_before: usize,
        turns_after: usize,
        cost_before: u64,
        cost_after: u64,
        timestamp: DateTime<Utc>,
    },

    /// Compaction was attempted and failed; history is unchanged
    CompactionFailed {
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// Cost crossed the warning fraction with auto-compaction disabled
    BudgetWarning {
        cost_estimate: u64,
        cost_ceiling: u64,
        timestamp: DateTime<Utc>,
    },

    /// A task reached a terminal state
    TaskFinished {
        status: String,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::CapabilityExecuted {
            capability: "list_files".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::CapabilityExecuted {
                capability,
                success,
                ..
            } => {
                assert_eq!(capability, "list_files");
                assert!(success);
            }
            _ => panic!("Expected CapabilityExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::CompactionFailed {
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
