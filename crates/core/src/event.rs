//! Domain event system: decoupled observation of agent runs.
//!
//! Events are published when something interesting happens in the system.
//! Other components can subscribe to react without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The agent loop received a provider response
    ProviderCalled {
        transcript_id: String,
        iteration: u32,
        model: String,
        tool_requests: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool request finished (successfully or not)
    ToolDispatched {
        tool_name: String,
        request_id: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A memory record was persisted
    MemorySaved {
        id: String,
        token_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// A similarity search completed
    MemoryRetrieved {
        requested: usize,
        returned: usize,
        timestamp: DateTime<Utc>,
    },

    /// An agent run reached a terminal state
    RunFinished {
        transcript_id: String,
        outcome: String,
        provider_calls: u32,
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
        // No subscribers is fine.
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

        bus.publish(DomainEvent::ToolDispatched {
            tool_name: "getWeather".into(),
            request_id: "call_1".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolDispatched { tool_name, success, .. } => {
                assert_eq!(tool_name, "getWeather");
                assert!(success);
            }
            _ => panic!("Expected ToolDispatched event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::MemoryRetrieved {
            requested: 3,
            returned: 0,
            timestamp: Utc::now(),
        });
    }
}
