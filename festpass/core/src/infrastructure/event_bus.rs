// Event Bus Implementation - Pub/Sub for Domain Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// The bus is the fire-and-forget notification sink of the pipeline: workers
// and services publish, the logging subscriber and operator tooling listen,
// and nothing in the core ever consumes a return value from it.
//
// In-memory only: events are lost on restart. The Registration record is
// the durable source of truth for outcomes, not the event stream.

use crate::domain::events::RegistrationEvent;
use crate::domain::registration::RegistrationId;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to registration events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<RegistrationEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: RegistrationEvent) {
        debug!("Publishing event: {:?}", event);

        // send() returns the number of receivers; zero subscribers is fine
        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all registration events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe and filter for a single registration
    /// Useful for tailing the pipeline of one submission
    pub fn subscribe_registration(&self, registration_id: RegistrationId) -> RegistrationEventReceiver {
        RegistrationEventReceiver {
            receiver: self.sender.subscribe(),
            registration_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for all registration events
pub struct EventReceiver {
    receiver: broadcast::Receiver<RegistrationEvent>,
}

impl EventReceiver {
    /// Receive the next event (blocks until event is available)
    pub async fn recv(&mut self) -> Result<RegistrationEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<RegistrationEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to a single registration's events
pub struct RegistrationEventReceiver {
    receiver: broadcast::Receiver<RegistrationEvent>,
    registration_id: RegistrationId,
}

impl RegistrationEventReceiver {
    /// Receive the next event for the subscribed registration, skipping others
    pub async fn recv(&mut self) -> Result<RegistrationEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;

            if event.registration_id() == self.registration_id {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let registration_id = RegistrationId::new();
        event_bus.publish(RegistrationEvent::Submitted {
            registration_id,
            code: "FEST-00001".to_string(),
            at: Utc::now(),
        });

        let received = receiver.recv().await.unwrap();
        match received {
            RegistrationEvent::Submitted { registration_id: id, code, .. } => {
                assert_eq!(id, registration_id);
                assert_eq!(code, "FEST-00001");
            }
            _ => panic!("Wrong event type received"),
        }
    }

    #[tokio::test]
    async fn test_registration_event_filtering() {
        let event_bus = EventBus::new(10);
        let registration_id = RegistrationId::new();
        let other_registration_id = RegistrationId::new();

        let mut receiver = event_bus.subscribe_registration(registration_id);

        // Event for a different registration (should be filtered out)
        event_bus.publish(RegistrationEvent::Submitted {
            registration_id: other_registration_id,
            code: "FEST-00002".to_string(),
            at: Utc::now(),
        });

        // Event for our registration (should be received)
        event_bus.publish(RegistrationEvent::Submitted {
            registration_id,
            code: "FEST-00003".to_string(),
            at: Utc::now(),
        });

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.registration_id(), registration_id);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish(RegistrationEvent::Submitted {
            registration_id: RegistrationId::new(),
            code: "FEST-00004".to_string(),
            at: Utc::now(),
        });

        // Both receivers should get the event
        let _ = receiver1.recv().await.unwrap();
        let _ = receiver2.recv().await.unwrap();
    }
}
