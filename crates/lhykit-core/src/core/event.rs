//! Event system for driver notifications
//!
//! Provides:
//! - Event types for driver mode, position, status and buffer changes
//! - Event dispatcher for publishing events to subscribers
//!
//! Publishing is fire-and-forget: a send with no subscribers is not an error
//! for the driver.

use crate::data::{DriverMode, NativePosition};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Driver event types
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// Driver state machine entered a new mode
    ModeChanged(DriverMode),
    /// Head position changed
    PositionChanged {
        /// Position before the move.
        old: NativePosition,
        /// Position after the move.
        new: NativePosition,
    },
    /// Status line, `x=..;y=..;speed=..;power=..`
    Status(String),
    /// Bytes currently buffered in the output sink
    BufferLevel(usize),
    /// A job was aborted by a fatal error
    JobAborted {
        /// Job identifier.
        job: Uuid,
        /// Why the job was aborted.
        reason: String,
    },
}

impl DriverEvent {
    /// Topic string this event is published under
    pub fn topic(&self) -> &'static str {
        match self {
            DriverEvent::ModeChanged(_) => "driver;mode",
            DriverEvent::PositionChanged { .. } => "driver;position",
            DriverEvent::Status(_) => "driver;status",
            DriverEvent::BufferLevel(_) => "pipe;buffer",
            DriverEvent::JobAborted { .. } => "driver;abort",
        }
    }
}

impl std::fmt::Display for DriverEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverEvent::ModeChanged(mode) => write!(f, "Mode: {}", mode),
            DriverEvent::PositionChanged { old, new } => {
                write!(f, "Position: {} -> {}", old, new)
            }
            DriverEvent::Status(status) => write!(f, "Status: {}", status),
            DriverEvent::BufferLevel(len) => write!(f, "Buffer: {} bytes", len),
            DriverEvent::JobAborted { job, reason } => {
                write!(f, "Job {} aborted: {}", job, reason)
            }
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender channel for driver events.
    tx: broadcast::Sender<DriverEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 100)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Create a new event dispatcher with default buffer size
    pub fn default_with_buffer() -> Self {
        Self::new(100)
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: DriverEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::default_with_buffer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(
            DriverEvent::ModeChanged(DriverMode::Rapid).topic(),
            "driver;mode"
        );
        assert_eq!(DriverEvent::BufferLevel(3).topic(), "pipe;buffer");
        assert_eq!(
            DriverEvent::JobAborted {
                job: Uuid::nil(),
                reason: "gone".into()
            }
            .topic(),
            "driver;abort"
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        let dispatcher = EventDispatcher::default();
        assert_eq!(dispatcher.publish(DriverEvent::Status("x=0".into())), 0);
    }

    #[test]
    fn test_publish_subscribe() {
        let dispatcher = EventDispatcher::new(8);
        let mut rx = dispatcher.subscribe();
        assert_eq!(dispatcher.subscriber_count(), 1);

        dispatcher.publish(DriverEvent::PositionChanged {
            old: NativePosition::new(0, 0),
            new: NativePosition::new(10, 0),
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.topic(), "driver;position");
        assert_eq!(event.to_string(), "Position: (0, 0) -> (10, 0)");
    }
}
