//! Event bus for meterwise using tokio::broadcast
//!
//! The store publishes a [`DataEvent`] after every mutation so views can
//! recompute their [`crate::analytics::UsageReport`].

use meterwise_types::ReadingId;
use tokio::sync::broadcast;

/// Events emitted by the data layer
#[derive(Debug, Clone, PartialEq)]
pub enum DataEvent {
    /// A reading was appended
    ReadingAdded(ReadingId),
    /// A reading was removed
    ReadingDeleted(ReadingId),
    /// Every reading was removed
    ReadingsCleared,
    /// Settings (tariffs, mode, goal, preferences) changed
    SettingsChanged,
    /// Coach conversation changed
    ChatUpdated,
    /// Initial load completed
    LoadCompleted,
}

/// Event bus for broadcasting data events
///
/// Uses tokio::broadcast for multi-consumer support.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DataEvent>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create with default capacity (64 events)
    pub fn default_capacity() -> Self {
        Self::new(64)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: DataEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<DataEvent> {
        self.sender.subscribe()
    }

    /// Get current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::default_capacity()
    }
}
