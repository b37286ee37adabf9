use tokio::sync::broadcast;
use tracing::trace;

use crate::application::EventPublisher;
use crate::domain::CscEvent;

pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Fans CSC events out to any number of in-process subscribers.
///
/// Slow subscribers lose the oldest events rather than blocking the CSC.
pub struct BroadcastPublisher {
    sender: broadcast::Sender<CscEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CscEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: CscEvent) {
        // No subscribers is not an error.
        if self.sender.send(event).is_err() {
            trace!("Event dropped: no subscribers");
        }
    }
}
