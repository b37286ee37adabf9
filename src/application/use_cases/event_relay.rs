use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::{ControllerNotice, EventPublisher};

/// Forwards controller events to the publisher until the connection ends.
pub struct EventRelay {
    publisher: Arc<dyn EventPublisher>,
}

impl EventRelay {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }

    /// Returns the reason if the connection was lost, `None` if it was
    /// closed on purpose.
    pub async fn run(&self, mut notices: mpsc::UnboundedReceiver<ControllerNotice>) -> Option<String> {
        while let Some(notice) = notices.recv().await {
            match notice {
                ControllerNotice::Event(event) => {
                    debug!("Publishing {}", event.topic());
                    self.publisher.publish(event);
                }
                ControllerNotice::Disconnected(reason) => {
                    warn!("Controller connection lost: {}", reason);
                    return Some(reason);
                }
            }
        }
        None
    }
}
