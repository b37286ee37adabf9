use crate::domain::CscEvent;

/// Outlet for events and telemetry published by the CSC.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: CscEvent);
}
