use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::DomainError;

/// A running stand-in for the vent controller hardware.
#[async_trait]
pub trait ControllerSimulator: Send + Sync {
    /// Local TCP port the simulator listens on.
    fn port(&self) -> u16;

    fn is_running(&self) -> bool;

    async fn close(&self);
}

/// Starts simulators for simulation mode 1.
#[async_trait]
pub trait SimulatorLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn ControllerSimulator>, DomainError>;
}
