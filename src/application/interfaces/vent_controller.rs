use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{ControllerMessage, CscConfig, CscEvent, DomainError, VentCommand};

/// What a live controller connection reports outside of command responses.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerNotice {
    Event(CscEvent),
    /// The connection ended without `close` being called.
    Disconnected(String),
}

/// An open connection to the vent controller.
#[async_trait]
pub trait VentController: Send + Sync {
    /// Send one command and wait for its response.
    ///
    /// A response with `error != 0` is still `Ok`; interpreting it is up to
    /// the caller.
    async fn send(&self, command: &VentCommand) -> Result<ControllerMessage, DomainError>;

    fn is_connected(&self) -> bool;

    async fn close(&self);
}

/// Opens controller connections.
#[async_trait]
pub trait ControllerConnector: Send + Sync {
    async fn connect(
        &self,
        config: &CscConfig,
        notices: mpsc::UnboundedSender<ControllerNotice>,
    ) -> Result<Arc<dyn VentController>, DomainError>;
}
