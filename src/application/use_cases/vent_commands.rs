use std::sync::Arc;

use tracing::{debug, warn};

use crate::application::VentController;
use crate::domain::{DomainError, VentCommand};

/// Use case for running one command on the vent controller.
pub struct VentCommandUseCase {
    controller: Arc<dyn VentController>,
}

impl VentCommandUseCase {
    pub fn new(controller: Arc<dyn VentController>) -> Self {
        Self { controller }
    }

    pub async fn execute(&self, command: VentCommand) -> Result<(), DomainError> {
        if !self.controller.is_connected() {
            return Err(DomainError::NotConnected);
        }

        debug!("Sending command: {}", command.to_line());
        let response = self.controller.send(&command).await?;

        if response.command != command.name() {
            warn!(
                "Response for {} arrived while waiting for {}",
                response.command,
                command.name()
            );
            return Err(DomainError::protocol(format!(
                "Expected response to {}, got {}",
                command.name(),
                response.command
            )));
        }

        if response.is_error() {
            warn!(
                "Controller rejected {}: {} {}",
                command.name(),
                response.exception_name,
                response.message
            );
            return Err(DomainError::Controller {
                command: response.command,
                exception_name: response.exception_name,
                message: response.message,
            });
        }

        debug!("Command {} succeeded", command.name());
        Ok(())
    }
}
