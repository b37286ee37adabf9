use anyhow::Result;

use crate::cli::ConsoleCommand;

use super::container::Container;
use super::controller::{StateController, VentCommandController};

pub struct Router<'a> {
    state_controller: StateController<'a>,
    vent_command_controller: VentCommandController<'a>,
}

impl<'a> Router<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self {
            state_controller: StateController::new(container),
            vent_command_controller: VentCommandController::new(container),
        }
    }

    /// Run one console command and render the reply line:
    /// the acknowledgement, or `failed <command>: <reason>`.
    pub async fn handle(&self, command: ConsoleCommand) -> String {
        let name = command.name();
        match self.route(command).await {
            Ok(ack) => ack,
            Err(e) => format!("failed {}: {:#}", name, e),
        }
    }

    pub async fn route(&self, command: ConsoleCommand) -> Result<String> {
        match command {
            ConsoleCommand::Start { config_override } => {
                self.state_controller.start(config_override).await
            }
            ConsoleCommand::Enable => self.state_controller.enable().await,
            ConsoleCommand::Disable => self.state_controller.disable().await,
            ConsoleCommand::Standby => self.state_controller.standby().await,
            ConsoleCommand::ExitControl => self.state_controller.exit_control().await,
            ConsoleCommand::State => self.state_controller.state().await,
            ConsoleCommand::CloseVentGate { gates } => {
                self.vent_command_controller.close_vent_gate(gates).await
            }
            ConsoleCommand::OpenVentGate { gates } => {
                self.vent_command_controller.open_vent_gate(gates).await
            }
            ConsoleCommand::ResetExtractionFanDrive => {
                self.vent_command_controller
                    .reset_extraction_fan_drive()
                    .await
            }
            ConsoleCommand::SetExtractionFanDriveFreq { target_frequency } => {
                self.vent_command_controller
                    .set_extraction_fan_drive_freq(target_frequency)
                    .await
            }
            ConsoleCommand::SetExtractionFanManualControlMode {
                enable_manual_control_mode,
            } => {
                self.vent_command_controller
                    .set_extraction_fan_manual_control_mode(enable_manual_control_mode)
                    .await
            }
            ConsoleCommand::StartExtractionFan => {
                self.vent_command_controller.start_extraction_fan().await
            }
            ConsoleCommand::StopExtractionFan => {
                self.vent_command_controller.stop_extraction_fan().await
            }
        }
    }
}
