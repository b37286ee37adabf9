pub mod state_controller;
pub mod vent_command_controller;

pub use state_controller::StateController;
pub use vent_command_controller::VentCommandController;
