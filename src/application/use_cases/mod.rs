mod event_relay;
mod vent_commands;

pub use event_relay::*;
pub use vent_commands::*;
