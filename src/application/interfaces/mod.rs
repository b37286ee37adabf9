mod event_publisher;
mod simulator;
mod vent_controller;

pub use event_publisher::*;
pub use simulator::*;
pub use vent_controller::*;
