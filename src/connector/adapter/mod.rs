mod broadcast_publisher;
mod mock_vent_controller;
mod tcp_vent_client;

pub use broadcast_publisher::*;
pub use mock_vent_controller::*;
pub use tcp_vent_client::*;
