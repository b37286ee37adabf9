mod config;
mod error_code;
mod event;
mod protocol;
mod state;
mod vent;

pub use config::*;
pub use error_code::*;
pub use event::*;
pub use protocol::*;
pub use state::*;
pub use vent::*;
