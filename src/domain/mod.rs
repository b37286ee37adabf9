//! # Domain Layer
//!
//! Summary states, vent and fan models, the controller wire format and
//! the CSC configuration. Nothing here touches sockets or tasks.

pub mod error;
pub mod models;

pub use error::*;
pub use models::*;
