//! # Application Layer
//!
//! The CSC itself: summary state handling and the use cases that drive the
//! vent controller through the connector-layer traits.

mod csc;
pub mod interfaces;
pub mod use_cases;

pub use csc::*;
pub use interfaces::*;
pub use use_cases::*;
