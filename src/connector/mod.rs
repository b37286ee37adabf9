//! # Connector Layer
//!
//! External integrations implementing the application interfaces:
//! - TCP link to the vent controller
//! - Mock vent controller for simulation mode
//! - Event fan-out and the console API

pub mod adapter;
pub mod api;

pub use adapter::*;
