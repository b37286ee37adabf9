pub mod container;
pub mod controller;
pub mod event_stream;
pub mod router;

pub use container::{Container, ContainerConfig};
pub use event_stream::{format_event, forward_events};
pub use router::Router;
