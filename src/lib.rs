pub mod application;
pub mod cli;
pub mod connector;
pub mod domain;

pub use application::{
    AtBuildingCsc, ControllerConnector, ControllerNotice, ControllerSimulator, CscSettings,
    EventPublisher, EventRelay, SimulatorLauncher, VentCommandUseCase, VentController,
    VALID_SIMULATION_MODES,
};

pub use cli::{ConsoleCommand, ConsoleLine};

pub use connector::{
    BroadcastPublisher, MockControllerLauncher, MockControllerState, MockOptions,
    MockVentController, TcpControllerConnector, TcpVentClient,
};

pub use domain::{
    ControllerMessage, CscConfig, CscEvent, DomainError, ErrorCode, ExtractionFanTelemetry,
    FanDriveState, GateSelection, Inbound, StateCommand, SummaryState, VentCommand,
    VentGateState, NUM_VENT_GATES,
};
