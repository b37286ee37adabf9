use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::application::{AtBuildingCsc, CscSettings, SimulatorLauncher};
use crate::connector::adapter::{
    BroadcastPublisher, MockControllerLauncher, MockOptions, MockVentController,
    TcpControllerConnector,
};
use crate::domain::{CscEvent, DomainError, SummaryState};

pub struct ContainerConfig {
    pub config_dir: Option<PathBuf>,
    pub initial_state: SummaryState,
    pub simulation_mode: u8,
    /// Options for the mock controller started in simulation mode 1.
    pub mock_options: MockOptions,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            config_dir: None,
            initial_state: SummaryState::Standby,
            simulation_mode: 0,
            mock_options: MockOptions::default(),
        }
    }
}

/// Wires the CSC to its TCP connector, mock launcher and event publisher.
pub struct Container {
    csc: AtBuildingCsc,
    publisher: Arc<BroadcastPublisher>,
    launcher: Arc<MockControllerLauncher>,
}

impl Container {
    pub fn new(config: ContainerConfig) -> Result<Self, DomainError> {
        let publisher = Arc::new(BroadcastPublisher::default());
        let launcher = Arc::new(MockControllerLauncher::new(config.mock_options));

        let simulator: Option<Arc<dyn SimulatorLauncher>> = if config.simulation_mode == 1 {
            debug!("Simulation mode: using the mock vent controller");
            Some(launcher.clone())
        } else {
            None
        };

        let settings = CscSettings {
            config_dir: config.config_dir,
            initial_state: config.initial_state,
            simulation_mode: config.simulation_mode,
        };
        let csc = AtBuildingCsc::new(
            settings,
            Arc::new(TcpControllerConnector::new()),
            simulator,
            publisher.clone(),
        )?;

        Ok(Self {
            csc,
            publisher,
            launcher,
        })
    }

    /// Publish the initial state and connect if starting active.
    ///
    /// Subscribe first to see the initial events. A failed connection leaves
    /// the CSC in fault rather than failing here.
    pub async fn start_up(&self) -> Result<(), DomainError> {
        match self.csc.start_up().await {
            Ok(()) => Ok(()),
            Err(e) if self.csc.summary_state().await == SummaryState::Fault => {
                warn!("CSC started in fault: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn csc(&self) -> &AtBuildingCsc {
        &self.csc
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CscEvent> {
        self.publisher.subscribe()
    }

    /// Release the controller link and mock controller, then drop the
    /// publisher so event subscribers see the stream end.
    pub async fn shutdown(self) {
        self.csc.shutdown().await;
    }

    /// The mock controller of the current simulation session, if any.
    pub async fn mock_controller(&self) -> Option<MockVentController> {
        self.launcher.current().await
    }
}
