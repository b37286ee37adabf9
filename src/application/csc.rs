use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::{
    ControllerConnector, ControllerSimulator, EventPublisher, EventRelay, SimulatorLauncher,
    VentCommandUseCase, VentController,
};
use crate::domain::{
    CscConfig, CscEvent, DomainError, ErrorCode, GateSelection, StateCommand, SummaryState,
    VentCommand,
};

/// Supported simulation modes: 0 talks to the real controller, 1 to an
/// in-process mock.
pub const VALID_SIMULATION_MODES: [u8; 2] = [0, 1];

pub const SIMULATION_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone)]
pub struct CscSettings {
    pub config_dir: Option<PathBuf>,
    pub initial_state: SummaryState,
    pub simulation_mode: u8,
}

impl Default for CscSettings {
    fn default() -> Self {
        Self {
            config_dir: None,
            initial_state: SummaryState::Standby,
            simulation_mode: 0,
        }
    }
}

/// AuxTel building CSC: dome vent gates and extraction fan.
///
/// Cloning yields another handle to the same CSC.
#[derive(Clone)]
pub struct AtBuildingCsc {
    inner: Arc<CscInner>,
}

struct CscInner {
    settings: CscSettings,
    connector: Arc<dyn ControllerConnector>,
    launcher: Option<Arc<dyn SimulatorLauncher>>,
    publisher: Arc<dyn EventPublisher>,
    state: Mutex<CscState>,
}

struct CscState {
    summary_state: SummaryState,
    config: Option<CscConfig>,
    controller: Option<Arc<dyn VentController>>,
    simulator: Option<Arc<dyn ControllerSimulator>>,
    relay_task: Option<JoinHandle<()>>,
    /// Bumped on every connect so late notices from an old connection are ignored.
    connection_id: u64,
}

impl AtBuildingCsc {
    pub fn new(
        settings: CscSettings,
        connector: Arc<dyn ControllerConnector>,
        launcher: Option<Arc<dyn SimulatorLauncher>>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self, DomainError> {
        if !VALID_SIMULATION_MODES.contains(&settings.simulation_mode) {
            return Err(DomainError::invalid_input(format!(
                "simulation_mode={} not in {:?}",
                settings.simulation_mode, VALID_SIMULATION_MODES
            )));
        }
        if settings.simulation_mode == 1 && launcher.is_none() {
            return Err(DomainError::invalid_input(
                "simulation_mode=1 needs a mock controller launcher",
            ));
        }
        if settings.initial_state == SummaryState::Fault {
            return Err(DomainError::invalid_input("initial_state cannot be fault"));
        }

        let state = CscState {
            summary_state: settings.initial_state,
            config: None,
            controller: None,
            simulator: None,
            relay_task: None,
            connection_id: 0,
        };

        Ok(Self {
            inner: Arc::new(CscInner {
                settings,
                connector,
                launcher,
                publisher,
                state: Mutex::new(state),
            }),
        })
    }

    /// Publish the initial summary state and, when starting in an active
    /// state, configure and connect as `start` would.
    pub async fn start_up(&self) -> Result<(), DomainError> {
        let mut state = self.inner.state.lock().await;
        info!(
            "ATBuilding CSC starting in {} (simulation_mode={})",
            state.summary_state, self.inner.settings.simulation_mode
        );
        self.publish(CscEvent::SummaryState {
            state: state.summary_state,
        });

        if state.summary_state.is_active() {
            let config = CscConfig::load(self.inner.settings.config_dir.as_deref(), None)?;
            state.config = Some(config);
            self.connect_locked(&mut state).await?;
        }
        Ok(())
    }

    pub async fn summary_state(&self) -> SummaryState {
        self.inner.state.lock().await.summary_state
    }

    pub async fn config(&self) -> Option<CscConfig> {
        self.inner.state.lock().await.config.clone()
    }

    pub fn simulation_mode(&self) -> u8 {
        self.inner.settings.simulation_mode
    }

    pub async fn is_connected(&self) -> bool {
        let state = self.inner.state.lock().await;
        state
            .controller
            .as_ref()
            .is_some_and(|controller| controller.is_connected())
    }

    // ------------------------------------------------------------------
    // Summary state commands
    // ------------------------------------------------------------------

    /// Standby → Disabled: load the configuration and connect.
    pub async fn start(&self, config_override: Option<&str>) -> Result<(), DomainError> {
        let mut state = self.inner.state.lock().await;
        let target = StateCommand::Start.target(state.summary_state)?;

        let config = CscConfig::load(self.inner.settings.config_dir.as_deref(), config_override)?;
        debug!("Configured: {:?}", config);
        state.config = Some(config);

        self.set_state(&mut state, target);
        self.connect_locked(&mut state).await
    }

    pub async fn enable(&self) -> Result<(), DomainError> {
        let mut state = self.inner.state.lock().await;
        let target = StateCommand::Enable.target(state.summary_state)?;
        self.set_state(&mut state, target);
        Ok(())
    }

    pub async fn disable(&self) -> Result<(), DomainError> {
        let mut state = self.inner.state.lock().await;
        let target = StateCommand::Disable.target(state.summary_state)?;
        self.set_state(&mut state, target);
        Ok(())
    }

    /// Disabled or Fault → Standby: drop the connection and any mock controller.
    pub async fn standby(&self) -> Result<(), DomainError> {
        let mut state = self.inner.state.lock().await;
        let target = StateCommand::Standby.target(state.summary_state)?;
        self.disconnect_locked(&mut state).await;
        self.stop_simulator_locked(&mut state).await;
        self.set_state(&mut state, target);
        Ok(())
    }

    pub async fn exit_control(&self) -> Result<(), DomainError> {
        let mut state = self.inner.state.lock().await;
        let target = StateCommand::ExitControl.target(state.summary_state)?;
        self.set_state(&mut state, target);
        Ok(())
    }

    /// Report an error and go to Fault. A CSC already in Fault stays put.
    pub async fn fault(&self, code: ErrorCode, report: &str) {
        let mut state = self.inner.state.lock().await;
        self.fault_locked(&mut state, code, report).await;
    }

    /// Release the connection and mock controller regardless of state.
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;
        self.disconnect_locked(&mut state).await;
        self.stop_simulator_locked(&mut state).await;
    }

    // ------------------------------------------------------------------
    // Vent and fan commands
    // ------------------------------------------------------------------

    pub async fn close_vent_gate(&self, gates: GateSelection) -> Result<(), DomainError> {
        self.run_command(VentCommand::CloseVentGate(gates)).await
    }

    pub async fn open_vent_gate(&self, gates: GateSelection) -> Result<(), DomainError> {
        self.run_command(VentCommand::OpenVentGate(gates)).await
    }

    pub async fn reset_extraction_fan_drive(&self) -> Result<(), DomainError> {
        self.run_command(VentCommand::ResetExtractionFanDrive).await
    }

    pub async fn set_extraction_fan_drive_freq(&self, target_frequency: f64) -> Result<(), DomainError> {
        if !(target_frequency.is_finite() && target_frequency >= 0.0) {
            return Err(DomainError::invalid_input(format!(
                "Invalid target frequency: {}",
                target_frequency
            )));
        }
        self.run_command(VentCommand::SetExtractionFanDriveFreq(target_frequency))
            .await
    }

    pub async fn set_extraction_fan_manual_control_mode(
        &self,
        enable_manual_control_mode: bool,
    ) -> Result<(), DomainError> {
        self.run_command(VentCommand::SetExtractionFanManualControlMode(
            enable_manual_control_mode,
        ))
        .await
    }

    pub async fn start_extraction_fan(&self) -> Result<(), DomainError> {
        self.run_command(VentCommand::StartExtractionFan).await
    }

    pub async fn stop_extraction_fan(&self) -> Result<(), DomainError> {
        self.run_command(VentCommand::StopExtractionFan).await
    }

    async fn run_command(&self, command: VentCommand) -> Result<(), DomainError> {
        let controller = {
            let state = self.inner.state.lock().await;
            assert_enabled(&state, command.name())?;
            state.controller.clone().ok_or(DomainError::NotConnected)?
        };

        VentCommandUseCase::new(controller).execute(command).await
    }

    // ------------------------------------------------------------------
    // Internals; callers hold the state lock.
    // ------------------------------------------------------------------

    fn publish(&self, event: CscEvent) {
        self.inner.publisher.publish(event);
    }

    fn set_state(&self, state: &mut MutexGuard<'_, CscState>, new_state: SummaryState) {
        if state.summary_state == new_state {
            return;
        }
        info!("Summary state: {} -> {}", state.summary_state, new_state);
        state.summary_state = new_state;
        self.publish(CscEvent::SummaryState { state: new_state });
    }

    async fn fault_locked(&self, state: &mut MutexGuard<'_, CscState>, code: ErrorCode, report: &str) {
        if state.summary_state == SummaryState::Fault {
            debug!("Already in fault; ignoring {:?}: {}", code, report);
            return;
        }
        error!("Going to fault ({:?}): {}", code, report);
        self.publish(CscEvent::error_code(code, report));
        self.set_state(state, SummaryState::Fault);
        self.disconnect_locked(state).await;
    }

    async fn connect_locked(&self, state: &mut MutexGuard<'_, CscState>) -> Result<(), DomainError> {
        let mut config = state.config.clone().ok_or(DomainError::NotConfigured)?;
        if state
            .controller
            .as_ref()
            .is_some_and(|controller| controller.is_connected())
        {
            return Err(DomainError::AlreadyConnected);
        }

        if self.inner.settings.simulation_mode == 1 {
            let simulator = match self.ensure_simulator_locked(state).await {
                Ok(simulator) => simulator,
                Err(e) => {
                    let report = format!("Could not start mock controller: {}", e);
                    self.fault_locked(state, ErrorCode::CannotStartMockController, &report)
                        .await;
                    return Err(e);
                }
            };
            if !simulator.is_running() {
                // The mock is not relaunched behind the operator's back.
                let report = "Mock controller is not running";
                self.fault_locked(state, ErrorCode::MockCtrlStartError, report)
                    .await;
                return Err(DomainError::connection(report));
            }
            config.host = SIMULATION_HOST.to_string();
            config.port = simulator.port();
        }

        debug!("Connecting to {}:{}", config.host, config.port);
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let controller = match self.inner.connector.connect(&config, notices_tx).await {
            Ok(controller) => controller,
            Err(e) => {
                let report = format!(
                    "Could not open connection to host={}, port={}: {}",
                    config.host, config.port, e
                );
                self.fault_locked(state, ErrorCode::TcpipConnectError, &report)
                    .await;
                return Err(e);
            }
        };

        state.connection_id += 1;
        let connection_id = state.connection_id;
        let relay = EventRelay::new(self.inner.publisher.clone());
        let csc = self.clone();
        state.relay_task = Some(tokio::spawn(async move {
            if let Some(reason) = relay.run(notices_rx).await {
                csc.handle_connection_lost(connection_id, reason).await;
            }
        }));
        state.controller = Some(controller);

        info!("Connected to vent controller at {}:{}", config.host, config.port);
        Ok(())
    }

    async fn handle_connection_lost(&self, connection_id: u64, reason: String) {
        let mut state = self.inner.state.lock().await;
        if state.connection_id != connection_id {
            debug!("Ignoring loss of stale connection {}", connection_id);
            return;
        }
        // This runs on the relay task; detach it so disconnecting does not abort us.
        state.relay_task.take();

        if state.summary_state.is_active() {
            let report = format!("Lost connection to vent controller: {}", reason);
            self.fault_locked(&mut state, ErrorCode::TcpipReadError, &report)
                .await;
        } else {
            self.disconnect_locked(&mut state).await;
        }
    }

    async fn disconnect_locked(&self, state: &mut MutexGuard<'_, CscState>) {
        if let Some(controller) = state.controller.take() {
            debug!("Disconnecting from vent controller");
            controller.close().await;
        }
        if let Some(task) = state.relay_task.take() {
            task.abort();
        }
    }

    async fn ensure_simulator_locked(
        &self,
        state: &mut MutexGuard<'_, CscState>,
    ) -> Result<Arc<dyn ControllerSimulator>, DomainError> {
        if let Some(simulator) = state.simulator.as_ref() {
            return Ok(simulator.clone());
        }
        let launcher = self
            .inner
            .launcher
            .as_ref()
            .ok_or_else(|| DomainError::internal("No mock controller launcher"))?;
        let simulator = launcher.launch().await?;
        info!("Mock vent controller listening on port {}", simulator.port());
        state.simulator = Some(simulator.clone());
        Ok(simulator)
    }

    async fn stop_simulator_locked(&self, state: &mut MutexGuard<'_, CscState>) {
        if let Some(simulator) = state.simulator.take() {
            debug!("Stopping mock vent controller");
            simulator.close().await;
        }
    }
}

fn assert_enabled(state: &CscState, what: &str) -> Result<(), DomainError> {
    if state.summary_state != SummaryState::Enabled {
        warn!("Rejected {} in state {}", what, state.summary_state);
        return Err(DomainError::invalid_state(
            state.summary_state,
            format!("{} requires the enabled state", what),
        ));
    }
    Ok(())
}
