use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::tcp_vent_client::controller_codec;
use crate::application::{ControllerSimulator, SimulatorLauncher};
use crate::domain::{
    ControllerMessage, DomainError, FanDriveState, VentCommand, VentGateState,
    DEFAULT_FAN_FREQUENCY, EVT_FAN_DRIVE_FAULT_CODE, EVT_FAN_DRIVE_STATE, EVT_VENT_GATE_STATE,
    NUM_VENT_GATES, TELEMETRY, TEL_EXTRACTION_FAN,
};

/// Number of fault codes the drive remembers.
pub const FAULT_HISTORY_LEN: usize = 8;

/// Fault code the drive reports when nothing has gone wrong.
pub const NO_FAULT_CODE: i64 = 22;

/// Drive output voltage per hertz (230 V at 50 Hz).
pub const VOLTS_PER_HERTZ: f64 = 230.0 / 50.0;

#[derive(Debug, Clone)]
pub struct MockOptions {
    pub host: String,
    /// Time a vent gate takes to reach its commanded position.
    pub gate_delay: Duration,
    /// Period of the status monitor loop.
    pub monitor_interval: Duration,
    /// Telemetry goes out on every n-th monitor iteration.
    pub telemetry_interval: u32,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            gate_delay: Duration::from_secs(1),
            monitor_interval: Duration::from_millis(100),
            telemetry_interval: 10,
        }
    }
}

/// Simulated vent controller hardware state.
#[derive(Debug, Clone, PartialEq)]
pub struct MockControllerState {
    /// Hz; 0.0 is off.
    pub fan_frequency: f64,
    pub vent_states: [VentGateState; NUM_VENT_GATES],
    pub manual_control_mode: bool,
    /// Most recent first.
    pub fault_codes: VecDeque<i64>,
    pub fan_drive_state: FanDriveState,
    pub extraction_fan_drive_was_reset: bool,
    /// Emulates controller firmware without `ping` and drive voltage.
    pub legacy: bool,
}

impl Default for MockControllerState {
    fn default() -> Self {
        Self {
            fan_frequency: 0.0,
            vent_states: [VentGateState::Closed; NUM_VENT_GATES],
            manual_control_mode: true,
            fault_codes: VecDeque::from(vec![NO_FAULT_CODE; FAULT_HISTORY_LEN]),
            fan_drive_state: FanDriveState::Stopped,
            extraction_fan_drive_was_reset: false,
            legacy: false,
        }
    }
}

impl MockControllerState {
    pub fn drive_voltage(&self) -> f64 {
        self.fan_frequency * VOLTS_PER_HERTZ
    }

    pub fn last_fault(&self) -> i64 {
        self.fault_codes.front().copied().unwrap_or(NO_FAULT_CODE)
    }

    fn telemetry(&self) -> serde_json::Value {
        if self.legacy {
            json!({ TEL_EXTRACTION_FAN: self.fan_frequency })
        } else {
            json!({
                TEL_EXTRACTION_FAN: {
                    "drive_frequency": self.fan_frequency,
                    "drive_voltage": self.drive_voltage(),
                }
            })
        }
    }
}

/// TCP server standing in for the Raspberry Pi that drives the vents and fan.
///
/// Serves one client at a time. Cloning yields another handle to the same
/// server.
#[derive(Clone)]
pub struct MockVentController {
    inner: Arc<MockInner>,
}

struct MockInner {
    port: u16,
    options: MockOptions,
    state: Mutex<MockControllerState>,
    shutdown: CancellationToken,
    running: AtomicBool,
    server_task: Mutex<Option<JoinHandle<()>>>,
}

impl MockVentController {
    /// Bind `port` (0 picks a free one) and start serving.
    pub async fn start(port: u16, options: MockOptions) -> Result<Self, DomainError> {
        let listener = TcpListener::bind((options.host.as_str(), port))
            .await
            .map_err(|e| {
                DomainError::connection(format!(
                    "Mock controller cannot listen on {}:{}: {}",
                    options.host, port, e
                ))
            })?;
        let port = listener.local_addr()?.port();
        info!("Mock vent controller listening on {}:{}", options.host, port);

        let controller = Self {
            inner: Arc::new(MockInner {
                port,
                options,
                state: Mutex::new(MockControllerState::default()),
                shutdown: CancellationToken::new(),
                running: AtomicBool::new(true),
                server_task: Mutex::new(None),
            }),
        };

        let server = controller.clone();
        let task = tokio::spawn(async move { server.accept_loop(listener).await });
        *controller.inner.server_task.lock().await = Some(task);

        Ok(controller)
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Stop serving and drop the current client.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        if let Some(task) = self.inner.server_task.lock().await.take() {
            if let Err(e) = task.await {
                debug!("Mock controller task ended abnormally: {}", e);
            }
        }
        self.inner.running.store(false, Ordering::SeqCst);
    }

    pub async fn state(&self) -> MockControllerState {
        self.inner.state.lock().await.clone()
    }

    pub async fn set_vent_states(&self, vent_states: [VentGateState; NUM_VENT_GATES]) {
        self.inner.state.lock().await.vent_states = vent_states;
    }

    pub async fn set_fan_frequency(&self, fan_frequency: f64) {
        self.inner.state.lock().await.fan_frequency = fan_frequency;
    }

    pub async fn set_fan_drive_state(&self, fan_drive_state: FanDriveState) {
        self.inner.state.lock().await.fan_drive_state = fan_drive_state;
    }

    /// Replace the fault history; the first code is the most recent.
    pub async fn set_fault_codes(&self, codes: &[i64]) {
        let mut state = self.inner.state.lock().await;
        state.fault_codes = codes.iter().copied().take(FAULT_HISTORY_LEN).collect();
    }

    /// Record a new drive fault, forgetting the oldest one.
    pub async fn record_fault(&self, code: i64) {
        let mut state = self.inner.state.lock().await;
        state.fault_codes.push_front(code);
        state.fault_codes.truncate(FAULT_HISTORY_LEN);
    }

    /// Behave like controller firmware that predates `ping` and voltage telemetry.
    pub async fn downgrade_to_legacy(&self) {
        self.inner.state.lock().await.legacy = true;
    }

    async fn accept_loop(&self, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    info!("Mock controller: client {} connected", peer);
                    self.serve_client(stream).await;
                    info!("Mock controller: client {} disconnected", peer);
                }
                Err(e) => warn!("Mock controller accept failed: {}", e),
            }
        }
        self.inner.running.store(false, Ordering::SeqCst);
    }

    async fn serve_client(&self, stream: TcpStream) {
        let (mut sink, mut lines) = Framed::new(stream, controller_codec()).split::<String>();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ControllerMessage>();
        let session = self.inner.shutdown.child_token();

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let line = match message.to_line() {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Mock controller cannot encode message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(line).await {
                    debug!("Mock controller write failed: {}", e);
                    break;
                }
            }
        });

        let monitor = {
            let controller = self.clone();
            let outbound = outbound_tx.clone();
            let token = session.clone();
            tokio::spawn(async move { controller.monitor_status(outbound, token).await })
        };

        loop {
            let frame = tokio::select! {
                _ = session.cancelled() => break,
                frame = lines.next() => frame,
            };
            let frame = match frame {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    warn!("Mock controller read failed: {}", e);
                    break;
                }
                None => break,
            };

            let text = String::from_utf8_lossy(&frame);
            let line = text.trim();
            if line.is_empty() {
                continue;
            }
            debug!("Mock controller received: {:?}", line);

            let response = self.dispatch(line).await;
            if outbound_tx.send(response).is_err() {
                break;
            }
        }

        session.cancel();
        if let Err(e) = monitor.await {
            debug!("Mock controller monitor ended abnormally: {}", e);
        }
        drop(outbound_tx);
        if let Err(e) = writer.await {
            debug!("Mock controller writer ended abnormally: {}", e);
        }
    }

    /// Parse and execute one request line, returning the response.
    async fn dispatch(&self, line: &str) -> ControllerMessage {
        let command = match VentCommand::parse_request(line) {
            Ok(command) => command,
            Err(rejection) => {
                debug!("Mock controller rejected {:?}: {}", line, rejection.message());
                return rejection.into_response();
            }
        };

        if command == VentCommand::Ping && self.inner.state.lock().await.legacy {
            return ControllerMessage::failure(command.name(), "NotImplementedError", "No such command");
        }

        self.apply(command).await;
        ControllerMessage::success(command.name())
    }

    async fn apply(&self, command: VentCommand) {
        let mut state = self.inner.state.lock().await;
        match command {
            VentCommand::CloseVentGate(gates) => {
                for gate in gates.gates() {
                    if state.vent_states[gate] != VentGateState::Closed {
                        self.move_gate(gate, VentGateState::Closed);
                    }
                }
            }
            VentCommand::OpenVentGate(gates) => {
                for gate in gates.gates() {
                    if state.vent_states[gate] != VentGateState::Opened {
                        self.move_gate(gate, VentGateState::Opened);
                    }
                }
            }
            VentCommand::ResetExtractionFanDrive => state.extraction_fan_drive_was_reset = true,
            VentCommand::SetExtractionFanDriveFreq(frequency) => state.fan_frequency = frequency,
            VentCommand::SetExtractionFanManualControlMode(enable) => {
                state.manual_control_mode = enable
            }
            VentCommand::StartExtractionFan => state.fan_frequency = DEFAULT_FAN_FREQUENCY,
            VentCommand::StopExtractionFan => state.fan_frequency = 0.0,
            VentCommand::Ping => {}
        }
    }

    /// Move a gate after the configured travel time.
    fn move_gate(&self, gate: usize, target: VentGateState) {
        let controller = self.clone();
        let delay = self.inner.options.gate_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = controller.inner.shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    controller.inner.state.lock().await.vent_states[gate] = target;
                    debug!("Mock controller: gate {} now {:?}", gate, target);
                }
            }
        });
    }

    /// Report state changes and periodic telemetry to the connected client.
    async fn monitor_status(
        &self,
        outbound: mpsc::UnboundedSender<ControllerMessage>,
        token: CancellationToken,
    ) {
        let mut vent_states = None;
        let mut fan_drive_state = None;
        let mut last_fault = None;
        let mut telemetry_countdown = 0u32;

        loop {
            let snapshot = self.state().await;
            let mut messages = Vec::new();

            if vent_states != Some(snapshot.vent_states) {
                debug!("Vent state changed: {:?} -> {:?}", vent_states, snapshot.vent_states);
                let codes: Vec<i32> = snapshot.vent_states.iter().map(|s| s.code()).collect();
                messages.push(ControllerMessage::with_data(EVT_VENT_GATE_STATE, json!(codes)));
                vent_states = Some(snapshot.vent_states);
            }

            if fan_drive_state != Some(snapshot.fan_drive_state) {
                debug!(
                    "Fan drive state changed: {:?} -> {:?}",
                    fan_drive_state, snapshot.fan_drive_state
                );
                messages.push(ControllerMessage::with_data(
                    EVT_FAN_DRIVE_STATE,
                    json!(snapshot.fan_drive_state.code()),
                ));
                fan_drive_state = Some(snapshot.fan_drive_state);
            }

            let fault = snapshot.last_fault();
            if last_fault != Some(fault) {
                debug!("Last fault changed: {:?} -> {}", last_fault, fault);
                messages.push(ControllerMessage::with_data(EVT_FAN_DRIVE_FAULT_CODE, json!(fault)));
                last_fault = Some(fault);
            }

            if telemetry_countdown == 0 {
                messages.push(ControllerMessage::with_data(TELEMETRY, snapshot.telemetry()));
                telemetry_countdown = self.inner.options.telemetry_interval.saturating_sub(1);
            } else {
                telemetry_countdown -= 1;
            }

            for message in messages {
                if outbound.send(message).is_err() {
                    return;
                }
            }

            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(self.inner.options.monitor_interval) => {}
            }
        }
    }
}

#[async_trait]
impl ControllerSimulator for MockVentController {
    fn port(&self) -> u16 {
        MockVentController::port(self)
    }

    fn is_running(&self) -> bool {
        MockVentController::is_running(self)
    }

    async fn close(&self) {
        MockVentController::close(self).await
    }
}

/// Starts a [`MockVentController`] on a free local port for simulation mode.
pub struct MockControllerLauncher {
    options: MockOptions,
    current: Mutex<Option<MockVentController>>,
}

impl MockControllerLauncher {
    pub fn new(options: MockOptions) -> Self {
        Self {
            options,
            current: Mutex::new(None),
        }
    }

    /// The most recently launched mock controller.
    pub async fn current(&self) -> Option<MockVentController> {
        self.current.lock().await.clone()
    }
}

impl Default for MockControllerLauncher {
    fn default() -> Self {
        Self::new(MockOptions::default())
    }
}

#[async_trait]
impl SimulatorLauncher for MockControllerLauncher {
    async fn launch(&self) -> Result<Arc<dyn ControllerSimulator>, DomainError> {
        let controller = MockVentController::start(0, self.options.clone()).await?;
        *self.current.lock().await = Some(controller.clone());
        Ok(Arc::new(controller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GateSelection;

    fn fast_options() -> MockOptions {
        MockOptions {
            gate_delay: Duration::ZERO,
            monitor_interval: Duration::from_millis(10),
            ..MockOptions::default()
        }
    }

    async fn wait_for<F>(controller: &MockVentController, predicate: F)
    where
        F: Fn(&MockControllerState) -> bool,
    {
        for _ in 0..200 {
            if predicate(&controller.state().await) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("mock controller never reached the expected state");
    }

    #[test]
    fn test_default_state() {
        let state = MockControllerState::default();
        assert_eq!(state.vent_states, [VentGateState::Closed; NUM_VENT_GATES]);
        assert_eq!(state.last_fault(), NO_FAULT_CODE);
        assert_eq!(state.fault_codes.len(), FAULT_HISTORY_LEN);
        assert!(state.manual_control_mode);
    }

    #[test]
    fn test_legacy_telemetry_is_scalar() {
        let mut state = MockControllerState {
            fan_frequency: 10.0,
            ..MockControllerState::default()
        };
        assert_eq!(
            state.telemetry()[TEL_EXTRACTION_FAN]["drive_voltage"],
            json!(10.0 * VOLTS_PER_HERTZ)
        );
        state.legacy = true;
        assert_eq!(state.telemetry()[TEL_EXTRACTION_FAN], json!(10.0));
    }

    #[tokio::test]
    async fn test_dispatch_updates_state() {
        let controller = MockVentController::start(0, fast_options()).await.unwrap();

        let response = controller.dispatch("set_extraction_fan_drive_freq 12.5").await;
        assert!(!response.is_error());
        assert_eq!(controller.state().await.fan_frequency, 12.5);

        controller.dispatch("start_extraction_fan").await;
        assert_eq!(controller.state().await.fan_frequency, DEFAULT_FAN_FREQUENCY);

        controller.dispatch("set_extraction_fan_manual_control_mode False").await;
        assert!(!controller.state().await.manual_control_mode);

        controller.dispatch("reset_extraction_fan_drive").await;
        assert!(controller.state().await.extraction_fan_drive_was_reset);

        controller.close().await;
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn test_dispatch_errors() {
        let controller = MockVentController::start(0, fast_options()).await.unwrap();

        let unknown = controller.dispatch("self_destruct").await;
        assert_eq!(unknown.exception_name, "NotImplementedError");

        let arity = controller.dispatch("stop_extraction_fan now").await;
        assert_eq!(arity.exception_name, "TypeError");

        let gate = controller.dispatch("open_vent_gate 0 1 2 4").await;
        assert_eq!(gate.exception_name, "ValueError");

        controller.close().await;
    }

    #[tokio::test]
    async fn test_gates_move_after_delay() {
        let controller = MockVentController::start(0, fast_options()).await.unwrap();

        controller
            .apply(VentCommand::OpenVentGate(GateSelection::new([1, 3, -1, -1]).unwrap()))
            .await;
        wait_for(&controller, |s| {
            s.vent_states
                == [
                    VentGateState::Closed,
                    VentGateState::Opened,
                    VentGateState::Closed,
                    VentGateState::Opened,
                ]
        })
        .await;

        controller.apply(VentCommand::CloseVentGate(GateSelection::all())).await;
        wait_for(&controller, |s| {
            s.vent_states == [VentGateState::Closed; NUM_VENT_GATES]
        })
        .await;

        controller.close().await;
    }

    #[tokio::test]
    async fn test_legacy_controller_lacks_ping() {
        let controller = MockVentController::start(0, fast_options()).await.unwrap();
        assert!(!controller.dispatch("ping").await.is_error());

        controller.downgrade_to_legacy().await;
        let response = controller.dispatch("ping").await;
        assert_eq!(response.exception_name, "NotImplementedError");

        controller.close().await;
    }

    #[tokio::test]
    async fn test_fault_history_is_bounded() {
        let controller = MockVentController::start(0, fast_options()).await.unwrap();

        for code in 0..20 {
            controller.record_fault(code).await;
        }
        let state = controller.state().await;
        assert_eq!(state.fault_codes.len(), FAULT_HISTORY_LEN);
        assert_eq!(state.last_fault(), 19);

        controller.set_fault_codes(&[123; 10]).await;
        assert_eq!(controller.state().await.fault_codes.len(), FAULT_HISTORY_LEN);

        controller.close().await;
    }
}
