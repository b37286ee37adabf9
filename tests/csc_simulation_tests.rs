//! End-to-end tests of the CSC in simulation mode.
//!
//! Each test runs the CSC against the mock vent controller over loopback
//! TCP and observes it through published events, as a remote would.

use std::time::Duration;

use tokio::sync::broadcast;

use atbuilding::connector::api::{Container, ContainerConfig};
use atbuilding::{
    CscEvent, ErrorCode, ExtractionFanTelemetry, FanDriveState, GateSelection, MockOptions,
    MockVentController, SummaryState, VentGateState, NUM_VENT_GATES,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn fast_mock() -> MockOptions {
    MockOptions {
        gate_delay: Duration::from_millis(50),
        monitor_interval: Duration::from_millis(10),
        ..MockOptions::default()
    }
}

async fn make_csc(initial_state: SummaryState) -> (Container, broadcast::Receiver<CscEvent>) {
    let container = Container::new(ContainerConfig {
        initial_state,
        simulation_mode: 1,
        mock_options: fast_mock(),
        ..ContainerConfig::default()
    })
    .expect("Failed to build CSC");
    let events = container.subscribe();
    container.start_up().await.expect("Failed to start CSC");
    (container, events)
}

async fn mock_of(container: &Container) -> MockVentController {
    container
        .mock_controller()
        .await
        .expect("Mock controller should be running")
}

/// Wait for the first event `select` accepts.
async fn next_matching<T, F>(events: &mut broadcast::Receiver<CscEvent>, mut select: F) -> T
where
    F: FnMut(&CscEvent) -> Option<T>,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(found) = select(&event) {
                        return found;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("Event stream closed"),
            }
        }
    };
    tokio::time::timeout(EVENT_TIMEOUT, wait)
        .await
        .expect("Timed out waiting for event")
}

async fn expect_vent_state(
    events: &mut broadcast::Receiver<CscEvent>,
    expected: [VentGateState; NUM_VENT_GATES],
) {
    next_matching(events, |event| match event {
        CscEvent::VentGateState { state } if *state == expected => Some(()),
        _ => None,
    })
    .await
}

async fn expect_summary_state(events: &mut broadcast::Receiver<CscEvent>, expected: SummaryState) {
    next_matching(events, |event| match event {
        CscEvent::SummaryState { state } if *state == expected => Some(()),
        _ => None,
    })
    .await
}

async fn next_telemetry(events: &mut broadcast::Receiver<CscEvent>) -> ExtractionFanTelemetry {
    next_matching(events, |event| match event {
        CscEvent::ExtractionFan(telemetry) => Some(*telemetry),
        _ => None,
    })
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_open_one_vent() {
    let (container, mut events) = make_csc(SummaryState::Enabled).await;
    expect_vent_state(&mut events, [VentGateState::Closed; NUM_VENT_GATES]).await;

    container
        .csc()
        .open_vent_gate(GateSelection::new([0, -1, -1, -1]).unwrap())
        .await
        .expect("openVentGate failed");

    expect_vent_state(
        &mut events,
        [
            VentGateState::Opened,
            VentGateState::Closed,
            VentGateState::Closed,
            VentGateState::Closed,
        ],
    )
    .await;
    container.csc().shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_open_vents() {
    let (container, mut events) = make_csc(SummaryState::Enabled).await;
    expect_vent_state(&mut events, [VentGateState::Closed; NUM_VENT_GATES]).await;

    container
        .csc()
        .open_vent_gate(GateSelection::all())
        .await
        .expect("openVentGate failed");

    expect_vent_state(&mut events, [VentGateState::Opened; NUM_VENT_GATES]).await;
    container.csc().shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_one_vent() {
    let (container, mut events) = make_csc(SummaryState::Enabled).await;
    mock_of(&container)
        .await
        .set_vent_states([VentGateState::Opened; NUM_VENT_GATES])
        .await;
    expect_vent_state(&mut events, [VentGateState::Opened; NUM_VENT_GATES]).await;

    container
        .csc()
        .close_vent_gate(GateSelection::single(0).unwrap())
        .await
        .expect("closeVentGate failed");

    expect_vent_state(
        &mut events,
        [
            VentGateState::Closed,
            VentGateState::Opened,
            VentGateState::Opened,
            VentGateState::Opened,
        ],
    )
    .await;
    container.csc().shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_vents() {
    let (container, mut events) = make_csc(SummaryState::Enabled).await;
    mock_of(&container)
        .await
        .set_vent_states([VentGateState::Opened; NUM_VENT_GATES])
        .await;
    expect_vent_state(&mut events, [VentGateState::Opened; NUM_VENT_GATES]).await;

    container
        .csc()
        .close_vent_gate(GateSelection::all())
        .await
        .expect("closeVentGate failed");

    expect_vent_state(&mut events, [VentGateState::Closed; NUM_VENT_GATES]).await;
    container.csc().shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reset_extraction_fan_drive() {
    let (container, _events) = make_csc(SummaryState::Enabled).await;
    let mock = mock_of(&container).await;
    assert!(!mock.state().await.extraction_fan_drive_was_reset);

    container
        .csc()
        .reset_extraction_fan_drive()
        .await
        .expect("resetExtractionFanDrive failed");

    assert!(mock.state().await.extraction_fan_drive_was_reset);
    container.csc().shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_set_extraction_fan_drive_freq() {
    let (container, _events) = make_csc(SummaryState::Enabled).await;
    let mock = mock_of(&container).await;

    container
        .csc()
        .set_extraction_fan_drive_freq(12.5)
        .await
        .expect("setExtractionFanDriveFreq failed");

    assert!((mock.state().await.fan_frequency - 12.5).abs() < 1e-9);
    container.csc().shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_set_extraction_fan_manual_control_mode() {
    let (container, _events) = make_csc(SummaryState::Enabled).await;
    let mock = mock_of(&container).await;

    container
        .csc()
        .set_extraction_fan_manual_control_mode(false)
        .await
        .unwrap();
    assert!(!mock.state().await.manual_control_mode);

    container
        .csc()
        .set_extraction_fan_manual_control_mode(true)
        .await
        .unwrap();
    assert!(mock.state().await.manual_control_mode);
    container.csc().shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_and_stop_extraction_fan() {
    let (container, _events) = make_csc(SummaryState::Enabled).await;
    let mock = mock_of(&container).await;

    mock.set_fan_frequency(0.0).await;
    container.csc().start_extraction_fan().await.unwrap();
    assert!((mock.state().await.fan_frequency - 50.0).abs() < 1e-9);

    container.csc().stop_extraction_fan().await.unwrap();
    assert_eq!(mock.state().await.fan_frequency, 0.0);
    container.csc().shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_telemetry() {
    let (container, mut events) = make_csc(SummaryState::Enabled).await;
    let mock = mock_of(&container).await;

    let telemetry = next_telemetry(&mut events).await;
    assert_eq!(telemetry.drive_frequency, 0.0);
    assert_eq!(telemetry.drive_voltage, Some(0.0));

    mock.set_fan_frequency(10.0).await;
    let expected_voltage = mock.state().await.drive_voltage();
    let telemetry = next_matching(&mut events, |event| match event {
        CscEvent::ExtractionFan(t) if t.drive_frequency == 10.0 => Some(*t),
        _ => None,
    })
    .await;
    let voltage = telemetry.drive_voltage.expect("drive voltage missing");
    assert!((voltage - expected_voltage).abs() < 0.01);
    container.csc().shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_legacy_controller_telemetry() {
    let (container, mut events) = make_csc(SummaryState::Disabled).await;
    expect_summary_state(&mut events, SummaryState::Disabled).await;

    mock_of(&container).await.downgrade_to_legacy().await;
    container.csc().enable().await.unwrap();
    expect_summary_state(&mut events, SummaryState::Enabled).await;

    let telemetry = next_matching(&mut events, |event| match event {
        CscEvent::ExtractionFan(t) if t.drive_voltage.is_none() => Some(*t),
        _ => None,
    })
    .await;
    assert_eq!(telemetry.drive_frequency, 0.0);

    mock_of(&container).await.set_fan_frequency(10.0).await;
    next_matching(&mut events, |event| match event {
        CscEvent::ExtractionFan(t) if t.drive_frequency == 10.0 && t.drive_voltage.is_none() => {
            Some(())
        }
        _ => None,
    })
    .await;
    container.csc().shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_drive_fault_code() {
    let (container, mut events) = make_csc(SummaryState::Enabled).await;
    let fault_code = |expected: i64| {
        move |event: &CscEvent| match event {
            CscEvent::ExtractionFanDriveFaultCode { fault_code } if *fault_code == expected => {
                Some(())
            }
            _ => None,
        }
    };

    next_matching(&mut events, fault_code(22)).await;
    mock_of(&container).await.set_fault_codes(&[123; 8]).await;
    next_matching(&mut events, fault_code(123)).await;
    container.csc().shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_drive_state() {
    let (container, mut events) = make_csc(SummaryState::Enabled).await;
    let drive_state = |expected: FanDriveState| {
        move |event: &CscEvent| match event {
            CscEvent::ExtractionFanDriveState { state } if *state == expected => Some(()),
            _ => None,
        }
    };

    next_matching(&mut events, drive_state(FanDriveState::Stopped)).await;
    mock_of(&container)
        .await
        .set_fan_drive_state(FanDriveState::Operating)
        .await;
    next_matching(&mut events, drive_state(FanDriveState::Operating)).await;
    container.csc().shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_commands_rejected_unless_enabled() {
    let (container, _events) = make_csc(SummaryState::Disabled).await;

    let err = container
        .csc()
        .start_extraction_fan()
        .await
        .expect_err("Command should be rejected while disabled");
    assert!(err.is_invalid_state());
    assert_eq!(mock_of(&container).await.state().await.fan_frequency, 0.0);
    container.csc().shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_from_standby_launches_mock() {
    let (container, mut events) = make_csc(SummaryState::Standby).await;
    expect_summary_state(&mut events, SummaryState::Standby).await;
    assert!(container.mock_controller().await.is_none());

    container.csc().start(None).await.unwrap();
    expect_summary_state(&mut events, SummaryState::Disabled).await;
    assert!(container.csc().is_connected().await);

    let mock = mock_of(&container).await;
    assert!(mock.is_running());

    container.csc().standby().await.unwrap();
    expect_summary_state(&mut events, SummaryState::Standby).await;
    assert!(!mock.is_running());
    assert!(!container.csc().is_connected().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_lost_controller_goes_to_fault() {
    let (container, mut events) = make_csc(SummaryState::Enabled).await;
    expect_vent_state(&mut events, [VentGateState::Closed; NUM_VENT_GATES]).await;

    mock_of(&container).await.close().await;

    let code = next_matching(&mut events, |event| match event {
        CscEvent::ErrorCode { code, .. } => Some(*code),
        _ => None,
    })
    .await;
    assert_eq!(code, ErrorCode::TcpipReadError);
    expect_summary_state(&mut events, SummaryState::Fault).await;

    container.csc().standby().await.unwrap();
    assert_eq!(container.csc().summary_state().await, SummaryState::Standby);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_controller_goes_to_fault() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("_init.toml"),
        format!("host = \"127.0.0.1\"\nport = {}\nconnection_timeout = 1.0\n", port),
    )
    .unwrap();

    let container = Container::new(ContainerConfig {
        config_dir: Some(dir.path().to_path_buf()),
        ..ContainerConfig::default()
    })
    .unwrap();
    let mut events = container.subscribe();
    container.start_up().await.unwrap();

    assert!(container.csc().start(None).await.is_err());

    let code = next_matching(&mut events, |event| match event {
        CscEvent::ErrorCode { code, .. } => Some(*code),
        _ => None,
    })
    .await;
    assert_eq!(code, ErrorCode::TcpipConnectError);
    assert_eq!(container.csc().summary_state().await, SummaryState::Fault);
    assert_eq!(container.csc().config().await.unwrap().port, port);
}
