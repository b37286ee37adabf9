//! Wire format spoken with the vent controller.
//!
//! Requests are whitespace separated ASCII lines terminated by `\r`
//! (`"open_vent_gate 0 -1 -1 -1\r\n"`). Every controller message is a
//! single JSON object per line: either the response to the last request or
//! an unsolicited event/telemetry message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    CscEvent, ExtractionFanTelemetry, FanDriveState, GateSelection, VentGateState,
    NUM_VENT_GATES,
};
use crate::domain::DomainError;

pub const REQUEST_TERMINATOR: &str = "\r\n";

pub const EVT_VENT_GATE_STATE: &str = "evt_vent_gate_state";
pub const EVT_FAN_DRIVE_STATE: &str = "evt_extraction_fan_drive_state";
pub const EVT_FAN_DRIVE_FAULT_CODE: &str = "evt_extraction_fan_drive_fault_code";
pub const TELEMETRY: &str = "telemetry";
pub const TEL_EXTRACTION_FAN: &str = "tel_extraction_fan";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Int,
    Float,
    Bool,
}

/// Commands understood by the vent controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VentCommand {
    CloseVentGate(GateSelection),
    OpenVentGate(GateSelection),
    ResetExtractionFanDrive,
    SetExtractionFanDriveFreq(f64),
    SetExtractionFanManualControlMode(bool),
    StartExtractionFan,
    StopExtractionFan,
    Ping,
}

impl VentCommand {
    pub fn name(&self) -> &'static str {
        match self {
            VentCommand::CloseVentGate(_) => "close_vent_gate",
            VentCommand::OpenVentGate(_) => "open_vent_gate",
            VentCommand::ResetExtractionFanDrive => "reset_extraction_fan_drive",
            VentCommand::SetExtractionFanDriveFreq(_) => "set_extraction_fan_drive_freq",
            VentCommand::SetExtractionFanManualControlMode(_) => {
                "set_extraction_fan_manual_control_mode"
            }
            VentCommand::StartExtractionFan => "start_extraction_fan",
            VentCommand::StopExtractionFan => "stop_extraction_fan",
            VentCommand::Ping => "ping",
        }
    }

    /// Argument signature of a wire command, `None` if the name is unknown.
    pub fn signature(name: &str) -> Option<&'static [ArgType]> {
        const GATES: &[ArgType] = &[ArgType::Int, ArgType::Int, ArgType::Int, ArgType::Int];
        match name {
            "close_vent_gate" | "open_vent_gate" => Some(GATES),
            "set_extraction_fan_drive_freq" => Some(&[ArgType::Float]),
            "set_extraction_fan_manual_control_mode" => Some(&[ArgType::Bool]),
            "reset_extraction_fan_drive" | "start_extraction_fan" | "stop_extraction_fan"
            | "ping" => Some(&[]),
            _ => None,
        }
    }

    /// Request line, without terminator.
    pub fn to_line(&self) -> String {
        match self {
            VentCommand::CloseVentGate(gates) | VentCommand::OpenVentGate(gates) => {
                let [a, b, c, d] = gates.slots();
                format!("{} {} {} {} {}", self.name(), a, b, c, d)
            }
            VentCommand::SetExtractionFanDriveFreq(freq) => format!("{} {}", self.name(), freq),
            VentCommand::SetExtractionFanManualControlMode(enable) => {
                format!("{} {}", self.name(), if *enable { "True" } else { "False" })
            }
            _ => self.name().to_string(),
        }
    }

    /// Decode a request line as received by a controller.
    pub fn parse_request(line: &str) -> Result<Self, RequestRejection> {
        let mut tokens = line.split_whitespace();
        let command = tokens.next().ok_or(RequestRejection::Empty)?;
        let args: Vec<&str> = tokens.collect();

        let signature = Self::signature(command)
            .ok_or_else(|| RequestRejection::UnknownCommand(command.to_string()))?;
        if signature.len() != args.len() {
            return Err(RequestRejection::WrongArgumentCount {
                command: command.to_string(),
                expected: signature.len(),
                got: args.len(),
            });
        }

        let bad_value = |e: DomainError| RequestRejection::BadValue {
            command: command.to_string(),
            message: e.to_string(),
        };

        let decoded = match command {
            "close_vent_gate" | "open_vent_gate" => {
                let mut slots = [0i32; NUM_VENT_GATES];
                for (slot, arg) in slots.iter_mut().zip(&args) {
                    *slot = parse_int(arg).map_err(bad_value)?;
                }
                let gates = GateSelection::new(slots).map_err(bad_value)?;
                if command == "close_vent_gate" {
                    VentCommand::CloseVentGate(gates)
                } else {
                    VentCommand::OpenVentGate(gates)
                }
            }
            "set_extraction_fan_drive_freq" => {
                VentCommand::SetExtractionFanDriveFreq(parse_float(args[0]).map_err(bad_value)?)
            }
            "set_extraction_fan_manual_control_mode" => {
                VentCommand::SetExtractionFanManualControlMode(
                    parse_bool(args[0]).map_err(bad_value)?,
                )
            }
            "reset_extraction_fan_drive" => VentCommand::ResetExtractionFanDrive,
            "start_extraction_fan" => VentCommand::StartExtractionFan,
            "stop_extraction_fan" => VentCommand::StopExtractionFan,
            _ => VentCommand::Ping,
        };

        Ok(decoded)
    }
}

/// Why a controller refused a request line.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestRejection {
    Empty,
    UnknownCommand(String),
    WrongArgumentCount {
        command: String,
        expected: usize,
        got: usize,
    },
    BadValue {
        command: String,
        message: String,
    },
}

impl RequestRejection {
    pub fn command(&self) -> &str {
        match self {
            RequestRejection::Empty => "",
            RequestRejection::UnknownCommand(command)
            | RequestRejection::WrongArgumentCount { command, .. }
            | RequestRejection::BadValue { command, .. } => command,
        }
    }

    pub fn exception_name(&self) -> &'static str {
        match self {
            RequestRejection::Empty | RequestRejection::UnknownCommand(_) => "NotImplementedError",
            RequestRejection::WrongArgumentCount { .. } => "TypeError",
            RequestRejection::BadValue { .. } => "ValueError",
        }
    }

    pub fn message(&self) -> String {
        match self {
            RequestRejection::Empty | RequestRejection::UnknownCommand(_) => {
                "No such command".to_string()
            }
            RequestRejection::WrongArgumentCount { command, .. } => {
                format!("Error while handling command {}.", command)
            }
            RequestRejection::BadValue { message, .. } => message.clone(),
        }
    }

    pub fn into_response(self) -> ControllerMessage {
        ControllerMessage::failure(self.command(), self.exception_name(), self.message())
    }
}

pub fn parse_int(arg: &str) -> Result<i32, DomainError> {
    arg.parse::<i32>()
        .map_err(|_| DomainError::invalid_input(format!("Expected an integer, got {:?}", arg)))
}

pub fn parse_float(arg: &str) -> Result<f64, DomainError> {
    let value = arg
        .parse::<f64>()
        .map_err(|_| DomainError::invalid_input(format!("Expected a number, got {:?}", arg)))?;
    if !value.is_finite() {
        return Err(DomainError::invalid_input(format!(
            "Expected a finite number, got {:?}",
            arg
        )));
    }
    Ok(value)
}

pub fn parse_bool(arg: &str) -> Result<bool, DomainError> {
    match arg.to_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(DomainError::invalid_input(format!(
            "Expected a boolean, got {:?}",
            arg
        ))),
    }
}

/// One JSON line sent by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerMessage {
    pub command: String,
    pub error: i32,
    #[serde(default)]
    pub exception_name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub traceback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A controller message sorted by what the receiver must do with it.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response(ControllerMessage),
    Event(CscEvent),
}

impl ControllerMessage {
    pub fn success(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            error: 0,
            exception_name: String::new(),
            message: String::new(),
            traceback: String::new(),
            data: None,
        }
    }

    pub fn failure(
        command: impl Into<String>,
        exception_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: 1,
            exception_name: exception_name.into(),
            message: message.into(),
            ..Self::success(command)
        }
    }

    pub fn with_data(command: impl Into<String>, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::success(command)
        }
    }

    pub fn parse(line: &str) -> Result<Self, DomainError> {
        serde_json::from_str(line.trim())
            .map_err(|e| DomainError::protocol(format!("Malformed controller message: {}", e)))
    }

    pub fn to_line(&self) -> Result<String, DomainError> {
        serde_json::to_string(self)
            .map_err(|e| DomainError::internal(format!("Failed to encode message: {}", e)))
    }

    pub fn is_error(&self) -> bool {
        self.error != 0
    }

    pub fn into_inbound(self) -> Result<Inbound, DomainError> {
        let event = match self.command.as_str() {
            EVT_VENT_GATE_STATE => {
                let codes = self.data_array()?;
                if codes.len() != NUM_VENT_GATES {
                    return Err(DomainError::protocol(format!(
                        "Expected {} vent gate states, got {}",
                        NUM_VENT_GATES,
                        codes.len()
                    )));
                }
                let mut state = [VentGateState::Closed; NUM_VENT_GATES];
                for (slot, code) in state.iter_mut().zip(codes) {
                    *slot = VentGateState::from_code(as_int(code)?)?;
                }
                CscEvent::VentGateState { state }
            }
            EVT_FAN_DRIVE_STATE => CscEvent::ExtractionFanDriveState {
                state: FanDriveState::from_code(as_int(self.data_value()?)?)?,
            },
            EVT_FAN_DRIVE_FAULT_CODE => CscEvent::ExtractionFanDriveFaultCode {
                fault_code: as_int(self.data_value()?)?,
            },
            TELEMETRY => CscEvent::ExtractionFan(self.fan_telemetry()?),
            _ => return Ok(Inbound::Response(self)),
        };
        Ok(Inbound::Event(event))
    }

    fn data_value(&self) -> Result<&Value, DomainError> {
        self.data
            .as_ref()
            .ok_or_else(|| DomainError::protocol(format!("{} carries no data", self.command)))
    }

    fn data_array(&self) -> Result<&Vec<Value>, DomainError> {
        self.data_value()?
            .as_array()
            .ok_or_else(|| DomainError::protocol(format!("{} data is not a list", self.command)))
    }

    fn fan_telemetry(&self) -> Result<ExtractionFanTelemetry, DomainError> {
        let fan = self.data_value()?.get(TEL_EXTRACTION_FAN).ok_or_else(|| {
            DomainError::protocol(format!("telemetry lacks {}", TEL_EXTRACTION_FAN))
        })?;

        // Legacy controllers send the bare drive frequency.
        if let Some(drive_frequency) = fan.as_f64() {
            return Ok(ExtractionFanTelemetry {
                drive_frequency,
                drive_voltage: None,
            });
        }

        let drive_frequency = fan
            .get("drive_frequency")
            .and_then(Value::as_f64)
            .ok_or_else(|| DomainError::protocol("telemetry lacks drive_frequency"))?;
        let drive_voltage = fan.get("drive_voltage").and_then(Value::as_f64);

        Ok(ExtractionFanTelemetry {
            drive_frequency,
            drive_voltage,
        })
    }
}

fn as_int(value: &Value) -> Result<i64, DomainError> {
    value
        .as_i64()
        .ok_or_else(|| DomainError::protocol(format!("Expected an integer, got {}", value)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_lines() {
        let open = VentCommand::OpenVentGate(GateSelection::new([0, -1, -1, -1]).unwrap());
        assert_eq!(open.to_line(), "open_vent_gate 0 -1 -1 -1");
        assert_eq!(
            VentCommand::SetExtractionFanManualControlMode(false).to_line(),
            "set_extraction_fan_manual_control_mode False"
        );
        assert_eq!(
            VentCommand::SetExtractionFanDriveFreq(12.5).to_line(),
            "set_extraction_fan_drive_freq 12.5"
        );
        assert_eq!(VentCommand::StopExtractionFan.to_line(), "stop_extraction_fan");
    }

    #[test]
    fn test_parse_request_accepts_encoded_commands() {
        let cmd = VentCommand::SetExtractionFanManualControlMode(true);
        assert_eq!(VentCommand::parse_request(&cmd.to_line()).unwrap(), cmd);

        let gates = VentCommand::parse_request("  close_vent_gate 3 2 -1 -1 ").unwrap();
        assert_eq!(
            gates,
            VentCommand::CloseVentGate(GateSelection::new([3, 2, -1, -1]).unwrap())
        );
    }

    #[test]
    fn test_parse_request_rejections() {
        let unknown = VentCommand::parse_request("launch_rocket").unwrap_err();
        assert_eq!(unknown.exception_name(), "NotImplementedError");
        assert_eq!(unknown.message(), "No such command");

        let count = VentCommand::parse_request("open_vent_gate 1 2").unwrap_err();
        assert_eq!(count.exception_name(), "TypeError");

        let range = VentCommand::parse_request("open_vent_gate 9 -1 -1 -1").unwrap_err();
        assert_eq!(range.exception_name(), "ValueError");
        assert!(range.message().contains("Invalid gate number"));

        let freq = VentCommand::parse_request("set_extraction_fan_drive_freq fast").unwrap_err();
        assert_eq!(freq.exception_name(), "ValueError");

        let response = count.into_response();
        assert_eq!(response.command, "open_vent_gate");
        assert!(response.is_error());
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("True").unwrap());
        assert!(parse_bool("1").unwrap());
        assert!(!parse_bool("false").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_response_is_not_an_event() {
        let msg = ControllerMessage::parse(
            r#"{"command": "ping", "error": 0, "exception_name": "", "message": "", "traceback": ""}"#,
        )
        .unwrap();
        assert!(matches!(msg.into_inbound().unwrap(), Inbound::Response(_)));
    }

    #[test]
    fn test_vent_gate_event() {
        let msg = ControllerMessage::with_data(EVT_VENT_GATE_STATE, json!([2, 0, 0, 1]));
        let inbound = msg.into_inbound().unwrap();
        assert_eq!(
            inbound,
            Inbound::Event(CscEvent::VentGateState {
                state: [
                    VentGateState::Opened,
                    VentGateState::Closed,
                    VentGateState::Closed,
                    VentGateState::PartiallyOpen
                ]
            })
        );
    }

    #[test]
    fn test_vent_gate_event_wrong_length() {
        let msg = ControllerMessage::with_data(EVT_VENT_GATE_STATE, json!([0, 0]));
        assert!(msg.into_inbound().is_err());
    }

    #[test]
    fn test_fault_code_and_drive_state_events() {
        let fault = ControllerMessage::with_data(EVT_FAN_DRIVE_FAULT_CODE, json!(123));
        assert_eq!(
            fault.into_inbound().unwrap(),
            Inbound::Event(CscEvent::ExtractionFanDriveFaultCode { fault_code: 123 })
        );

        let drive = ControllerMessage::with_data(EVT_FAN_DRIVE_STATE, json!(1));
        assert_eq!(
            drive.into_inbound().unwrap(),
            Inbound::Event(CscEvent::ExtractionFanDriveState {
                state: FanDriveState::Operating
            })
        );
    }

    #[test]
    fn test_legacy_and_current_telemetry() {
        let legacy = ControllerMessage::with_data(TELEMETRY, json!({"tel_extraction_fan": 10.0}));
        assert_eq!(
            legacy.into_inbound().unwrap(),
            Inbound::Event(CscEvent::ExtractionFan(ExtractionFanTelemetry {
                drive_frequency: 10.0,
                drive_voltage: None
            }))
        );

        let current = ControllerMessage::with_data(
            TELEMETRY,
            json!({"tel_extraction_fan": {"drive_frequency": 25.0, "drive_voltage": 115.0}}),
        );
        assert_eq!(
            current.into_inbound().unwrap(),
            Inbound::Event(CscEvent::ExtractionFan(ExtractionFanTelemetry {
                drive_frequency: 25.0,
                drive_voltage: Some(115.0)
            }))
        );
    }

    #[test]
    fn test_malformed_line() {
        assert!(ControllerMessage::parse("not json").is_err());
        assert!(ControllerMessage::with_data(TELEMETRY, json!({})).into_inbound().is_err());
    }
}
