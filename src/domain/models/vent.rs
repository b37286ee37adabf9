use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

pub const NUM_VENT_GATES: usize = 4;

/// Frequency the extraction fan runs at after `startExtractionFan`.
pub const DEFAULT_FAN_FREQUENCY: f64 = 50.0;

/// Marks an unused slot in a gate selection.
pub const UNUSED_GATE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VentGateState {
    Closed,
    PartiallyOpen,
    Opened,
    Fault,
}

impl VentGateState {
    pub fn code(&self) -> i32 {
        match self {
            VentGateState::Closed => 0,
            VentGateState::PartiallyOpen => 1,
            VentGateState::Opened => 2,
            VentGateState::Fault => 3,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, DomainError> {
        match code {
            0 => Ok(VentGateState::Closed),
            1 => Ok(VentGateState::PartiallyOpen),
            2 => Ok(VentGateState::Opened),
            3 => Ok(VentGateState::Fault),
            other => Err(DomainError::protocol(format!(
                "Unknown vent gate state: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanDriveState {
    Stopped,
    Operating,
    Fault,
}

impl FanDriveState {
    pub fn code(&self) -> i32 {
        match self {
            FanDriveState::Stopped => 0,
            FanDriveState::Operating => 1,
            FanDriveState::Fault => 2,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, DomainError> {
        match code {
            0 => Ok(FanDriveState::Stopped),
            1 => Ok(FanDriveState::Operating),
            2 => Ok(FanDriveState::Fault),
            other => Err(DomainError::protocol(format!(
                "Unknown fan drive state: {}",
                other
            ))),
        }
    }
}

/// The four gate slots of an open/close command. Slots holding
/// [`UNUSED_GATE`] are skipped; every other slot must name a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[i32; NUM_VENT_GATES]")]
pub struct GateSelection([i32; NUM_VENT_GATES]);

impl TryFrom<[i32; NUM_VENT_GATES]> for GateSelection {
    type Error = DomainError;

    fn try_from(slots: [i32; NUM_VENT_GATES]) -> Result<Self, Self::Error> {
        Self::new(slots)
    }
}

impl GateSelection {
    pub fn new(slots: [i32; NUM_VENT_GATES]) -> Result<Self, DomainError> {
        for slot in slots {
            if slot != UNUSED_GATE && !(0..NUM_VENT_GATES as i32).contains(&slot) {
                return Err(DomainError::invalid_input(format!(
                    "Invalid gate number: {}",
                    slot
                )));
            }
        }
        Ok(Self(slots))
    }

    pub fn all() -> Self {
        Self([0, 1, 2, 3])
    }

    pub fn single(gate: usize) -> Result<Self, DomainError> {
        let mut slots = [UNUSED_GATE; NUM_VENT_GATES];
        slots[0] = i32::try_from(gate)
            .map_err(|_| DomainError::invalid_input(format!("Invalid gate number: {}", gate)))?;
        Self::new(slots)
    }

    pub fn slots(&self) -> [i32; NUM_VENT_GATES] {
        self.0
    }

    /// Indices of the selected gates, in slot order.
    pub fn gates(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .filter(|slot| **slot != UNUSED_GATE)
            .map(|slot| *slot as usize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtractionFanTelemetry {
    /// Hz
    pub drive_frequency: f64,
    /// Volts; legacy controllers do not report it.
    pub drive_voltage: Option<f64>,
}
