use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Lifecycle state of the CSC.
///
/// Integer codes follow the observatory-wide numbering so published
/// `summaryState` events are comparable with other components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryState {
    Disabled,
    Enabled,
    Fault,
    Offline,
    Standby,
}

impl SummaryState {
    pub fn code(&self) -> i32 {
        match self {
            SummaryState::Disabled => 1,
            SummaryState::Enabled => 2,
            SummaryState::Fault => 3,
            SummaryState::Offline => 4,
            SummaryState::Standby => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryState::Disabled => "disabled",
            SummaryState::Enabled => "enabled",
            SummaryState::Fault => "fault",
            SummaryState::Offline => "offline",
            SummaryState::Standby => "standby",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s.to_lowercase().as_str() {
            "disabled" => Ok(SummaryState::Disabled),
            "enabled" => Ok(SummaryState::Enabled),
            "fault" => Ok(SummaryState::Fault),
            "offline" => Ok(SummaryState::Offline),
            "standby" => Ok(SummaryState::Standby),
            other => Err(DomainError::invalid_input(format!(
                "Unknown summary state: {}",
                other
            ))),
        }
    }

    /// True for the states in which the controller connection is kept open.
    pub fn is_active(&self) -> bool {
        matches!(self, SummaryState::Disabled | SummaryState::Enabled)
    }
}

impl std::fmt::Display for SummaryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Generic state transition commands accepted by every CSC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateCommand {
    Start,
    Enable,
    Disable,
    Standby,
    ExitControl,
}

impl StateCommand {
    pub fn name(&self) -> &'static str {
        match self {
            StateCommand::Start => "start",
            StateCommand::Enable => "enable",
            StateCommand::Disable => "disable",
            StateCommand::Standby => "standby",
            StateCommand::ExitControl => "exitControl",
        }
    }

    /// State the CSC ends up in when this command is accepted in `current`.
    pub fn target(&self, current: SummaryState) -> Result<SummaryState, DomainError> {
        use SummaryState::*;

        let target = match (self, current) {
            (StateCommand::Start, Standby) => Disabled,
            (StateCommand::Enable, Disabled) => Enabled,
            (StateCommand::Disable, Enabled) => Disabled,
            (StateCommand::Standby, Disabled | Fault) => Standby,
            (StateCommand::ExitControl, Standby) => Offline,
            _ => {
                return Err(DomainError::invalid_state(
                    current,
                    format!("{} not allowed", self.name()),
                ))
            }
        };

        Ok(target)
    }
}
