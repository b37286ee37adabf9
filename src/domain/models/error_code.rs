use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Reason codes published with `errorCode` when the CSC goes to fault.
///
/// Serialized as the integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ErrorCode {
    TcpipConnectError,
    TcpipReadError,
    CannotStartMockController,
    MockCtrlStartError,
}

impl ErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::TcpipConnectError => 1,
            ErrorCode::TcpipReadError => 2,
            ErrorCode::CannotStartMockController => 3,
            ErrorCode::MockCtrlStartError => 4,
        }
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

impl TryFrom<i32> for ErrorCode {
    type Error = DomainError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(ErrorCode::TcpipConnectError),
            2 => Ok(ErrorCode::TcpipReadError),
            3 => Ok(ErrorCode::CannotStartMockController),
            4 => Ok(ErrorCode::MockCtrlStartError),
            other => Err(DomainError::invalid_input(format!(
                "Unknown error code: {}",
                other
            ))),
        }
    }
}
