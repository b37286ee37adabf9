use serde::{Deserialize, Serialize};

use super::{
    ErrorCode, ExtractionFanTelemetry, FanDriveState, SummaryState, VentGateState,
    NUM_VENT_GATES,
};

/// Everything the CSC publishes: events and telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic")]
pub enum CscEvent {
    #[serde(rename = "evt_summaryState")]
    SummaryState { state: SummaryState },

    #[serde(rename = "evt_errorCode")]
    ErrorCode { code: ErrorCode, report: String },

    #[serde(rename = "evt_ventGateState")]
    VentGateState { state: [VentGateState; NUM_VENT_GATES] },

    #[serde(rename = "evt_extractionFanDriveState")]
    ExtractionFanDriveState { state: FanDriveState },

    #[serde(rename = "evt_extractionFanDriveFaultCode")]
    ExtractionFanDriveFaultCode { fault_code: i64 },

    #[serde(rename = "tel_extractionFan")]
    ExtractionFan(ExtractionFanTelemetry),
}

impl CscEvent {
    pub fn error_code(code: ErrorCode, report: impl Into<String>) -> Self {
        CscEvent::ErrorCode {
            code,
            report: report.into(),
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            CscEvent::SummaryState { .. } => "evt_summaryState",
            CscEvent::ErrorCode { .. } => "evt_errorCode",
            CscEvent::VentGateState { .. } => "evt_ventGateState",
            CscEvent::ExtractionFanDriveState { .. } => "evt_extractionFanDriveState",
            CscEvent::ExtractionFanDriveFaultCode { .. } => "evt_extractionFanDriveFaultCode",
            CscEvent::ExtractionFan(_) => "tel_extractionFan",
        }
    }
}
