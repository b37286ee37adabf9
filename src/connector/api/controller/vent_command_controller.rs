use anyhow::{anyhow, Result};

use crate::domain::{GateSelection, NUM_VENT_GATES};

use super::super::Container;

/// Vent gate and extraction fan commands issued from the console.
pub struct VentCommandController<'a> {
    container: &'a Container,
}

impl<'a> VentCommandController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    pub async fn close_vent_gate(&self, gates: Vec<i32>) -> Result<String> {
        self.container
            .csc()
            .close_vent_gate(to_selection(gates)?)
            .await?;
        Ok("ack closeVentGate".to_string())
    }

    pub async fn open_vent_gate(&self, gates: Vec<i32>) -> Result<String> {
        self.container
            .csc()
            .open_vent_gate(to_selection(gates)?)
            .await?;
        Ok("ack openVentGate".to_string())
    }

    pub async fn reset_extraction_fan_drive(&self) -> Result<String> {
        self.container.csc().reset_extraction_fan_drive().await?;
        Ok("ack resetExtractionFanDrive".to_string())
    }

    pub async fn set_extraction_fan_drive_freq(&self, target_frequency: f64) -> Result<String> {
        self.container
            .csc()
            .set_extraction_fan_drive_freq(target_frequency)
            .await?;
        Ok("ack setExtractionFanDriveFreq".to_string())
    }

    pub async fn set_extraction_fan_manual_control_mode(&self, enable: bool) -> Result<String> {
        self.container
            .csc()
            .set_extraction_fan_manual_control_mode(enable)
            .await?;
        Ok("ack setExtractionFanManualControlMode".to_string())
    }

    pub async fn start_extraction_fan(&self) -> Result<String> {
        self.container.csc().start_extraction_fan().await?;
        Ok("ack startExtractionFan".to_string())
    }

    pub async fn stop_extraction_fan(&self) -> Result<String> {
        self.container.csc().stop_extraction_fan().await?;
        Ok("ack stopExtractionFan".to_string())
    }
}

fn to_selection(gates: Vec<i32>) -> Result<GateSelection> {
    let slots: [i32; NUM_VENT_GATES] = gates
        .try_into()
        .map_err(|gates: Vec<i32>| anyhow!("Expected {} gate slots, got {}", NUM_VENT_GATES, gates.len()))?;
    Ok(GateSelection::new(slots)?)
}
