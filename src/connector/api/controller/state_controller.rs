use anyhow::Result;

use super::super::Container;

/// Summary state commands issued from the console.
pub struct StateController<'a> {
    container: &'a Container,
}

impl<'a> StateController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    pub async fn start(&self, config_override: Option<String>) -> Result<String> {
        self.container
            .csc()
            .start(config_override.as_deref())
            .await?;
        self.acknowledge("start").await
    }

    pub async fn enable(&self) -> Result<String> {
        self.container.csc().enable().await?;
        self.acknowledge("enable").await
    }

    pub async fn disable(&self) -> Result<String> {
        self.container.csc().disable().await?;
        self.acknowledge("disable").await
    }

    pub async fn standby(&self) -> Result<String> {
        self.container.csc().standby().await?;
        self.acknowledge("standby").await
    }

    pub async fn exit_control(&self) -> Result<String> {
        self.container.csc().exit_control().await?;
        self.acknowledge("exitControl").await
    }

    pub async fn state(&self) -> Result<String> {
        let csc = self.container.csc();
        Ok(format!(
            "summaryState={} connected={} simulationMode={}",
            csc.summary_state().await,
            csc.is_connected().await,
            csc.simulation_mode()
        ))
    }

    async fn acknowledge(&self, command: &str) -> Result<String> {
        Ok(format!(
            "ack {} (summaryState={})",
            command,
            self.container.csc().summary_state().await
        ))
    }
}
