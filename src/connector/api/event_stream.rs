use anyhow::Result;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::CscEvent;

/// One JSON object per event, tagged with its topic.
pub fn format_event(event: &CscEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

/// Write every published event to `out` until the publisher goes away.
pub async fn forward_events<W>(mut events: broadcast::Receiver<CscEvent>, mut out: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Event output fell behind; {} events dropped", missed);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let mut line = format_event(&event)?;
        line.push('\n');
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}
