use anyhow::Result;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{debug, error};

use super::HostMessage;

/// Writes every [HostMessage] as one JSON line. Finishes once all senders are dropped.
pub struct HostWriter<W> {
    messages: mpsc::Receiver<HostMessage>,
    output: W,
}

impl<W: AsyncWrite + Unpin> HostWriter<W> {
    pub fn new(messages: mpsc::Receiver<HostMessage>, output: W) -> Self {
        Self { messages, output }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(message) = self.messages.recv().await {
            debug!("Sending {message:?}");
            let mut line = serde_json::to_vec(&message)?;
            line.push(b'\n');
            self.output
                .write_all(&line)
                .await
                .inspect_err(|e| error!("Failed to write to the host {e:?}"))?;
            self.output.flush().await?;
        }
        self.messages.close();
        Ok(())
    }
}
