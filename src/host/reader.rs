use anyhow::Result;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::HostEvent;

/// Turns host input lines into [HostEvent]s. Ends on end of input or on shutdown; either way the
/// event sender is dropped, which tells the tracker the host is gone.
pub struct HostReader<R> {
    input: R,
    events: mpsc::Sender<HostEvent>,
    shutdown: CancellationToken,
}

impl<R: AsyncRead + Unpin> HostReader<R> {
    pub fn new(input: R, events: mpsc::Sender<HostEvent>, shutdown: CancellationToken) -> Self {
        Self {
            input,
            events,
            shutdown,
        }
    }

    pub async fn run(self) -> Result<()> {
        let HostReader {
            input,
            events,
            shutdown,
        } = self;
        let mut lines = BufReader::new(input).lines();

        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                info!("Host closed its input");
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<HostEvent>(&line) {
                Ok(event) => {
                    debug!("Received {event:?}");
                    if events.send(event).await.is_err() {
                        debug!("Tracker is gone, no one to forward events to");
                        return Ok(());
                    }
                }
                // Hosts may be newer than us, unknown events are not fatal.
                Err(e) => warn!("Ignoring malformed host event {line:?}: {e}"),
            }
        }
    }
}
