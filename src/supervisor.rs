//! Connection supervisor.
//!
//! Owns the connect/reconnect loop. For every connection it tells the engine
//! to begin registration, runs a frame reader and a rate-limited writer on
//! the split stream, and waits for both to finish. It then waits for the
//! engine's reset-ready signal before dialing again, so a new connection
//! never overlaps with the teardown of the old one.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::engine::{Meta, SupervisorLinks};
use crate::error::SupervisorError;
use crate::handoff::{Accept, Handoff};
use crate::transport::{reader, writer, Connector};

/// Wait after a failed connection attempt.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

pub struct Supervisor<C> {
    connector: C,
    inbound: mpsc::Sender<String>,
    outbound: Option<mpsc::Receiver<String>>,
    meta: Handoff<Meta>,
    ready: Accept<()>,
    spacing: Duration,
}

impl<C: Connector> Supervisor<C> {
    pub fn new(connector: C, links: SupervisorLinks) -> Self {
        Self {
            connector,
            inbound: links.inbound,
            outbound: Some(links.outbound),
            meta: links.meta,
            ready: links.ready,
            spacing: writer::MIN_SPACING,
        }
    }

    /// Override the writer's minimum spacing between lines.
    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.spacing = spacing;
        self
    }

    /// Connect, serve, and reconnect forever.
    ///
    /// Only returns if the engine goes away or a worker task panics.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        info!("connection supervisor starting");
        loop {
            let stream = match self.connector.connect().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, backoff = ?RECONNECT_BACKOFF, "connection failed, retrying");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                    continue;
                }
            };
            self.serve(stream).await?;
        }
    }

    async fn serve(&mut self, stream: C::Stream) -> Result<(), SupervisorError> {
        let (exit_tx, exit_rx) = oneshot::channel();
        self.meta
            .deliver(Meta::Register { writer_exit: exit_tx })
            .await
            .map_err(|_| SupervisorError::EngineGone)?;

        let outbound = self.outbound.take().ok_or(SupervisorError::EngineGone)?;
        let (read_half, write_half) = tokio::io::split(stream);
        let reader = tokio::spawn(reader::run(read_half, self.inbound.clone(), self.meta.clone()));
        let writer = tokio::spawn(writer::run(write_half, outbound, exit_rx, self.spacing));

        let (read_result, write_result) = tokio::join!(reader, writer);
        read_result?;
        let mut outbound = write_result?;
        info!("reader and writer finished");

        let ready = self.ready.recv().await.ok_or(SupervisorError::EngineGone)?;
        ready.complete();

        let mut stale = 0usize;
        while outbound.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!(stale, "discarded outbound lines from previous connection");
        }
        self.outbound = Some(outbound);
        info!("ready to reconnect");
        Ok(())
    }
}
