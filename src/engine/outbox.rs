//! Handle for queueing outbound protocol lines.

use tokio::sync::mpsc;

use crate::error::QueueClosed;

/// Sending side of the outbound queue.
///
/// This is the only way the engine and modules talk to the server. Lines are
/// written in the order they are queued, no faster than the writer's pacing
/// allows. A full queue suspends the caller.
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: mpsc::Sender<String>,
}

impl Outbox {
    /// Wrap the sending half of the outbound queue.
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Queue a raw protocol line, without the CRLF terminator.
    pub async fn send(&self, line: impl Into<String>) -> Result<(), QueueClosed> {
        self.tx.send(line.into()).await.map_err(|_| QueueClosed)
    }

    /// Queue a `PRIVMSG`.
    pub async fn privmsg(&self, target: &str, text: &str) -> Result<(), QueueClosed> {
        self.send(format!("PRIVMSG {} :{}", target, text)).await
    }

    /// Queue a `NOTICE`.
    pub async fn notice(&self, target: &str, text: &str) -> Result<(), QueueClosed> {
        self.send(format!("NOTICE {} :{}", target, text)).await
    }
}
