//! Rate-limited writer.
//!
//! Drains the outbound queue onto the socket, appending CRLF and keeping at
//! least [`MIN_SPACING`] between consecutive writes so the server never sees
//! the bot flood.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Minimum time between two writes.
pub const MIN_SPACING: Duration = Duration::from_secs(1);

async fn write_line<W>(sink: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut framed = String::with_capacity(line.len() + 2);
    framed.push_str(line);
    framed.push_str("\r\n");
    sink.write_all(framed.as_bytes()).await?;
    sink.flush().await
}

/// Write queued lines to `sink` until `exit` fires.
///
/// Write errors are logged and otherwise ignored; the frame reader notices
/// a dead socket and drives the reset. `exit` also interrupts a write the
/// peer has stopped draining. Lines still queued when `exit` fires are left
/// in the queue. The receiver is handed back so the next
/// connection's writer can take it over.
pub async fn run<W>(
    mut sink: W,
    mut outbound: mpsc::Receiver<String>,
    mut exit: oneshot::Receiver<()>,
    spacing: Duration,
) -> mpsc::Receiver<String>
where
    W: AsyncWrite + Unpin,
{
    info!("writer starting");
    let mut last_write: Option<Instant> = None;

    loop {
        let line = tokio::select! {
            biased;
            _ = &mut exit => {
                info!("writer got signal to exit");
                break;
            }
            line = outbound.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        if let Some(last) = last_write {
            let due = last + spacing;
            if Instant::now() < due {
                tokio::select! {
                    biased;
                    _ = &mut exit => {
                        info!("writer got signal to exit");
                        break;
                    }
                    _ = sleep_until(due) => {}
                }
            }
        }

        last_write = Some(Instant::now());
        debug!(line = %line, "client");
        tokio::select! {
            biased;
            _ = &mut exit => {
                info!("writer got signal to exit mid-write");
                break;
            }
            result = write_line(&mut sink, &line) => {
                if let Err(e) = result {
                    warn!(error = %e, "write error");
                }
            }
        }
    }

    info!("writer exiting");
    outbound
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test(start_paused = true)]
    async fn test_lines_are_crlf_terminated() {
        let (client, server) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::channel(8);
        let (exit_tx, exit_rx) = oneshot::channel();
        let writer = tokio::spawn(run(client, rx, exit_rx, MIN_SPACING));

        tx.send("NICK kraz".to_string()).await.unwrap();
        let mut reader = BufReader::new(server);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "NICK kraz\r\n");

        exit_tx.send(()).unwrap();
        writer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_leaves_pending_lines_queued() {
        let (client, _server) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::channel(8);
        let (exit_tx, exit_rx) = oneshot::channel();

        for i in 0..3 {
            tx.send(format!("PRIVMSG #c :{}", i)).await.unwrap();
        }
        exit_tx.send(()).unwrap();

        let mut rx = run(client, rx, exit_rx, MIN_SPACING).await;
        let mut left = 0;
        while rx.try_recv().is_ok() {
            left += 1;
        }
        assert_eq!(left, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_is_not_fatal() {
        let (client, server) = tokio::io::duplex(1024);
        drop(server);
        let (tx, rx) = mpsc::channel(8);
        let (exit_tx, exit_rx) = oneshot::channel();
        let writer = tokio::spawn(run(client, rx, exit_rx, MIN_SPACING));

        tx.send("PING :a".to_string()).await.unwrap();
        tx.send("PING :b".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!writer.is_finished());

        exit_tx.send(()).unwrap();
        writer.await.unwrap();
    }
}
