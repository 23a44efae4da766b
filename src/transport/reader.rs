//! Frame reader: bytes in, protocol lines out.
//!
//! Runs on its own task for the life of one connection. Complete lines are
//! pushed to the bounded inbound queue as soon as they arrive; a slow engine
//! therefore stalls socket reads rather than growing memory.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::MAX_IRC_LINE_LEN;
use crate::engine::Meta;
use crate::handoff::Handoff;

const READ_CHUNK: usize = 4096;

/// Remove and return the first complete line in `store`.
///
/// Trailing CR/LF is stripped. The returned string owns its bytes, so later
/// reuse of `store` cannot alias it.
pub fn next_line(store: &mut BytesMut) -> Option<String> {
    let end = store.iter().position(|&b| b == b'\n')?;
    let raw = store.split_to(end + 1);

    let mut len = raw.len();
    while len > 0 && matches!(raw[len - 1], b'\r' | b'\n') {
        len -= 1;
    }
    Some(String::from_utf8_lossy(&raw[..len]).into_owned())
}

/// Push every complete line in `store` onto the inbound queue.
///
/// Returns `false` if the engine has dropped the queue.
async fn dispatch_available(store: &mut BytesMut, inbound: &mpsc::Sender<String>) -> bool {
    while let Some(line) = next_line(store) {
        debug!(line = %line, "server");
        if inbound.send(line).await.is_err() {
            return false;
        }
    }
    true
}

/// Read from `source` until it fails or closes.
///
/// On failure a [`Meta::Reset`] is delivered to the engine before any
/// remaining complete lines are flushed; a trailing partial line is dropped.
/// The read half is dropped on return. The reset makes the engine stop the
/// writer, which drops the write half and closes the connection.
pub async fn run<R>(mut source: R, inbound: mpsc::Sender<String>, meta: Handoff<Meta>)
where
    R: AsyncRead + Unpin,
{
    info!("frame reader starting");
    let mut store = BytesMut::with_capacity(READ_CHUNK);

    let failure = loop {
        store.reserve(READ_CHUNK);
        match source.read_buf(&mut store).await {
            Ok(0) => {
                break std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                )
            }
            Ok(_) => {
                if !dispatch_available(&mut store, &inbound).await {
                    info!("inbound queue closed, frame reader exiting");
                    return;
                }
                if store.len() > MAX_IRC_LINE_LEN {
                    break std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("line exceeds {} bytes", MAX_IRC_LINE_LEN),
                    );
                }
            }
            Err(e) => break e,
        }
    };

    warn!(error = %failure, "read error");
    if meta.deliver(Meta::Reset).await.is_err() {
        warn!("protocol engine gone while requesting reset");
    }
    dispatch_available(&mut store, &inbound).await;
    if !store.is_empty() {
        debug!(bytes = store.remaining(), "discarding partial line");
    }
    drop(source);
    info!("frame reader exiting");
}
