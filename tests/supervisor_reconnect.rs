//! Connection supervisor against an in-memory network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kraz::engine;
use kraz::{ConnectError, Connector, Engine, Identity, Supervisor, SupervisorError, MAX_IRC_LINE_LEN};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;

/// Hands the server side of every accepted connection to the test. The first
/// `fail_first` attempts are refused.
struct FakeNetwork {
    attempts: Arc<AtomicUsize>,
    fail_first: usize,
    pipe_size: usize,
    accepted: mpsc::UnboundedSender<DuplexStream>,
}

#[async_trait]
impl Connector for FakeNetwork {
    type Stream = DuplexStream;

    async fn connect(&self) -> kraz::error::Result<DuplexStream> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(ConnectError::NoServers);
        }
        let (client, server) = tokio::io::duplex(self.pipe_size);
        self.accepted.send(server).map_err(|_| ConnectError::NoServers)?;
        Ok(client)
    }
}

async fn read_line(conn: &mut BufReader<DuplexStream>) -> String {
    let mut line = String::new();
    conn.read_line(&mut line).await.unwrap();
    line.trim_end().to_owned()
}

#[tokio::test(start_paused = true)]
async fn reconnects_and_reregisters() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let (accepted_tx, mut accepted) = mpsc::unbounded_channel();
    let network = FakeNetwork {
        attempts: attempts.clone(),
        fail_first: 1,
        pipe_size: 4096,
        accepted: accepted_tx,
    };

    let (engine_links, supervisor_links) = engine::links();
    let identity = Identity {
        nick: "kraz".to_owned(),
        sasl: None,
    };
    let engine = Engine::new(identity, vec!["#stocks".to_owned()], Vec::new(), engine_links);
    tokio::spawn(engine.run());
    tokio::spawn(Supervisor::new(network, supervisor_links).run());

    let mut conn = BufReader::new(accepted.recv().await.unwrap());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(read_line(&mut conn).await, "NICK kraz");
    assert_eq!(read_line(&mut conn).await, "USER kraz @ host :kraz");

    conn.write_all(b":srv 001 kraz :Welcome\r\n").await.unwrap();
    assert_eq!(read_line(&mut conn).await, "JOIN #stocks");
    conn.write_all(b":kraz!k@host JOIN #stocks\r\nPING :one\r\n").await.unwrap();
    assert_eq!(read_line(&mut conn).await, "PONG :one");

    // Server goes away mid-session.
    drop(conn);

    let mut conn = BufReader::new(accepted.recv().await.unwrap());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(read_line(&mut conn).await, "NICK kraz");
    assert_eq!(read_line(&mut conn).await, "USER kraz @ host :kraz");

    conn.write_all(b":srv 001 kraz :Welcome\r\n").await.unwrap();
    assert_eq!(read_line(&mut conn).await, "JOIN #stocks");
}

#[tokio::test(start_paused = true)]
async fn stops_when_engine_is_gone() {
    let (accepted_tx, _accepted) = mpsc::unbounded_channel();
    let network = FakeNetwork {
        attempts: Arc::default(),
        fail_first: 0,
        pipe_size: 4096,
        accepted: accepted_tx,
    };

    let (engine_links, supervisor_links) = engine::links();
    drop(engine_links);

    let err = Supervisor::new(network, supervisor_links).run().await.unwrap_err();
    assert!(matches!(err, SupervisorError::EngineGone));
}

#[tokio::test(start_paused = true)]
async fn reconnects_when_server_stops_reading() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let (accepted_tx, mut accepted) = mpsc::unbounded_channel();
    let network = FakeNetwork {
        attempts: attempts.clone(),
        fail_first: 0,
        pipe_size: 4,
        accepted: accepted_tx,
    };

    let (engine_links, supervisor_links) = engine::links();
    let identity = Identity {
        nick: "kraz".to_owned(),
        sasl: None,
    };
    let engine = Engine::new(identity, Vec::new(), Vec::new(), engine_links);
    tokio::spawn(engine.run());
    tokio::spawn(Supervisor::new(network, supervisor_links).run());

    // Never reads, so the writer blocks on NICK; then floods an overlong line.
    let mut stalled = accepted.recv().await.unwrap();
    tokio::spawn(async move {
        let _ = stalled.write_all(&vec![b'a'; MAX_IRC_LINE_LEN + 1000]).await;
        std::future::pending::<()>().await;
    });

    let next = tokio::time::timeout(Duration::from_secs(120), accepted.recv())
        .await
        .expect("no reconnect after reset")
        .unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    let mut conn = BufReader::new(next);
    assert_eq!(read_line(&mut conn).await, "NICK kraz");
}
