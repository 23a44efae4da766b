//! Wire connection: dialing, framing and paced writing.
//!
//! [`connect`] walks an ordered server list and returns the first stream
//! whose TLS handshake succeeds. Once connected, the stream is split and
//! handed to [`reader::run`] and [`writer::run`], each on its own task.

pub mod reader;
mod tls;
pub mod writer;

use std::time::Duration;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tracing::{info, warn};

use crate::error::{ConnectError, Result};

pub use self::tls::InsecureVerifier;

/// Longest line the frame reader will buffer before giving up on the peer.
pub const MAX_IRC_LINE_LEN: usize = 8191;

/// Something that can produce a fresh connection to the network.
///
/// The supervisor calls this every time it needs a new connection; an
/// error is retried after a fixed backoff.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The byte stream handed to the reader and writer.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Establish a new connection.
    async fn connect(&self) -> Result<Self::Stream>;
}

/// Production connector: TLS over TCP with server failover.
pub struct TlsConnector {
    servers: Vec<String>,
    verify: bool,
    inner: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    /// Build a connector for `servers`, tried in order.
    ///
    /// With `verify == false` certificate chains and hostnames are not
    /// checked. This is logged on every connection attempt.
    pub fn new(servers: Vec<String>, verify: bool) -> Self {
        let config = tls::client_config(verify);
        Self {
            servers,
            verify,
            inner: tokio_rustls::TlsConnector::from(std::sync::Arc::new(config)),
        }
    }

    async fn connect_one(&self, server: &str) -> Result<TlsStream<TcpStream>> {
        let (host, port) = server
            .rsplit_once(':')
            .ok_or_else(|| ConnectError::InvalidAddress(server.to_owned()))?;
        if port.parse::<u16>().is_err() {
            return Err(ConnectError::InvalidAddress(server.to_owned()));
        }
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let name = ServerName::try_from(host.to_owned())
            .map_err(|_| ConnectError::InvalidAddress(server.to_owned()))?;

        let tcp = TcpStream::connect(server)
            .await
            .map_err(|source| ConnectError::Io {
                server: server.to_owned(),
                source,
            })?;
        if let Err(e) = enable_keepalive(&tcp) {
            warn!("failed to enable TCP keepalive: {}", e);
        }

        self.inner
            .connect(name, tcp)
            .await
            .map_err(|source| ConnectError::Tls {
                server: server.to_owned(),
                source,
            })
    }
}

#[async_trait]
impl Connector for TlsConnector {
    type Stream = TlsStream<TcpStream>;

    async fn connect(&self) -> Result<Self::Stream> {
        for server in &self.servers {
            info!(server = %server, "attempting connection");
            if !self.verify {
                warn!(server = %server, "certificate verification disabled");
            }

            match self.connect_one(server).await {
                Ok(stream) => {
                    let suite = stream
                        .get_ref()
                        .1
                        .negotiated_cipher_suite()
                        .map(|s| format!("{:?}", s.suite()));
                    info!(server = %server, cipher_suite = ?suite, "connection established");
                    return Ok(stream);
                }
                Err(e) => warn!(server = %server, error = %e, "connection attempt failed"),
            }
        }
        Err(ConnectError::NoServers)
    }
}

/// Connect to the first reachable server in `servers`.
pub async fn connect(servers: &[String], verify: bool) -> Result<TlsStream<TcpStream>> {
    TlsConnector::new(servers.to_vec(), verify).connect().await
}

fn enable_keepalive(stream: &TcpStream) -> AnyResult<()> {
    use socket2::{SockRef, TcpKeepalive};

    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));

    sock.set_tcp_keepalive(&keepalive)?;
    Ok(())
}
