//! Error types for the bot runtime.
//!
//! Each concern gets its own enum so callers can tell recoverable
//! connection trouble apart from bugs in a module or a dead engine.

use thiserror::Error;

/// Convenience type alias for Results using [`ConnectError`].
pub type Result<T, E = ConnectError> = std::result::Result<T, E>;

/// Failures while establishing the encrypted connection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectError {
    /// Every configured server was tried and none completed a handshake.
    #[error("no servers were available")]
    NoServers,

    /// A server entry is not of the form `host:port`.
    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    /// TCP connect failed.
    #[error("io error connecting to {server}: {source}")]
    Io {
        /// The server being dialed.
        server: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The TLS handshake was rejected or failed.
    #[error("tls handshake with {server} failed: {source}")]
    Tls {
        /// The server being dialed.
        server: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced while parsing the source prefix of an inbound line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SourceError {
    /// The prefix did not start with `:` or was empty.
    #[error("malformed source descriptor {0}")]
    Malformed(String),

    /// A user prefix without exactly one `@` after the `!`.
    #[error("error separating ident and host in {0}")]
    MissingHost(String),
}

/// A queue whose receiving side has gone away.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("queue closed")]
pub struct QueueClosed;

/// Errors a module may report from `execute` or `handle_command`.
///
/// These are logged by the engine and never stop the periodic tick.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModuleError {
    /// HTTP request failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP request returned a non-success status.
    #[error("request returned status code {0}")]
    Status(u16),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be found in fetched content.
    #[error("{what} extraction failed for {symbol}")]
    Extract {
        /// The symbol being fetched.
        symbol: String,
        /// What was being extracted.
        what: &'static str,
    },

    /// A configured extraction pattern does not compile.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The configured data directory holds no files.
    #[error("no data files in {0}")]
    EmptyDataPath(std::path::PathBuf),

    /// The outbound queue is gone.
    #[error(transparent)]
    Outbound(#[from] QueueClosed),
}

/// Errors that stop the connection supervisor.
///
/// Connection failures are not in this list; those are retried forever.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SupervisorError {
    /// The protocol engine dropped its end of the meta or reset queue.
    #[error("protocol engine is gone")]
    EngineGone,

    /// A reader or writer task panicked.
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
