//! # kraz
//!
//! A long-running IRC bot core: a TLS connection with server failover,
//! SASL PLAIN registration, automatic channel joins and reconnects, and a
//! set of scheduled modules that post to channels.
//!
//! ## Layout
//!
//! - [`transport`]: dialing, the frame reader and the rate-limited writer
//! - [`engine`]: the single-task protocol state machine
//! - [`supervisor`]: the connect/serve/reset loop
//! - [`module`]: the module contract and the bundled modules
//! - [`config`]: TOML configuration
//!
//! ## Wiring
//!
//! ```no_run
//! use chrono::Utc;
//! use kraz::{engine, module, Config, Engine, Identity, Supervisor, TlsConnector};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load("kraz.toml")?;
//! let modules = module::from_config(&config, Utc::now())?;
//! let (engine_links, supervisor_links) = engine::links();
//!
//! let identity = Identity { nick: config.nick.clone(), sasl: config.sasl.clone() };
//! let engine = Engine::new(identity, config.channels.clone(), modules, engine_links);
//! let connector = TlsConnector::new(config.servers.clone(), config.verify_cert);
//! let supervisor = Supervisor::new(connector, supervisor_links);
//!
//! tokio::select! {
//!     _ = engine.run() => {}
//!     res = supervisor.run() => res?,
//! }
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]

pub mod casemap;
pub mod config;
pub mod engine;
pub mod error;
pub mod handoff;
pub mod module;
pub mod response;
pub mod sasl;
pub mod source;
pub mod supervisor;
pub mod transport;

pub use self::casemap::{irc_eq, is_channel_name};
pub use self::config::{Config, ConfigError};
pub use self::engine::{Engine, Identity, Meta, Outbox, Phase, RuntimeState};
pub use self::error::{ConnectError, ModuleError, QueueClosed, SourceError, SupervisorError};
pub use self::module::{CommandContext, Module, Schedule};
pub use self::response::Response;
pub use self::sasl::Credentials;
pub use self::source::Source;
pub use self::supervisor::Supervisor;
pub use self::transport::{Connector, TlsConnector, MAX_IRC_LINE_LEN};
