//! Runtime state owned by the protocol engine.
//!
//! Created once at startup and reset in place on every reconnect. Only the
//! engine task ever touches it.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::casemap::irc_eq;
use crate::module::Module;

/// Where the connection is in the registration handshake.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    /// No connection, or the last one was reset.
    #[default]
    Disconnected,
    /// Connected, NICK/USER sent or about to be.
    Registering,
    /// Waiting on capability or SASL replies.
    SaslNegotiating,
    /// The server sent 001.
    Registered,
}

/// Join bookkeeping for one configured channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelStatus {
    /// Channel name as configured.
    pub name: String,
    /// Whether the server has confirmed our JOIN.
    pub joined: bool,
    /// When a JOIN was last sent, if ever on this connection.
    pub last_join_attempt: Option<Instant>,
}

impl ChannelStatus {
    fn new(name: String) -> Self {
        Self {
            name,
            joined: false,
            last_join_attempt: None,
        }
    }
}

/// Everything the engine knows about the current connection.
pub struct RuntimeState {
    phase: Phase,
    channels: Vec<ChannelStatus>,
    pub(crate) modules: Vec<Box<dyn Module>>,
}

impl RuntimeState {
    /// Build the initial state from the configured channels and modules.
    pub fn new(channels: impl IntoIterator<Item = String>, modules: Vec<Box<dyn Module>>) -> Self {
        Self {
            phase: Phase::Disconnected,
            channels: channels.into_iter().map(ChannelStatus::new).collect(),
            modules,
        }
    }

    /// Current handshake phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// True while a connection is up.
    pub fn connected(&self) -> bool {
        self.phase != Phase::Disconnected
    }

    /// True once the server has welcomed us.
    pub fn registered(&self) -> bool {
        self.phase == Phase::Registered
    }

    /// Channel bookkeeping, in configuration order.
    pub fn channels(&self) -> &[ChannelStatus] {
        &self.channels
    }

    /// Look up a configured channel.
    pub fn channel(&self, name: &str) -> Option<&ChannelStatus> {
        self.channels.iter().find(|c| irc_eq(&c.name, name))
    }

    /// Names of the registered modules, in registration order.
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Set the joined flag of a configured channel.
    ///
    /// Returns `false` if the channel is not one we manage.
    pub fn mark_joined(&mut self, name: &str, joined: bool) -> bool {
        match self.channels.iter_mut().find(|c| irc_eq(&c.name, name)) {
            Some(channel) => {
                channel.joined = joined;
                true
            }
            None => false,
        }
    }

    /// Channels that need a JOIN now. Each returned channel is stamped with
    /// `now` so it is not retried for another `retry`.
    pub fn take_join_due(&mut self, now: Instant, retry: Duration) -> Vec<String> {
        self.channels
            .iter_mut()
            .filter(|c| !c.joined)
            .filter(|c| c.last_join_attempt.map_or(true, |at| now >= at + retry))
            .map(|c| {
                c.last_join_attempt = Some(now);
                c.name.clone()
            })
            .collect()
    }

    /// Forget everything tied to the previous connection.
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.joined = false;
            channel.last_join_attempt = None;
        }
        self.phase = Phase::Disconnected;
    }
}

impl fmt::Debug for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeState")
            .field("phase", &self.phase)
            .field("channels", &self.channels)
            .field("modules", &self.module_names())
            .finish()
    }
}
