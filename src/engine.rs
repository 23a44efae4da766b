//! Protocol engine.
//!
//! The engine is the single consumer of both the inbound line queue and the
//! meta notification queue. It owns [`RuntimeState`] outright, so nothing in
//! here takes a lock. Every pass of the loop handles exactly one of:
//!
//! - a meta notification (registration start, post-auth NICK/USER, reset)
//! - an inbound protocol line
//! - the periodic tick (channel join retries and module execution)
//!
//! in that order of preference. A reset stops the writer, clears connection
//! state, throws away everything still queued from the dead connection and
//! then tells the supervisor it may reconnect.

mod handlers;
mod outbox;
mod state;

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub use outbox::Outbox;
pub use state::{ChannelStatus, Phase, RuntimeState};

use crate::handoff::{Accept, Handoff};
use crate::module::Module;
use crate::sasl::{Credentials, CAP_REQ_SASL};

/// How often the periodic tick fires.
pub const TICK_PERIOD: Duration = Duration::from_secs(5);

/// Minimum time between JOIN attempts for the same channel.
pub const JOIN_RETRY: Duration = Duration::from_secs(30);

/// Capacity of the inbound and outbound line queues.
pub const QUEUE_CAPACITY: usize = 512;

/// Out-of-band notifications for the engine.
#[derive(Debug)]
pub enum Meta {
    /// A connection is up. `writer_exit` stops that connection's writer.
    Register {
        writer_exit: oneshot::Sender<()>,
    },
    /// Send NICK/USER.
    NickRegister,
    /// The connection died.
    Reset,
}

/// Who the bot is on the network.
#[derive(Clone, Debug)]
pub struct Identity {
    pub nick: String,
    pub sasl: Option<Credentials>,
}

/// The engine's ends of the queues it shares with the supervisor.
#[derive(Debug)]
pub struct EngineLinks {
    pub inbound: mpsc::Receiver<String>,
    pub outbound: mpsc::Sender<String>,
    pub meta: Accept<Meta>,
    pub ready: Handoff<()>,
}

/// The supervisor's ends of the queues it shares with the engine.
#[derive(Debug)]
pub struct SupervisorLinks {
    pub inbound: mpsc::Sender<String>,
    pub outbound: mpsc::Receiver<String>,
    pub meta: Handoff<Meta>,
    pub ready: Accept<()>,
}

/// Create every queue between engine and supervisor.
pub fn links() -> (EngineLinks, SupervisorLinks) {
    let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (meta_tx, meta_rx) = crate::handoff::channel();
    let (ready_tx, ready_rx) = crate::handoff::channel();
    (
        EngineLinks {
            inbound: inbound_rx,
            outbound: outbound_tx,
            meta: meta_rx,
            ready: ready_tx,
        },
        SupervisorLinks {
            inbound: inbound_tx,
            outbound: outbound_rx,
            meta: meta_tx,
            ready: ready_rx,
        },
    )
}

/// The protocol engine. Drive it with [`Engine::run`].
pub struct Engine {
    identity: Identity,
    state: RuntimeState,
    outbox: Outbox,
    inbound: mpsc::Receiver<String>,
    meta: Accept<Meta>,
    ready: Handoff<()>,
    writer_exit: Option<oneshot::Sender<()>>,
    draining: bool,
}

impl Engine {
    pub fn new(
        identity: Identity,
        channels: Vec<String>,
        modules: Vec<Box<dyn Module>>,
        links: EngineLinks,
    ) -> Self {
        Self {
            identity,
            state: RuntimeState::new(channels, modules),
            outbox: Outbox::new(links.outbound),
            inbound: links.inbound,
            meta: links.meta,
            ready: links.ready,
            writer_exit: None,
            draining: false,
        }
    }

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    /// Run until every meta sender is gone.
    pub async fn run(mut self) {
        info!(nick = %self.identity.nick, "protocol engine starting");
        let mut tick = time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                delivery = self.meta.recv() => {
                    let Some(delivery) = delivery else { break };
                    let (meta, done) = delivery.into_parts();
                    self.process_meta(meta).await;
                    done.complete();
                }
                Some(line) = self.inbound.recv() => self.process_line(&line).await,
                _ = tick.tick() => self.periodic().await,
            }

            if self.draining && self.finish_reset().await.is_err() {
                warn!("supervisor gone while signalling ready");
                break;
            }
        }
        info!("protocol engine exiting");
    }

    /// Apply `meta` and any follow-up transitions it produces.
    pub(crate) async fn process_meta(&mut self, meta: Meta) {
        let mut next = Some(meta);
        while let Some(meta) = next.take() {
            next = self.apply_meta(meta).await;
        }
    }

    async fn apply_meta(&mut self, meta: Meta) -> Option<Meta> {
        match meta {
            Meta::Register { writer_exit } => {
                info!("got registration notification, beginning registration");
                if let Some(stale) = self.writer_exit.replace(writer_exit) {
                    let _ = stale.send(());
                }
                if self.identity.sasl.is_some() {
                    info!("attempting SASL authentication");
                    self.state.set_phase(Phase::SaslNegotiating);
                    self.send(CAP_REQ_SASL).await;
                    None
                } else {
                    info!("skipping SASL authentication");
                    self.state.set_phase(Phase::Registering);
                    Some(Meta::NickRegister)
                }
            }
            Meta::NickRegister => {
                info!(nick = %self.identity.nick, "sending nick registration");
                self.state.set_phase(Phase::Registering);
                let nick = self.identity.nick.clone();
                self.send(format!("NICK {}", nick)).await;
                self.send(format!("USER {} @ host :{}", nick, nick)).await;
                None
            }
            Meta::Reset => {
                info!("got reset notification, resetting state");
                if let Some(exit) = self.writer_exit.take() {
                    let _ = exit.send(());
                }
                self.state.reset();
                self.draining = true;
                None
            }
        }
    }

    /// Send a line, logging if the supervisor has gone away.
    async fn send(&self, line: impl Into<String>) {
        if let Err(e) = self.outbox.send(line).await {
            warn!(error = %e, "dropping outbound line");
        }
    }

    async fn periodic(&mut self) {
        if !self.state.registered() {
            return;
        }

        for channel in self.state.take_join_due(Instant::now(), JOIN_RETRY) {
            info!(channel = %channel, "attempting to join");
            self.send(format!("JOIN {}", channel)).await;
        }

        let now = Utc::now();
        for module in self.state.modules.iter_mut() {
            if !module.should_run(now) {
                continue;
            }
            debug!(module = module.name(), "executing module");
            if let Err(e) = module.execute(now, &self.outbox).await {
                warn!(module = module.name(), error = %e, "error in module");
            }
        }
    }

    /// Discard everything left from the dead connection, then hand the
    /// supervisor the go-ahead to reconnect.
    async fn finish_reset(&mut self) -> Result<(), crate::error::QueueClosed> {
        let mut discarded = self.discard_pending();

        let ready = self.ready.deliver(());
        tokio::pin!(ready);
        let result = loop {
            tokio::select! {
                biased;
                result = &mut ready => break result,
                Some(line) = self.inbound.recv() => {
                    debug!(line = %line, "discarding inbound line");
                    discarded += 1;
                }
                Some(delivery) = self.meta.recv() => {
                    debug!(meta = ?delivery.value(), "discarding meta notification");
                    delivery.complete();
                }
            }
        };

        while let Ok(line) = self.inbound.try_recv() {
            debug!(line = %line, "discarding inbound line");
            discarded += 1;
        }
        self.draining = false;
        info!(discarded, "queues drained, ready for reconnect");
        result
    }

    fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        loop {
            let mut idle = true;
            while let Ok(line) = self.inbound.try_recv() {
                debug!(line = %line, "discarding inbound line");
                discarded += 1;
                idle = false;
            }
            if let Some(delivery) = self.meta.try_recv() {
                debug!(meta = ?delivery.value(), "discarding meta notification");
                delivery.complete();
                idle = false;
            }
            if idle {
                return discarded;
            }
        }
    }
}
