//! Pluggable bot modules.
//!
//! The engine polls every registered [`Module`] on each periodic tick and runs
//! the ones that report themselves due. Modules also get a look at channel
//! joins and may claim chat commands. All of this happens on the engine task,
//! so a module that blocks for long delays protocol handling too.

pub mod schedule;
pub mod scribe;
pub mod ticker;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::casemap::is_channel_name;
use crate::config::Config;
use crate::engine::Outbox;
use crate::error::ModuleError;
use crate::source::Source;

pub use schedule::Schedule;
pub use scribe::Scribe;
pub use ticker::{HttpQuoteSource, Quote, QuoteSource, Ticker};

/// A chat command addressed to the bot.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    /// Who sent it.
    pub source: &'a Source,
    /// The PRIVMSG target: a channel, or our own nick.
    pub target: &'a str,
    /// The command word, e.g. `&ticker`.
    pub token: &'a str,
    /// Remaining words.
    pub args: &'a [&'a str],
}

impl<'a> CommandContext<'a> {
    /// Where replies should go: the channel, or the sender for private
    /// messages.
    pub fn reply_target(&self) -> &'a str {
        if is_channel_name(self.target) {
            self.target
        } else {
            self.source.nick().unwrap_or(self.target)
        }
    }
}

/// A unit of scheduled or reactive bot behavior.
#[async_trait]
pub trait Module: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether the module wants to run at `now`. Polled once per tick.
    fn should_run(&mut self, now: DateTime<Utc>) -> bool;

    /// Called after we join `channel`. Return `true` to be considered due on
    /// the next tick regardless of schedule.
    fn should_run_on_join(&mut self, _channel: &str) -> bool {
        false
    }

    /// Do the work. Lines go out through `outbox`.
    async fn execute(&mut self, now: DateTime<Utc>, outbox: &Outbox) -> Result<(), ModuleError>;

    /// Whether this module answers the command word `token`.
    fn handles_command(&self, _token: &str) -> bool {
        false
    }

    /// Answer a command claimed by [`Module::handles_command`].
    async fn handle_command(
        &mut self,
        _cmd: &CommandContext<'_>,
        _outbox: &Outbox,
    ) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Build every module enabled in `config`, in a fixed order.
pub fn from_config(config: &Config, now: DateTime<Utc>) -> Result<Vec<Box<dyn Module>>, ModuleError> {
    let mut modules: Vec<Box<dyn Module>> = Vec::new();

    if let Some(cfg) = &config.ticker {
        let source = HttpQuoteSource::from_config(cfg, config.http.user_agent.as_deref())?;
        modules.push(Box::new(Ticker::from_config(cfg, Box::new(source), now)));
        info!(symbols = cfg.symbols.len(), channel = %cfg.channel, "ticker module enabled");
    }

    if let Some(cfg) = &config.scribe {
        modules.push(Box::new(Scribe::from_config(cfg, now)));
        info!(channel = %cfg.channel, datapath = %cfg.datapath.display(), "scribe module enabled");
    }

    Ok(modules)
}
