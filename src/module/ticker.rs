//! Market ticker module.
//!
//! Periodically fetches a quote page per symbol, scrapes the price and daily
//! change out of it, and posts one line per symbol to the configured channel.
//! Answers `&ticker [symbol]` and `&calc <symbol> <count>` from the quotes
//! cached by the last run.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info, warn};

use super::{CommandContext, Module, Schedule};
use crate::casemap::irc_eq;
use crate::config::TickerConfig;
use crate::engine::Outbox;
use crate::error::ModuleError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A scraped quote.
#[derive(Clone, Debug, PartialEq)]
pub struct Quote {
    /// Price as parsed.
    pub price: f64,
    /// Price exactly as the page shows it.
    pub price_text: String,
    /// Change for the day, display only.
    pub change: String,
}

/// Where quotes come from.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch(&self, symbol: &str) -> Result<Quote, ModuleError>;
}

/// Scrapes quotes from an HTML quote page.
#[derive(Debug)]
pub struct HttpQuoteSource {
    client: reqwest::Client,
    url_prefix: String,
    price: Regex,
    change: Regex,
}

impl HttpQuoteSource {
    /// Build from the ticker settings and an optional User-Agent.
    pub fn from_config(cfg: &TickerConfig, user_agent: Option<&str>) -> Result<Self, ModuleError> {
        let mut builder = reqwest::Client::builder().timeout(HTTP_TIMEOUT);
        if let Some(ua) = user_agent {
            builder = builder.user_agent(ua);
        }
        Ok(Self {
            client: builder.build()?,
            url_prefix: cfg.url_prefix.clone(),
            price: Regex::new(&cfg.price_pattern)?,
            change: Regex::new(&cfg.change_pattern)?,
        })
    }

    /// Pull a quote for `symbol` out of a fetched page.
    pub fn extract(&self, symbol: &str, body: &str) -> Result<Quote, ModuleError> {
        let price_text = capture(&self.price, body).ok_or_else(|| ModuleError::Extract {
            symbol: symbol.to_owned(),
            what: "current value",
        })?;
        let change = capture(&self.change, body).ok_or_else(|| ModuleError::Extract {
            symbol: symbol.to_owned(),
            what: "value change",
        })?;
        let price = price_text.parse::<f64>().map_err(|_| ModuleError::Extract {
            symbol: symbol.to_owned(),
            what: "numeric price",
        })?;
        Ok(Quote {
            price,
            price_text: price_text.to_owned(),
            change: change.to_owned(),
        })
    }
}

fn capture<'h>(re: &Regex, haystack: &'h str) -> Option<&'h str> {
    re.captures(haystack)?.get(1).map(|m| m.as_str())
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    async fn fetch(&self, symbol: &str) -> Result<Quote, ModuleError> {
        let url = format!("{}{}", self.url_prefix, symbol);
        info!(url = %url, "ticker requesting");

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(ModuleError::Status(status.as_u16()));
        }
        let body = resp.text().await?;
        self.extract(symbol, &body)
    }
}

#[derive(Clone, Debug)]
struct CachedQuote {
    price: f64,
    line: String,
}

/// The ticker module.
pub struct Ticker {
    symbols: Vec<String>,
    channel: String,
    execute_on_join: bool,
    force_run: bool,
    schedule: Schedule,
    source: Box<dyn QuoteSource>,
    cache: HashMap<String, CachedQuote>,
}

impl Ticker {
    pub fn new(
        symbols: Vec<String>,
        channel: String,
        schedule: Schedule,
        source: Box<dyn QuoteSource>,
    ) -> Self {
        Self {
            symbols,
            channel,
            execute_on_join: false,
            force_run: false,
            schedule,
            source,
            cache: HashMap::new(),
        }
    }

    pub fn from_config(cfg: &TickerConfig, source: Box<dyn QuoteSource>, now: DateTime<Utc>) -> Self {
        let schedule = Schedule::every(cfg.interval, now)
            .with_window(cfg.schedule_utc_start, cfg.schedule_utc_stop)
            .excluding(cfg.exclude_days.iter().copied());
        Self::new(cfg.symbols.clone(), cfg.channel.clone(), schedule, source)
            .execute_on_join(cfg.execute_on_join)
    }

    /// Run right after joining the ticker channel.
    pub fn execute_on_join(mut self, enabled: bool) -> Self {
        self.execute_on_join = enabled;
        self
    }

    async fn ticker_command(&self, cmd: &CommandContext<'_>, outbox: &Outbox) -> Result<(), ModuleError> {
        let reply = cmd.reply_target();
        match cmd.args.first() {
            None => {
                let mut symbols: Vec<&str> = self.cache.keys().map(String::as_str).collect();
                symbols.sort_unstable();
                let text = format!("[ticker] available symbols: {}", symbols.join(" "));
                outbox.privmsg(reply, &text).await?;
            }
            Some(symbol) => {
                if let Some(entry) = self.cache.get(&symbol.to_uppercase()) {
                    outbox.privmsg(reply, &entry.line).await?;
                }
            }
        }
        Ok(())
    }

    async fn calc_command(&self, cmd: &CommandContext<'_>, outbox: &Outbox) -> Result<(), ModuleError> {
        let reply = cmd.reply_target();
        let (symbol, count) = match cmd.args {
            [symbol, count, ..] => (symbol.to_uppercase(), *count),
            _ => {
                outbox.privmsg(reply, "[calc] usage: &calc <symbol> <count>").await?;
                return Ok(());
            }
        };

        let Some(entry) = self.cache.get(&symbol) else {
            debug!(symbol = %symbol, "calc for uncached symbol");
            return Ok(());
        };
        let Some(units) = parse_units(count) else {
            warn!(count, "ticker error in unit conversion");
            return Ok(());
        };
        if units <= 0 {
            return Ok(());
        }

        let total = units as f64 * entry.price;
        let text = format!(
            "[calc] {} {} x ${} = ${}",
            symbol,
            group_thousands(&units.to_string()),
            format_amount(entry.price, 4),
            format_amount(total, 2),
        );
        outbox.privmsg(reply, &text).await?;
        Ok(())
    }
}

#[async_trait]
impl Module for Ticker {
    fn name(&self) -> &str {
        "ticker"
    }

    fn should_run(&mut self, now: DateTime<Utc>) -> bool {
        if self.force_run {
            self.force_run = false;
            return true;
        }
        self.schedule.due(now)
    }

    fn should_run_on_join(&mut self, channel: &str) -> bool {
        let run = self.execute_on_join && irc_eq(&self.channel, channel);
        if run {
            self.schedule.rewind();
            self.force_run = true;
            info!(last_run = %self.schedule.last_run(), "ticker last run wound back");
        }
        run
    }

    async fn execute(&mut self, now: DateTime<Utc>, outbox: &Outbox) -> Result<(), ModuleError> {
        self.schedule.record_run(now);
        info!("ticker module executing");

        for symbol in &self.symbols {
            let quote = match self.source.fetch(symbol).await {
                Ok(quote) => quote,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "ticker error in fetch data");
                    continue;
                }
            };
            let line = format!("[ticker] {} {} {}", symbol, quote.price_text, quote.change);
            outbox.privmsg(&self.channel, &line).await?;
            self.cache.insert(
                symbol.to_uppercase(),
                CachedQuote {
                    price: quote.price,
                    line,
                },
            );
        }
        Ok(())
    }

    fn handles_command(&self, token: &str) -> bool {
        token == "&ticker" || token == "&calc"
    }

    async fn handle_command(&mut self, cmd: &CommandContext<'_>, outbox: &Outbox) -> Result<(), ModuleError> {
        match cmd.token {
            "&ticker" => self.ticker_command(cmd, outbox).await,
            "&calc" => self.calc_command(cmd, outbox).await,
            _ => Ok(()),
        }
    }
}

/// Parse a unit count such as `1,500`, `2k` or `3M`.
pub fn parse_units(count: &str) -> Option<i64> {
    let mut digits = String::with_capacity(count.len() + 6);
    for c in count.chars() {
        match c {
            ',' => {}
            'k' | 'K' => digits.push_str("000"),
            'm' | 'M' => digits.push_str("000000"),
            c => digits.push(c),
        }
    }
    digits.parse().ok()
}

/// Insert `,` every three digits into the integer part of `digits`.
fn group_thousands(digits: &str) -> String {
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits),
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    out.push_str(sign);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format with a fixed number of decimals and grouped thousands.
pub fn format_amount(value: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, value);
    match fixed.split_once('.') {
        Some((int, frac)) => format!("{}.{}", group_thousands(int), frac),
        None => group_thousands(&fixed),
    }
}
