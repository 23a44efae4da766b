//! Configuration loading and validation.
//!
//! The bot reads a single TOML file at startup. Anything wrong with it is
//! fatal: the process refuses to start rather than connect half-configured.
//!
//! ```toml
//! nick = "kraz"
//! servers = ["irc.libera.chat:6697", "irc.eu.libera.chat:6697"]
//! channels = ["#stocks"]
//!
//! [sasl]
//! username = "kraz"
//! password = "hunter2"
//!
//! [ticker]
//! symbols = ["AAPL", "MSFT"]
//! channel = "#stocks"
//! interval = "30m"
//! exclude_days = ["Sat", "Sun"]
//! schedule_utc_start = 13
//! schedule_utc_stop = 21
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Weekday;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::casemap::is_channel_name;
use crate::sasl::Credentials;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("nick is required")]
    MissingNick,
    #[error("at least one server is required")]
    NoServers,
    #[error("server address must be host:port, got '{0}'")]
    InvalidServer(String),
    #[error("channel names must start with '#' or '&', got '{0}'")]
    InvalidChannel(String),
    #[error("{section}.interval must be positive")]
    ZeroInterval { section: &'static str },
    #[error("ticker.symbols must not be empty")]
    NoSymbols,
    #[error("ticker schedule hours must satisfy 0 <= start <= stop <= 23, got {start}..={stop}")]
    InvalidHours { start: u32, stop: u32 },
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Nickname, also used as ident and realname.
    pub nick: String,
    /// `host:port` entries, tried in order on every reconnect.
    pub servers: Vec<String>,
    /// Channels to keep joined.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Validate server certificates (default: true).
    #[serde(default = "default_true")]
    pub verify_cert: bool,
    /// SASL PLAIN credentials. Without them the bot registers with NICK/USER.
    pub sasl: Option<Credentials>,
    #[serde(default)]
    pub http: HttpConfig,
    pub ticker: Option<TickerConfig>,
    pub scribe: Option<ScribeConfig>,
}

/// Outbound HTTP settings shared by modules.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfig {
    pub user_agent: Option<String>,
}

/// Market ticker module settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerConfig {
    pub symbols: Vec<String>,
    pub channel: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    /// Post quotes right after joining `channel`.
    #[serde(default)]
    pub execute_on_join: bool,
    #[serde(default)]
    pub exclude_days: Vec<Weekday>,
    /// First UTC hour a run is allowed.
    #[serde(default)]
    pub schedule_utc_start: u32,
    /// Last UTC hour a run is allowed (inclusive).
    #[serde(default = "default_stop_hour")]
    pub schedule_utc_stop: u32,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
    #[serde(default = "default_price_pattern")]
    pub price_pattern: String,
    #[serde(default = "default_change_pattern")]
    pub change_pattern: String,
}

impl TickerConfig {
    /// Settings with every optional key at its default and an hourly interval.
    pub fn for_symbols(symbols: Vec<String>, channel: &str) -> Self {
        Self {
            symbols,
            channel: channel.to_owned(),
            interval: Duration::from_secs(3600),
            execute_on_join: false,
            exclude_days: Vec::new(),
            schedule_utc_start: 0,
            schedule_utc_stop: default_stop_hour(),
            url_prefix: default_url_prefix(),
            price_pattern: default_price_pattern(),
            change_pattern: default_change_pattern(),
        }
    }
}

/// File-based content module settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ScribeConfig {
    pub channel: String,
    pub datapath: PathBuf,
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
}

fn default_true() -> bool {
    true
}

fn default_stop_hour() -> u32 {
    23
}

fn default_url_prefix() -> String {
    "https://ca.finance.yahoo.com/quote/".to_string()
}

fn default_price_pattern() -> String {
    r#"data-reactid="\d+">([0-9.]+)</span><span class"#.to_string()
}

fn default_change_pattern() -> String {
    r#"data-reactid="\d+">([+-]?[0-9.]+ \([+-]?[0-9.%]+\))</span><div id"#.to_string()
}

/// Parse a duration such as `90`, `45s`, `30m`, `2h` or `1d`.
///
/// A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (num_str, unit) = if let Some(stripped) = s.strip_suffix('d') {
        (stripped, 86_400)
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, 3_600)
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 60)
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 1)
    } else {
        (s, 1)
    };

    let num: u64 = num_str.trim().parse().ok()?;
    num.checked_mul(unit).map(Duration::from_secs)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid duration '{}'", raw)))
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    /// Check the invariants the runtime relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nick.trim().is_empty() {
            return Err(ConfigError::MissingNick);
        }
        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        for server in &self.servers {
            let valid = server
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !valid {
                return Err(ConfigError::InvalidServer(server.clone()));
            }
        }

        let mut channels: Vec<&str> = self.channels.iter().map(String::as_str).collect();
        if let Some(ticker) = &self.ticker {
            channels.push(&ticker.channel);
        }
        if let Some(scribe) = &self.scribe {
            channels.push(&scribe.channel);
        }
        if let Some(bad) = channels.into_iter().find(|c| !is_channel_name(c)) {
            return Err(ConfigError::InvalidChannel(bad.to_owned()));
        }

        if let Some(ticker) = &self.ticker {
            if ticker.symbols.is_empty() {
                return Err(ConfigError::NoSymbols);
            }
            if ticker.interval.is_zero() {
                return Err(ConfigError::ZeroInterval { section: "ticker" });
            }
            let (start, stop) = (ticker.schedule_utc_start, ticker.schedule_utc_stop);
            if start > stop || stop > 23 {
                return Err(ConfigError::InvalidHours { start, stop });
            }
        }
        if let Some(scribe) = &self.scribe {
            if scribe.interval.is_zero() {
                return Err(ConfigError::ZeroInterval { section: "scribe" });
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        nick = "kraz"
        servers = ["irc.example.net:6697"]
    "#;

    #[test]
    fn test_minimal_defaults() {
        let config: Config = MINIMAL.parse().unwrap();
        assert_eq!(config.nick, "kraz");
        assert!(config.verify_cert);
        assert!(config.channels.is_empty());
        assert!(config.sasl.is_none());
        assert!(config.http.user_agent.is_none());
        assert!(config.ticker.is_none());
        assert!(config.scribe.is_none());
    }

    #[test]
    fn test_full_config() {
        let toml = r##"
            nick = "kraz"
            servers = ["irc.example.net:6697", "[::1]:6697"]
            channels = ["#stocks", "&local"]
            verify_cert = false

            [sasl]
            username = "kraz"
            password = "secret"

            [http]
            user_agent = "Mozilla/5.0"

            [ticker]
            symbols = ["AAPL", "MSFT"]
            channel = "#stocks"
            interval = "30m"
            execute_on_join = true
            exclude_days = ["Sat", "Sun"]
            schedule_utc_start = 13
            schedule_utc_stop = 21

            [scribe]
            channel = "#stocks"
            datapath = "/var/lib/kraz"
            interval = "2h"
        "##;
        let config: Config = toml.parse().unwrap();
        assert!(!config.verify_cert);
        assert_eq!(config.channels, vec!["#stocks", "&local"]);
        assert_eq!(config.sasl.unwrap().username, "kraz");
        assert_eq!(config.http.user_agent.as_deref(), Some("Mozilla/5.0"));

        let ticker = config.ticker.unwrap();
        assert_eq!(ticker.interval, Duration::from_secs(1800));
        assert_eq!(ticker.exclude_days, vec![Weekday::Sat, Weekday::Sun]);
        assert_eq!((ticker.schedule_utc_start, ticker.schedule_utc_stop), (13, 21));
        assert_eq!(ticker.url_prefix, default_url_prefix());

        let scribe = config.scribe.unwrap();
        assert_eq!(scribe.interval, Duration::from_secs(7200));
        assert_eq!(scribe.datapath, PathBuf::from("/var/lib/kraz"));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("45s"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("30m"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_duration(" 2h "), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("1d"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("-5m"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_bad_duration_is_parse_error() {
        let toml = format!(
            "{}\n[scribe]\nchannel = \"#c\"\ndatapath = \"/tmp\"\ninterval = \"often\"\n",
            MINIMAL
        );
        let err = toml.parse::<Config>().unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("invalid duration 'often'"));
    }

    #[test]
    fn test_validation_errors() {
        let err = r#"nick = ""
            servers = ["a:1"]"#
            .parse::<Config>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingNick));

        let err = r#"nick = "k"
            servers = []"#
            .parse::<Config>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::NoServers));

        let err = r#"nick = "k"
            servers = ["irc.example.net"]"#
            .parse::<Config>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServer(_)));

        let err = r#"nick = "k"
            servers = ["a:1"]
            channels = ["stocks"]"#
            .parse::<Config>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidChannel(c) if c == "stocks"));
    }

    #[test]
    fn test_ticker_validation() {
        let base = |extra: &str| {
            format!(
                "{}\n[ticker]\nchannel = \"#s\"\ninterval = \"1h\"\n{}",
                MINIMAL, extra
            )
        };

        let err = base("symbols = []").parse::<Config>().unwrap_err();
        assert!(matches!(err, ConfigError::NoSymbols));

        let err = base("symbols = [\"A\"]\nschedule_utc_start = 22\nschedule_utc_stop = 21")
            .parse::<Config>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHours { start: 22, stop: 21 }));

        let err = base("symbols = [\"A\"]\nschedule_utc_stop = 24")
            .parse::<Config>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHours { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.servers, vec!["irc.example.net:6697"]);

        let err = Config::load("/nonexistent/kraz.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
