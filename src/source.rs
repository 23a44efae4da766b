//! Source prefix of an inbound line.
//!
//! A line such as `:nick!ident@host PRIVMSG #chan :hi` carries the sender
//! in its first token. Servers send a bare name instead (`:irc.example.net`).

use std::fmt;

use crate::casemap::irc_eq;
use crate::error::SourceError;

/// Who sent an inbound line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// A server name.
    Server {
        /// Server name as sent.
        name: String,
    },
    /// A user identified by `nick!ident@host`.
    User {
        /// Nickname.
        nick: String,
        /// Username (ident).
        ident: String,
        /// Hostname.
        host: String,
    },
}

impl Source {
    /// Parse a prefix token including its leading `:`.
    pub fn parse(token: &str) -> Result<Self, SourceError> {
        let body = match token.strip_prefix(':') {
            Some(body) if !body.is_empty() => body,
            _ => return Err(SourceError::Malformed(token.to_owned())),
        };

        let mut parts = body.split('!');
        let head = parts.next().unwrap_or_default();
        let Some(rest) = parts.next() else {
            return Ok(Source::Server {
                name: body.to_owned(),
            });
        };
        if parts.next().is_some() || head.is_empty() {
            return Err(SourceError::Malformed(token.to_owned()));
        }

        match rest.split_once('@') {
            Some((ident, host)) if !host.contains('@') => Ok(Source::User {
                nick: head.to_owned(),
                ident: ident.to_owned(),
                host: host.to_owned(),
            }),
            _ => Err(SourceError::MissingHost(token.to_owned())),
        }
    }

    /// The nick of a user source.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Source::User { nick, .. } => Some(nick),
            Source::Server { .. } => None,
        }
    }

    /// True if this is a user whose nick matches `own_nick`.
    pub fn is_me(&self, own_nick: &str) -> bool {
        self.nick().is_some_and(|nick| irc_eq(nick, own_nick))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Server { name } => f.write_str(name),
            Source::User { nick, ident, host } => write!(f, "{}!{}@{}", nick, ident, host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user() {
        let src = Source::parse(":kraz!bot@example.org").unwrap();
        assert_eq!(
            src,
            Source::User {
                nick: "kraz".to_string(),
                ident: "bot".to_string(),
                host: "example.org".to_string(),
            }
        );
        assert_eq!(src.to_string(), "kraz!bot@example.org");
    }

    #[test]
    fn test_parse_server() {
        let src = Source::parse(":irc.example.net").unwrap();
        assert_eq!(
            src,
            Source::Server {
                name: "irc.example.net".to_string()
            }
        );
        assert_eq!(src.nick(), None);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(Source::parse("kraz"), Err(SourceError::Malformed(_))));
        assert!(matches!(Source::parse(":"), Err(SourceError::Malformed(_))));
        assert!(matches!(Source::parse(":a!b!c@d"), Err(SourceError::Malformed(_))));
        assert!(matches!(Source::parse(":!b@c"), Err(SourceError::Malformed(_))));
    }

    #[test]
    fn test_parse_missing_host() {
        assert_eq!(
            Source::parse(":kraz!bot"),
            Err(SourceError::MissingHost(":kraz!bot".to_string()))
        );
        assert!(matches!(
            Source::parse(":kraz!bot@a@b"),
            Err(SourceError::MissingHost(_))
        ));
    }

    #[test]
    fn test_is_me_uses_casemapping() {
        let src = Source::parse(":Kraz[1]!bot@host").unwrap();
        assert!(src.is_me("kraz{1}"));
        assert!(!src.is_me("other"));

        let server = Source::parse(":kraz").unwrap();
        assert!(!server.is_me("kraz"));
    }
}
