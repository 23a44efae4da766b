//! Server numerics the engine reacts to.
//!
//! Only the registration and SASL numerics matter to the bot; everything
//! else is logged and ignored.
//!
//! # Reference
//! - Modern IRC documentation: <https://modern.ircdocs.horse/>
//! - IRCv3 SASL: <https://ircv3.net/specs/extensions/sasl-3.2>

#![allow(non_camel_case_types)]

use std::str::FromStr;

/// A numeric reply understood by the protocol engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
#[non_exhaustive]
pub enum Response {
    /// 001 - Welcome to the IRC network
    RPL_WELCOME = 1,
    /// 902 - Nick locked
    ERR_NICKLOCKED = 902,
    /// 903 - SASL success
    RPL_SASLSUCCESS = 903,
    /// 904 - SASL fail
    ERR_SASLFAIL = 904,
    /// 905 - SASL too long
    ERR_SASLTOOLONG = 905,
    /// 906 - SASL aborted
    ERR_SASLABORT = 906,
    /// 907 - SASL already authenticated
    ERR_SASLALREADY = 907,
}

impl Response {
    /// Returns the numeric code as u16
    #[inline]
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Creates a Response from a numeric code
    pub fn from_code(code: u16) -> Option<Response> {
        Some(match code {
            1 => Response::RPL_WELCOME,
            902 => Response::ERR_NICKLOCKED,
            903 => Response::RPL_SASLSUCCESS,
            904 => Response::ERR_SASLFAIL,
            905 => Response::ERR_SASLTOOLONG,
            906 => Response::ERR_SASLABORT,
            907 => Response::ERR_SASLALREADY,
            _ => return None,
        })
    }

    /// True for the numerics that end a SASL exchange without success.
    #[inline]
    pub fn is_sasl_failure(&self) -> bool {
        matches!(
            self,
            Response::ERR_NICKLOCKED
                | Response::ERR_SASLFAIL
                | Response::ERR_SASLTOOLONG
                | Response::ERR_SASLABORT
        )
    }
}

impl FromStr for Response {
    type Err = ParseResponseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 3 {
            return Err(ParseResponseError::InvalidFormat);
        }
        let code: u16 = s.parse().map_err(|_| ParseResponseError::InvalidFormat)?;
        Response::from_code(code).ok_or(ParseResponseError::UnknownCode(code))
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}", self.code())
    }
}

/// Error when parsing a response code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ParseResponseError {
    /// The token is not a three digit number
    #[error("invalid response code format")]
    InvalidFormat,
    /// The numeric code is not one the engine handles
    #[error("unknown response code: {0}")]
    UnknownCode(u16),
}
