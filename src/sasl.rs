//! SASL PLAIN helpers.
//!
//! The bot authenticates with the PLAIN mechanism (RFC 4616) during
//! capability negotiation. The payload is `authzid NUL authcid NUL password`,
//! base64 encoded, with the account name used for both identities.
//!
//! # Reference
//! - IRCv3 SASL: <https://ircv3.net/specs/extensions/sasl-3.2>
//! - RFC 4616 (PLAIN): <https://tools.ietf.org/html/rfc4616>
//!
//! # Example
//!
//! ```
//! use kraz::sasl::{Credentials, encode_plain};
//!
//! let creds = Credentials::new("u", "p");
//! assert_eq!(encode_plain(&creds), "dQB1AHA=");
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Maximum length of a single `AUTHENTICATE` payload.
///
/// Longer responses are split across several lines.
pub const SASL_CHUNK_SIZE: usize = 400;

/// Capability request sent when credentials are configured.
pub const CAP_REQ_SASL: &str = "CAP REQ :sasl";

/// Mechanism selection sent once the server acknowledges `sasl`.
pub const AUTHENTICATE_PLAIN: &str = "AUTHENTICATE PLAIN";

/// Ends capability negotiation.
pub const CAP_END: &str = "CAP END";

/// Account credentials for SASL PLAIN.
#[derive(Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Credentials {
    /// Account name, used as both authzid and authcid.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Build credentials from an account name and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Encode credentials for the PLAIN mechanism.
pub fn encode_plain(creds: &Credentials) -> String {
    let payload = format!(
        "{}\0{}\0{}",
        creds.username, creds.username, creds.password
    );
    BASE64.encode(payload.as_bytes())
}

/// Build the `AUTHENTICATE` lines that carry an encoded response.
///
/// Payloads are split into [`SASL_CHUNK_SIZE`] pieces. When the payload is
/// an exact multiple of the chunk size, a final `AUTHENTICATE +` tells the
/// server nothing more follows.
pub fn authenticate_lines(encoded: &str) -> Vec<String> {
    let mut lines: Vec<String> = encoded
        .as_bytes()
        .chunks(SASL_CHUNK_SIZE)
        .map(|chunk| format!("AUTHENTICATE {}", String::from_utf8_lossy(chunk)))
        .collect();

    if encoded.len() % SASL_CHUNK_SIZE == 0 {
        lines.push("AUTHENTICATE +".to_owned());
    }
    lines
}
