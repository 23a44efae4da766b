//! Nick and channel name comparison.
//!
//! Servers compare names with the `rfc1459` case mapping, where `[]\~`
//! are the uppercase forms of `{}|^`. The bot uses the same rules when
//! deciding whether a JOIN or KICK concerns itself or a configured channel.

#[inline]
fn fold(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => c.to_ascii_lowercase(),
        _ => c,
    }
}

/// Compare two names using the RFC 1459 case mapping.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.chars().zip(b.chars()).all(|(x, y)| fold(x) == fold(y))
}

/// True if `target` names a channel rather than a nick.
pub fn is_channel_name(target: &str) -> bool {
    matches!(target.as_bytes().first(), Some(b'#' | b'&'))
}
