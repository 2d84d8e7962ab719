//! Session identifier type.

use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;

/// Number of random bytes in a generated identifier.
const ID_BYTES: usize = 32;

/// Longest identifier accepted from a caller.
const MAX_ID_LEN: usize = 128;

/// Unique identifier for a session.
///
/// Generated identifiers are 32 bytes from the operating system CSPRNG,
/// hex encoded. Identifiers supplied from outside (cookie, header) are
/// accepted if they only contain `[A-Za-z0-9,-]`, which keeps them safe
/// to use as file names and cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session ID.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether a string is a well-formed identifier.
    pub fn is_valid(s: &str) -> bool {
        !s.is_empty()
            && s.len() <= MAX_ID_LEN
            && s
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b',' || b == b'-')
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionId {
    type Err = crate::error::SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if Self::is_valid(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(crate::error::SessionError::InvalidSessionId(s.into()))
        }
    }
}
