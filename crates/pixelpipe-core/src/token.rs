//! Short interned string tokens.
//!
//! Modules, instances, connectors, kernels and parameters are all addressed
//! by tokens: up to eight ASCII bytes packed into a `u64`. Tokens compare and
//! hash as plain integers, which keeps graph lookups cheap and makes the
//! textual graph description (`ascii` module) trivially reversible.

use std::fmt;
use std::str::FromStr;

/// An interned name of at most eight ASCII bytes.
///
/// Longer strings are truncated to eight bytes; the empty token is a valid
/// "unset" value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Token(u64);

impl Token {
    /// The empty token.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Intern a string, keeping at most the first eight bytes.
    pub fn new(s: &str) -> Self {
        let mut raw = [0u8; 8];
        for (dst, src) in raw.iter_mut().zip(s.bytes()) {
            *dst = src;
        }
        Self(u64::from_le_bytes(raw))
    }

    /// The wildcard token `*`, used in format negotiation.
    pub fn wildcard() -> Self {
        Self::new("*")
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Self::wildcard()
    }

    /// Raw packed value, usable as a stable hash key.
    pub fn raw(&self) -> u64 {
        self.0
    }

    fn bytes(&self) -> impl Iterator<Item = u8> {
        self.0
            .to_le_bytes()
            .into_iter()
            .take_while(|&b| b != 0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.bytes() {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl FromStr for Token {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
