//! Connector pixel formats and wildcard negotiation.
//!
//! A format is a channel-layout token ("rgba", "rg", "r", "ssbo") paired
//! with an element-type token ("f16", "f32", "ui8", ...). Either field may
//! be the wildcard `*`, meaning "adopt whatever the peer declares". Two
//! concrete but different values never silently coerce: that is a
//! configuration error at connection time.

use crate::roi::Roi;
use crate::token::Token;

/// Channel layout plus element type of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    /// Channel layout token: "rgba", "rg", "r", "ssbo" or "*".
    pub chan: Token,
    /// Element type token: "f16", "f32", "ui8", "ui16", "ui32" or "*".
    pub dtype: Token,
}

impl Format {
    pub fn new(chan: &str, dtype: &str) -> Self {
        Self {
            chan: Token::new(chan),
            dtype: Token::new(dtype),
        }
    }

    pub fn wildcard() -> Self {
        Self::new("*", "*")
    }

    pub fn has_wildcard(&self) -> bool {
        self.chan.is_wildcard() || self.dtype.is_wildcard()
    }

    /// Resolve the formats of two connectors being wired together.
    ///
    /// Per field: equal values stay, a wildcard on one side adopts the
    /// concrete value of the other, two wildcards stay wildcard (resolved
    /// later or rejected at buffer sizing), and two differing concrete
    /// values are an error described by the returned message.
    pub fn negotiate(a: Format, b: Format) -> Result<Format, String> {
        let chan = negotiate_token(a.chan, b.chan)
            .ok_or_else(|| format!("channel layout mismatch: {} vs {}", a.chan, b.chan))?;
        let dtype = negotiate_token(a.dtype, b.dtype)
            .ok_or_else(|| format!("element type mismatch: {} vs {}", a.dtype, b.dtype))?;
        Ok(Format { chan, dtype })
    }

    /// Number of channels per element, if the layout is concrete.
    ///
    /// "ssbo" is an untyped buffer counted as one channel; "r"/"rg"/"rgb"/
    /// "rgba" count their letters.
    pub fn channel_count(&self) -> Option<u32> {
        let s = self.chan.to_string();
        match s.as_str() {
            "ssbo" => Some(1),
            "r" | "y" => Some(1),
            "rg" => Some(2),
            "rgb" => Some(3),
            "rgba" => Some(4),
            _ => None,
        }
    }

    /// Size of one element in bytes, if the type is concrete.
    pub fn dtype_size(&self) -> Option<u32> {
        let s = self.dtype.to_string();
        match s.as_str() {
            "ui8" => Some(1),
            "f16" | "ui16" => Some(2),
            "f32" | "ui32" => Some(4),
            _ => None,
        }
    }

    /// Byte size of a buffer holding this format over the given ROI.
    ///
    /// `None` if either field is still a wildcard or unknown.
    pub fn buffer_size(&self, roi: &Roi) -> Option<u64> {
        let chan = self.channel_count()? as u64;
        let elem = self.dtype_size()? as u64;
        Some(roi.pixels() * chan * elem)
    }
}

fn negotiate_token(a: Token, b: Token) -> Option<Token> {
    if a == b {
        Some(a)
    } else if a.is_wildcard() {
        Some(b)
    } else if b.is_wildcard() {
        Some(a)
    } else {
        None
    }
}
