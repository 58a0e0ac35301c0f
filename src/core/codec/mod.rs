//! Newline conventions and byte rendering helpers
//!
//! Supports:
//! - LF (no translation)
//! - CR (carriage return only)
//! - CRLF (carriage return + line feed)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Carriage return
pub const CR: u8 = b'\r';

/// Line feed, the logical newline on the local side
pub const LF: u8 = b'\n';

/// Newline convention on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LineEnding {
    /// Line Feed only, no translation
    #[default]
    Lf,
    /// Carriage Return only
    Cr,
    /// Both CR and LF
    CrLf,
}

impl LineEnding {
    /// Wire bytes for one logical newline
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            Self::Lf => b"\n",
            Self::Cr => b"\r",
            Self::CrLf => b"\r\n",
        }
    }

    /// Get all conventions
    pub fn all() -> &'static [LineEnding] {
        &[Self::Lf, Self::Cr, Self::CrLf]
    }
}

impl fmt::Display for LineEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lf => write!(f, "lf"),
            Self::Cr => write!(f, "cr"),
            Self::CrLf => write!(f, "crlf"),
        }
    }
}

/// Unknown line ending name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown line ending '{0}' (expected lf, cr or crlf)")]
pub struct ParseLineEndingError(String);

impl FromStr for LineEnding {
    type Err = ParseLineEndingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lf" => Ok(Self::Lf),
            "cr" => Ok(Self::Cr),
            "crlf" => Ok(Self::CrLf),
            _ => Err(ParseLineEndingError(s.to_string())),
        }
    }
}

/// Render bytes with control characters escaped (`\r`, `\n`, `\x1b`, ...)
///
/// Used for trace output of relayed traffic.
pub fn escape_bytes(data: &[u8]) -> String {
    let mut output = String::with_capacity(data.len() * 2);

    for &byte in data {
        match byte {
            b'\r' => output.push_str("\\r"),
            b'\n' => output.push_str("\\n"),
            b'\t' => output.push_str("\\t"),
            b'\0' => output.push_str("\\0"),
            b'\\' => output.push_str("\\\\"),
            b if b.is_ascii_graphic() || b == b' ' => output.push(b as char),
            b => output.push_str(&format!("\\x{b:02x}")),
        }
    }

    output
}
