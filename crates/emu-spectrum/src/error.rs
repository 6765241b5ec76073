//! Error classification for call sites that need to branch on error kind
//! (CLI validation, load-vs-continue policy). Parsers elsewhere keep
//! returning `Result<T, String>`; this enum exists only where a caller
//! must distinguish IO/format/unsupported/config failures.

use std::fmt;

#[derive(Debug)]
pub enum SpectrumError {
    Io(std::io::Error),
    Format(String),
    Unsupported(String),
    Config(String),
}

impl fmt::Display for SpectrumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Format(msg) => write!(f, "format error: {msg}"),
            Self::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for SpectrumError {}

impl From<std::io::Error> for SpectrumError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
