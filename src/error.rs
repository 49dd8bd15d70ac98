use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification carried on every `ParseError` so callers can distinguish
/// bad input from caller misconfiguration without matching reason strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// One malformed line; parsing continued.
    Line,
    /// File unreadable or missing; fatal for that file only.
    Io,
    /// No registered dialect matched and no default exists.
    NoParserFound,
    /// An explicitly requested parser name is not registered.
    UnknownParser,
}

/// Failure to decode a single log line. Recorded as one `ParseError`;
/// never aborts the parse.
#[derive(Debug, Error)]
pub enum LineError {
    #[error("line does not match {0} format")]
    Grammar(&'static str),

    #[error("invalid timestamp: {0}")]
    Timestamp(String),

    #[error("invalid boolean value: {0}")]
    BoolValue(String),

    #[error("invalid integer value: {0}")]
    IntValue(String),

    #[error("invalid type: {0}")]
    SignalType(String),
}

/// Failure to select a parser for a file.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no suitable parser found")]
    NoParserFound,

    #[error("parser '{0}' not found")]
    UnknownParser(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::NoParserFound => ErrorKind::NoParserFound,
            RegistryError::UnknownParser(_) => ErrorKind::UnknownParser,
        }
    }
}
