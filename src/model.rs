use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::ErrorKind;

/// Types of signals found in automation logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Boolean,
    Integer,
    String,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Boolean => "boolean",
            SignalType::Integer => "integer",
            SignalType::String => "string",
        }
    }
}

/// A signal value. Carries no unit; interpretation is dialect-specific.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    pub fn signal_type(&self) -> SignalType {
        match self {
            Value::Bool(_) => SignalType::Boolean,
            Value::Int(_) => SignalType::Integer,
            Value::Str(_) => SignalType::String,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

/// A single normalized entry from an automation log file.
///
/// Immutable once constructed; collections own their entries and hand out
/// clones at cache boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub device_id: String,
    pub signal_name: String,
    pub timestamp: NaiveDateTime,
    pub value: Value,
    pub signal_type: SignalType,
}

impl LogEntry {
    /// Combined `device::signal` key used by signal and device indexes.
    pub fn signal_key(&self) -> String {
        format!("{}::{}", self.device_id, self.signal_name)
    }
}

/// Result of successfully parsing one or more log files.
///
/// `signals`, `devices` and `time_range` are always the exact projection of
/// `entries`; they are computed at construction and never hand-edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedLog {
    entries: Vec<LogEntry>,
    signals: BTreeSet<String>,
    devices: BTreeSet<String>,
    time_range: Option<(NaiveDateTime, NaiveDateTime)>,
}

impl ParsedLog {
    /// Build a log from time-ascending entries, deriving the indexes.
    ///
    /// Callers are responsible for ordering; the parse driver and merge
    /// engine sort before constructing.
    pub fn from_sorted_entries(entries: Vec<LogEntry>) -> Self {
        let mut signals = BTreeSet::new();
        let mut devices = BTreeSet::new();
        for entry in &entries {
            signals.insert(entry.signal_key());
            devices.insert(entry.device_id.clone());
        }
        let time_range = match (entries.first(), entries.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        };
        Self {
            entries,
            signals,
            devices,
            time_range,
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn signals(&self) -> &BTreeSet<String> {
        &self.signals
    }

    pub fn devices(&self) -> &BTreeSet<String> {
        &self.devices
    }

    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        self.time_range
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Consume the log, handing ownership of the entries to the caller.
    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

/// An error encountered during parsing, with enough context to be
/// actionable without re-reading the source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseError {
    /// 1-based line number; 0 for file-scope errors.
    pub line: usize,
    /// Raw offending text, trailing newline stripped.
    pub content: String,
    pub reason: String,
    pub file_path: Option<PathBuf>,
    pub kind: ErrorKind,
}

impl ParseError {
    pub fn line(line: usize, content: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self {
            line,
            content: content.into(),
            reason: reason.to_string(),
            file_path: None,
            kind: ErrorKind::Line,
        }
    }

    pub fn file_scope(kind: ErrorKind, reason: impl std::fmt::Display) -> Self {
        Self {
            line: 0,
            content: String::new(),
            reason: reason.to_string(),
            file_path: None,
            kind,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file_path {
            Some(path) => write!(f, "line {} [{}]: {}", self.line, path.display(), self.reason),
            None => write!(f, "line {}: {}", self.line, self.reason),
        }
    }
}

/// Complete outcome of parsing: data when anything was recovered, plus all
/// per-line errors. A result can be successful and still carry errors
/// (partial parse).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub data: Option<ParsedLog>,
    pub errors: Vec<ParseError>,
}

impl ParseResult {
    pub fn failure(errors: Vec<ParseError>) -> Self {
        Self { data: None, errors }
    }

    /// Build from parsed entries and accumulated errors. A parse with zero
    /// recovered entries carries no data, matching the per-file failure
    /// semantics of the registry and merge layers.
    pub fn from_entries(entries: Vec<LogEntry>, errors: Vec<ParseError>) -> Self {
        if entries.is_empty() {
            Self { data: None, errors }
        } else {
            Self {
                data: Some(ParsedLog::from_sorted_entries(entries)),
                errors,
            }
        }
    }

    pub fn success(&self) -> bool {
        self.data.is_some()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry(device: &str, signal: &str, secs: u32, value: Value) -> LogEntry {
        let signal_type = value.signal_type();
        LogEntry {
            device_id: device.to_string(),
            signal_name: signal.to_string(),
            timestamp: NaiveDate::from_ymd_opt(2025, 9, 22)
                .unwrap()
                .and_hms_opt(13, 0, secs)
                .unwrap(),
            value,
            signal_type,
        }
    }

    #[test]
    fn parsed_log_derives_indexes_from_entries() {
        let log = ParsedLog::from_sorted_entries(vec![
            entry("DEV_A", "MOTOR", 1, Value::Bool(true)),
            entry("DEV_A", "SPEED", 2, Value::Int(120)),
            entry("DEV_B", "MOTOR", 3, Value::Bool(false)),
        ]);

        assert_eq!(log.entry_count(), 3);
        assert_eq!(log.signal_count(), 3);
        assert_eq!(log.device_count(), 2);
        assert!(log.signals().contains("DEV_A::MOTOR"));
        assert!(log.signals().contains("DEV_B::MOTOR"));

        let (start, end) = log.time_range().unwrap();
        assert_eq!(start, log.entries()[0].timestamp);
        assert_eq!(end, log.entries()[2].timestamp);
    }

    #[test]
    fn empty_log_has_no_range() {
        let log = ParsedLog::from_sorted_entries(Vec::new());
        assert!(log.time_range().is_none());
        assert_eq!(log.entry_count(), 0);
    }

    #[test]
    fn result_without_entries_is_failure() {
        let result = ParseResult::from_entries(Vec::new(), vec![]);
        assert!(!result.success());
        assert!(!result.has_errors());
    }

    #[test]
    fn result_can_succeed_with_errors() {
        let result = ParseResult::from_entries(
            vec![entry("DEV_A", "MOTOR", 1, Value::Bool(true))],
            vec![ParseError::line(2, "garbage", "line does not match format")],
        );
        assert!(result.success());
        assert!(result.has_errors());
        assert_eq!(result.error_count(), 1);
    }
}
