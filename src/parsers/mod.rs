//! Dialect parsers for the supported log formats.
//!
//! Dialect support is closed and explicit: one module per format, each
//! implementing [`Dialect`] and registered by name in the
//! [`crate::registry::ParserRegistry`]. The uniform `parse` /
//! `parse_time_window` / `stream_entries` operations live here and in
//! [`crate::parallel`]; dialects only supply the per-line hot path.

pub mod csv_signal;
pub mod generic;
pub mod mcs;
pub mod plc_debug;
pub mod plc_tab;

pub use csv_signal::CsvSignalDialect;
pub use generic::GenericDialect;
pub use mcs::McsDialect;
pub use plc_debug::PlcDebugDialect;
pub use plc_tab::PlcTabDialect;

// The full-parse entry point lives with the driver; surfaced here so the
// parser-facing API is complete in one place.
pub use crate::parallel::{parse, parse_with};

use chrono::NaiveDateTime;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

use crate::error::{ErrorKind, LineError};
use crate::model::{LogEntry, ParseError, ParseResult, SignalType, Value};
use crate::timestamp::RawTs;

/// How many lines `can_parse` samples before deciding.
const SNIFF_LINES: usize = 5;
/// Fraction of sampled lines that must match the dialect grammar.
const SNIFF_THRESHOLD: f64 = 0.6;

/// Whether a dialect emits exactly one entry per line. Batched parallel
/// reconstruction is only valid for one-per-line dialects; the others run
/// single-threaded so batch boundaries stay well-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineArity {
    OnePerLine,
    ManyPerLine,
}

/// Minimal decoded form of one entry: what a parse worker hands back to the
/// driver. Timestamps stay as [`RawTs`] tokens; the driver resolves them to
/// the canonical instant only after batch reassembly.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// 1-based source line number.
    pub line: usize,
    pub device_id: String,
    pub signal_name: String,
    pub ts: RawTs,
    pub value: Value,
    pub signal_type: SignalType,
}

impl RawRecord {
    /// Resolve into a [`LogEntry`], or a [`ParseError`] for a
    /// calendar-invalid date that survived the scan-time range checks.
    pub fn into_entry(self) -> Result<LogEntry, ParseError> {
        match self.ts.resolve() {
            Some(timestamp) => Ok(LogEntry {
                device_id: self.device_id,
                signal_name: self.signal_name,
                timestamp,
                value: self.value,
                signal_type: self.signal_type,
            }),
            None => {
                let token = format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
                    self.ts.year,
                    self.ts.month,
                    self.ts.day,
                    self.ts.hour,
                    self.ts.minute,
                    self.ts.second,
                    self.ts.millis
                );
                Err(ParseError::line(
                    self.line,
                    token.clone(),
                    LineError::Timestamp(token),
                ))
            }
        }
    }
}

/// One supported log text format.
///
/// Implementations are stateless; the registry shares them as
/// `Arc<dyn Dialect>` across threads.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn arity(&self) -> LineArity {
        LineArity::OnePerLine
    }

    /// Cheap grammar check used for sniffing only, never for correctness
    /// gating during an actual parse.
    fn matches_line(&self, line: &str) -> bool;

    /// Decode one line, pushing records onto `out`. Per-line failure is a
    /// [`LineError`]; the callers record it and continue with the next line.
    fn parse_line(&self, line_no: usize, line: &str, out: &mut Vec<RawRecord>)
        -> Result<(), LineError>;

    /// Scan just the timestamp prefix, without decoding the rest of the
    /// line. `None` when the prefix is absent or malformed; window parsing
    /// then falls back to a full decode of that line.
    fn scan_timestamp(&self, line: &str) -> Option<RawTs>;

    /// Sample up to five non-blank lines; true when at least 60% match the
    /// dialect grammar.
    fn can_parse(&self, path: &Path) -> bool {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(_) => return false,
        };
        let mut checked = 0usize;
        let mut matched = 0usize;
        let mut first = true;
        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => return false,
            };
            let line = if first {
                first = false;
                strip_bom(&line)
            } else {
                line.as_str()
            };
            if line.trim().is_empty() {
                continue;
            }
            checked += 1;
            if self.matches_line(line) {
                matched += 1;
            }
            if checked >= SNIFF_LINES {
                break;
            }
        }
        checked > 0 && (matched as f64 / checked as f64) >= SNIFF_THRESHOLD
    }
}

/// UTF-8 byte-order mark, present on files exported from Windows tooling.
pub(crate) fn strip_bom(line: &str) -> &str {
    line.strip_prefix('\u{feff}').unwrap_or(line)
}

/// Literal token classification shared by the inference dialects.
///
/// Precedence is fixed: exact boolean literal, then integer literal (with
/// sign and optional `0x` prefix), else string. Bare `0`/`1` stay integers
/// here; dialects that declare a boolean type accept them as booleans via
/// [`parse_declared_bool`].
pub fn infer_value(token: &str) -> (Value, SignalType) {
    let trimmed = token.trim();
    if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("on") {
        return (Value::Bool(true), SignalType::Boolean);
    }
    if trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off") {
        return (Value::Bool(false), SignalType::Boolean);
    }
    if let Some(int) = parse_int_literal(trimmed) {
        return (Value::Int(int), SignalType::Integer);
    }
    (Value::Str(trimmed.to_string()), SignalType::String)
}

/// Integer literal with optional sign and `0x`/`0X` base prefix.
pub fn parse_int_literal(token: &str) -> Option<i64> {
    let (negative, digits) = match token.as_bytes().first()? {
        b'-' => (true, &token[1..]),
        b'+' => (false, &token[1..]),
        _ => (false, token),
    };
    if digits.is_empty() {
        return None;
    }
    let magnitude = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// Boolean token under a declared boolean type: ON/OFF, TRUE/FALSE, 1/0.
pub fn parse_declared_bool(token: &str) -> Option<bool> {
    let trimmed = token.trim();
    if trimmed.eq_ignore_ascii_case("on")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed == "1"
    {
        Some(true)
    } else if trimmed.eq_ignore_ascii_case("off")
        || trimmed.eq_ignore_ascii_case("false")
        || trimmed == "0"
    {
        Some(false)
    } else {
        None
    }
}

/// Full single-threaded parse of a file. Also the fallback path of the
/// concurrent driver; both paths run the same per-line code so worker count
/// never changes the result.
pub fn parse_single_threaded(dialect: &dyn Dialect, path: &Path) -> ParseResult {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            return ParseResult::failure(vec![io_error(path, &err)]);
        }
    };

    let mut entries: Vec<LogEntry> = Vec::new();
    let mut errors: Vec<ParseError> = Vec::new();
    let mut scratch: Vec<RawRecord> = Vec::new();
    let mut monotonic = true;

    let mut line_no = 0usize;
    let mut first = true;
    for line in BufReader::new(file).lines() {
        line_no += 1;
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                errors.push(ParseError::file_scope(
                    ErrorKind::Io,
                    format!("failed to read {}: {}", path.display(), err),
                ));
                break;
            }
        };
        let line = if first {
            first = false;
            strip_bom(&line).to_string()
        } else {
            line
        };
        if line.trim().is_empty() {
            continue;
        }

        scratch.clear();
        match dialect.parse_line(line_no, &line, &mut scratch) {
            Ok(()) => {
                for record in scratch.drain(..) {
                    match record.into_entry() {
                        Ok(entry) => {
                            if let Some(last) = entries.last() {
                                if entry.timestamp < last.timestamp {
                                    monotonic = false;
                                }
                            }
                            entries.push(entry);
                        }
                        Err(error) => errors.push(error),
                    }
                }
            }
            Err(err) => errors.push(ParseError::line(line_no, line.as_str(), err)),
        }
    }

    if !monotonic {
        warn!(dialect = dialect.name(), path = %path.display(), "timestamps out of order, sorting");
        entries.sort_by_key(|entry| entry.timestamp);
    }
    ParseResult::from_entries(entries, errors)
}

/// Parse only the entries within `[start, end)`.
///
/// Lines whose timestamp prefix scans cleanly are skipped without full
/// decoding when they fall outside the window, and the scan stops early
/// once the prefix stream has stayed monotonic and passes `end`. A
/// timestamp regression disables early stop; the rest of the file is then
/// filtered line by line.
pub fn parse_time_window(
    dialect: &dyn Dialect,
    path: &Path,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> ParseResult {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            return ParseResult::failure(vec![io_error(path, &err)]);
        }
    };

    let start_raw = raw_bound(start);
    let end_raw = raw_bound(end);

    let mut entries: Vec<LogEntry> = Vec::new();
    let mut errors: Vec<ParseError> = Vec::new();
    let mut scratch: Vec<RawRecord> = Vec::new();
    let mut prefix_monotonic = true;
    // Early stop needs evidence the stream actually progressed through the
    // window; a file opening beyond `end` proves nothing about its tail.
    let mut seen_below_end = false;
    let mut last_prefix: Option<RawTs> = None;

    let mut line_no = 0usize;
    let mut first = true;
    for line in BufReader::new(file).lines() {
        line_no += 1;
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                errors.push(ParseError::file_scope(
                    ErrorKind::Io,
                    format!("failed to read {}: {}", path.display(), err),
                ));
                break;
            }
        };
        let line = if first {
            first = false;
            strip_bom(&line).to_string()
        } else {
            line
        };
        if line.trim().is_empty() {
            continue;
        }

        if let Some(ts) = dialect.scan_timestamp(&line) {
            if let Some(prev) = last_prefix {
                if ts < prev && prefix_monotonic {
                    prefix_monotonic = false;
                    warn!(
                        dialect = dialect.name(),
                        line = line_no,
                        "timestamp regression, window scan cannot stop early"
                    );
                }
            }
            last_prefix = Some(ts);
            if ts < end_raw {
                seen_below_end = true;
            }

            if ts < start_raw {
                continue;
            }
            if ts >= end_raw {
                if prefix_monotonic && seen_below_end {
                    break;
                }
                continue;
            }
        }

        scratch.clear();
        match dialect.parse_line(line_no, &line, &mut scratch) {
            Ok(()) => {
                for record in scratch.drain(..) {
                    match record.into_entry() {
                        Ok(entry) => {
                            if entry.timestamp >= start && entry.timestamp < end {
                                entries.push(entry);
                            }
                        }
                        Err(error) => errors.push(error),
                    }
                }
            }
            Err(err) => errors.push(ParseError::line(line_no, line.as_str(), err)),
        }
    }

    if !entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp) {
        entries.sort_by_key(|entry| entry.timestamp);
    }
    ParseResult::from_entries(entries, errors)
}

fn raw_bound(at: NaiveDateTime) -> RawTs {
    use chrono::{Datelike, Timelike};
    RawTs {
        year: at.year(),
        month: at.month(),
        day: at.day(),
        hour: at.hour(),
        minute: at.minute(),
        second: at.second(),
        millis: at.nanosecond() / 1_000_000,
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> ParseError {
    let reason = if err.kind() == std::io::ErrorKind::NotFound {
        format!("file not found: {}", path.display())
    } else {
        format!("failed to read {}: {}", path.display(), err)
    };
    ParseError::file_scope(ErrorKind::Io, reason)
}

/// Lazy single-pass entry stream over one file. Malformed lines are
/// skipped; callers wanting the errors use the materializing parse paths.
pub struct EntryStream<'d> {
    dialect: &'d dyn Dialect,
    lines: std::io::Lines<BufReader<File>>,
    pending: std::collections::VecDeque<LogEntry>,
    line_no: usize,
    first: bool,
}

impl<'d> Iterator for EntryStream<'d> {
    type Item = LogEntry;

    fn next(&mut self) -> Option<LogEntry> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Some(entry);
            }
            let line = self.lines.next()?.ok()?;
            self.line_no += 1;
            let line = if self.first {
                self.first = false;
                strip_bom(&line).to_string()
            } else {
                line
            };
            if line.trim().is_empty() {
                continue;
            }
            let mut scratch = Vec::new();
            if self
                .dialect
                .parse_line(self.line_no, &line, &mut scratch)
                .is_ok()
            {
                self.pending
                    .extend(scratch.into_iter().filter_map(|r| r.into_entry().ok()));
            }
        }
    }
}

/// Open `path` as a lazy, non-restartable stream of entries.
pub fn stream_entries<'d>(
    dialect: &'d dyn Dialect,
    path: &Path,
) -> std::io::Result<EntryStream<'d>> {
    let file = File::open(path)?;
    Ok(EntryStream {
        dialect,
        lines: BufReader::new(file).lines(),
        pending: std::collections::VecDeque::new(),
        line_no: 0,
        first: true,
    })
}
