//! Material-control-system (MCS/AMHS) transfer log dialect.
//!
//! ```text
//! 2025-12-05 00:00:36.322 [UPDATE=336182, BBADFB0397] [CurrentLocation=B1ACNV13301-120]
//! 2025-12-09 00:00:13.493 [ADD=SDADTN490140] [CarrierID=SDADTN490140], [CarrierLoc=B1ACNV13301-129]
//! ```
//!
//! The carrier id acts as the device and every `[Key=Value]` pair becomes
//! one entry, so a line yields a variable number of entries and the dialect
//! always parses single-threaded.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{infer_value, parse_declared_bool, Dialect, LineArity, RawRecord};
use crate::error::LineError;
use crate::model::{SignalType, Value};
use crate::timestamp::{scan_datetime, RawTs};

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d+)\s+\[(ADD|UPDATE|REMOVE)=([^,\]]+)(?:,\s*([^\]]+))?\]\s*(.*)$",
    )
    .expect("mcs header pattern")
});

static KV_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^=\]]+)=([^\]]*)\]").expect("mcs key-value pattern"));

/// Keys whose values are flags written as true/false.
const BOOLEAN_KEYS: &[&str] = &[
    "IsBoost",
    "IsMultiJob",
    "IsMultipleDestination",
    "IsLocationGroupOrder",
    "IsExecuteCommand",
];

const INTEGER_KEYS: &[&str] = &[
    "Priority",
    "AltCount",
    "AltCount2",
    "WaitCount",
    "CirculationCount",
];

/// State/enum keys stay strings even when their value looks numeric.
const STATE_KEYS: &[&str] = &[
    "TransferState",
    "TransferState2",
    "TransferAbnormalState",
    "TransferAbnormalState2",
    "ResultCode",
    "ResultCode2",
    "CommandType",
];

#[derive(Debug, Default)]
pub struct McsDialect;

impl McsDialect {
    pub fn new() -> Self {
        Self
    }
}

/// Alternative location key spellings normalize to `CurrentLocation` so
/// carrier tracking sees one signal across log variants.
fn canonical_signal(key: &str) -> &str {
    match key {
        "CarrierLoc" | "CarrierLocation" => "CurrentLocation",
        other => other,
    }
}

fn typed_value(key: &str, raw: &str) -> (Value, SignalType) {
    if BOOLEAN_KEYS.contains(&key) {
        if let Some(flag) = parse_declared_bool(raw) {
            return (Value::Bool(flag), SignalType::Boolean);
        }
    } else if INTEGER_KEYS.contains(&key) {
        if let Ok(int) = raw.trim().parse::<i64>() {
            return (Value::Int(int), SignalType::Integer);
        }
    } else if STATE_KEYS.contains(&key) {
        return (Value::Str(raw.trim().to_string()), SignalType::String);
    }
    infer_value(raw)
}

impl Dialect for McsDialect {
    fn name(&self) -> &'static str {
        "mcs"
    }

    fn arity(&self) -> LineArity {
        LineArity::ManyPerLine
    }

    fn matches_line(&self, line: &str) -> bool {
        HEADER_RE.is_match(line.trim_end())
    }

    fn parse_line(
        &self,
        line_no: usize,
        line: &str,
        out: &mut Vec<RawRecord>,
    ) -> Result<(), LineError> {
        let caps = HEADER_RE
            .captures(line.trim_end())
            .ok_or(LineError::Grammar("mcs"))?;

        let ts_str = caps.get(1).map_or("", |m| m.as_str());
        let (ts, _) =
            scan_datetime(ts_str).ok_or_else(|| LineError::Timestamp(ts_str.to_string()))?;

        // Two-parameter header carries the carrier second; the simplified
        // form carries it first.
        let device_id = caps
            .get(4)
            .or_else(|| caps.get(3))
            .map_or("", |m| m.as_str())
            .trim()
            .to_string();
        if device_id.is_empty() {
            return Err(LineError::Grammar("mcs"));
        }

        let kvpairs = caps.get(5).map_or("", |m| m.as_str());
        for kv in KV_RE.captures_iter(kvpairs) {
            let key = kv.get(1).map_or("", |m| m.as_str()).trim();
            let raw = kv.get(2).map_or("", |m| m.as_str());
            let (value, signal_type) = typed_value(key, raw);
            out.push(RawRecord {
                line: line_no,
                device_id: device_id.clone(),
                signal_name: canonical_signal(key).to_string(),
                ts,
                value,
                signal_type,
            });
        }
        Ok(())
    }

    fn scan_timestamp(&self, line: &str) -> Option<RawTs> {
        scan_datetime(line).map(|(ts, _)| ts)
    }
}
