//! PLC debug log dialect: bracketed lines with a declared value type.
//!
//! ```text
//! 2025-09-22 13:34:46.877 [Debug] [Line1.Belts.B1ACNV13301-102@B13] [OUTPUT2:O_MOVE_IN_ACK] (Boolean) : ON
//! ```
//!
//! The device id is the trailing `NAME-NNN` component of the bracketed
//! equipment path; an optional `@location` suffix is ignored.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{parse_declared_bool, Dialect, RawRecord};
use crate::error::LineError;
use crate::model::{SignalType, Value};
use crate::timestamp::{scan_datetime, RawTs};

static LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^(\d{4}-\d{2}-\d{2}\s\d{2}:\d{2}:\d{2}\.\d{3})\s+   # timestamp
        \[[^\]]*\]\s+                                        # log level
        \[.*?([A-Z0-9]+-\d+)(?:@[^\]]+)?\]\s+                # device path, trailing id
        \[(?:INPUT2|OUTPUT2|PARAMETER2):([^\]]+)\]\s+        # signal category and name
        \((\w+)\)\s*:\s*(.*)$                                # declared type and value
        ",
    )
    .expect("plc_debug line pattern")
});

#[derive(Debug, Default)]
pub struct PlcDebugDialect;

impl PlcDebugDialect {
    pub fn new() -> Self {
        Self
    }
}

fn declared_type(token: &str) -> Option<SignalType> {
    if token.eq_ignore_ascii_case("boolean") {
        Some(SignalType::Boolean)
    } else if token.eq_ignore_ascii_case("string") {
        Some(SignalType::String)
    } else if token.eq_ignore_ascii_case("integer")
        || token.eq_ignore_ascii_case("int")
        || token.eq_ignore_ascii_case("short")
    {
        Some(SignalType::Integer)
    } else {
        None
    }
}

impl Dialect for PlcDebugDialect {
    fn name(&self) -> &'static str {
        "plc_debug"
    }

    fn matches_line(&self, line: &str) -> bool {
        LINE_RE.is_match(line)
    }

    fn parse_line(
        &self,
        line_no: usize,
        line: &str,
        out: &mut Vec<RawRecord>,
    ) -> Result<(), LineError> {
        let caps = LINE_RE
            .captures(line)
            .ok_or(LineError::Grammar("plc_debug"))?;

        let ts_str = caps.get(1).map_or("", |m| m.as_str());
        let (ts, _) = scan_datetime(ts_str)
            .ok_or_else(|| LineError::Timestamp(ts_str.to_string()))?;

        let type_str = caps.get(4).map_or("", |m| m.as_str());
        let signal_type = declared_type(type_str)
            .ok_or_else(|| LineError::SignalType(type_str.to_string()))?;

        let value_str = caps.get(5).map_or("", |m| m.as_str());
        let value = match signal_type {
            SignalType::Boolean => Value::Bool(
                parse_declared_bool(value_str)
                    .ok_or_else(|| LineError::BoolValue(value_str.trim().to_string()))?,
            ),
            SignalType::Integer => Value::Int(
                value_str
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| LineError::IntValue(value_str.trim().to_string()))?,
            ),
            SignalType::String => Value::Str(value_str.trim().to_string()),
        };

        out.push(RawRecord {
            line: line_no,
            device_id: caps.get(2).map_or("", |m| m.as_str()).to_string(),
            signal_name: caps.get(3).map_or("", |m| m.as_str()).to_string(),
            ts,
            value,
            signal_type,
        });
        Ok(())
    }

    fn scan_timestamp(&self, line: &str) -> Option<RawTs> {
        scan_datetime(line).map(|(ts, _)| ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "2025-09-22 13:34:46.877 [Debug] [B1ACNV13301_NND-AZS#3.Belts.B1ACNV13301-102@B13] [OUTPUT2:O_MOVE_IN_ACK] (Boolean) : ON";

    fn parse_one(line: &str) -> Result<RawRecord, LineError> {
        let mut out = Vec::new();
        PlcDebugDialect::new().parse_line(1, line, &mut out)?;
        Ok(out.remove(0))
    }

    #[test]
    fn parses_boolean_output_line() {
        let record = parse_one(LINE).unwrap();
        assert_eq!(record.device_id, "B1ACNV13301-102");
        assert_eq!(record.signal_name, "O_MOVE_IN_ACK");
        assert_eq!(record.value, Value::Bool(true));
        assert_eq!(record.signal_type, SignalType::Boolean);
        assert_eq!(record.ts.millis, 877);
    }

    #[test]
    fn parses_integer_and_string_types() {
        let int_line = "2025-09-22 13:34:47.001 [Debug] [A.B.C-1] [PARAMETER2:SPEED] (Integer) : 1500";
        let record = parse_one(int_line).unwrap();
        assert_eq!(record.value, Value::Int(1500));

        let short_line = "2025-09-22 13:34:47.002 [Debug] [A.B.C-1] [INPUT2:MODE] (Short) : 3";
        assert_eq!(parse_one(short_line).unwrap().signal_type, SignalType::Integer);

        let str_line = "2025-09-22 13:34:47.003 [Debug] [A.B.C-1] [INPUT2:STATE] (String) : Running ";
        assert_eq!(
            parse_one(str_line).unwrap().value,
            Value::Str("Running".to_string())
        );
    }

    #[test]
    fn device_id_ignores_location_suffix() {
        let no_loc = "2025-09-22 13:34:46.877 [Debug] [Belts.B1ACNV13301-102] [OUTPUT2:X] (Boolean) : OFF";
        assert_eq!(parse_one(no_loc).unwrap().device_id, "B1ACNV13301-102");
    }

    #[test]
    fn rejects_bad_type_and_value() {
        let bad_type = "2025-09-22 13:34:46.877 [Debug] [A.B-1] [OUTPUT2:X] (Float) : 1.5";
        assert!(matches!(parse_one(bad_type), Err(LineError::SignalType(_))));

        let bad_bool = "2025-09-22 13:34:46.877 [Debug] [A.B-1] [OUTPUT2:X] (Boolean) : MAYBE";
        assert!(matches!(parse_one(bad_bool), Err(LineError::BoolValue(_))));

        assert!(matches!(parse_one("garbage"), Err(LineError::Grammar(_))));
    }

    #[test]
    fn sniff_grammar_matches() {
        let dialect = PlcDebugDialect::new();
        assert!(dialect.matches_line(LINE));
        assert!(!dialect.matches_line("DEVICE_A MOTOR_START 10:30:45 true boolean"));
    }
}
