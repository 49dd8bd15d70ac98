//! Comma-separated signal dialect: `timestamp,device,signal,value`.
//!
//! ```text
//! 2025-10-21 23:08:27.995,B1ACNV13309-104@D19,B,62
//! 2025-10-21 23:08:27.995,B1ACPT15001-104@D19,Status,Error
//! ```
//!
//! Four fixed fields; the value keeps any commas it contains. A manual
//! split covers the grammar, so no pattern engine runs per line.

use super::{infer_value, Dialect, RawRecord};
use crate::error::LineError;
use crate::timestamp::{scan_datetime, RawTs};

#[derive(Debug, Default)]
pub struct CsvSignalDialect;

impl CsvSignalDialect {
    pub fn new() -> Self {
        Self
    }
}

fn split_fields(line: &str) -> Option<(RawTs, &str, &str, &str)> {
    let (ts, consumed) = scan_datetime(line)?;
    let rest = line.get(consumed..)?.trim_start();
    let rest = rest.strip_prefix(',')?;
    let mut fields = rest.splitn(3, ',');
    let device = fields.next()?.trim();
    let signal = fields.next()?.trim();
    let value = fields.next()?.trim();
    if device.is_empty() || signal.is_empty() {
        return None;
    }
    Some((ts, device, signal, value))
}

impl Dialect for CsvSignalDialect {
    fn name(&self) -> &'static str {
        "csv_signal"
    }

    fn matches_line(&self, line: &str) -> bool {
        split_fields(line).is_some()
    }

    fn parse_line(
        &self,
        line_no: usize,
        line: &str,
        out: &mut Vec<RawRecord>,
    ) -> Result<(), LineError> {
        let (ts, device, signal, raw) =
            split_fields(line).ok_or(LineError::Grammar("csv_signal"))?;
        let (value, signal_type) = infer_value(raw);
        out.push(RawRecord {
            line: line_no,
            device_id: device.to_string(),
            signal_name: signal.to_string(),
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
    use crate::model::Value;

    fn parse_one(line: &str) -> Result<RawRecord, LineError> {
        let mut out = Vec::new();
        CsvSignalDialect::new().parse_line(1, line, &mut out)?;
        Ok(out.remove(0))
    }

    #[test]
    fn parses_integer_and_string_values() {
        let record = parse_one("2025-10-21 23:08:27.995,B1ACNV13309-104@D19,B,62").unwrap();
        assert_eq!(record.device_id, "B1ACNV13309-104@D19");
        assert_eq!(record.signal_name, "B");
        assert_eq!(record.value, Value::Int(62));

        let record = parse_one("2025-10-21 23:08:27.995,B1ACPT15001-104@D19,Status,Error").unwrap();
        assert_eq!(record.value, Value::Str("Error".to_string()));
    }

    #[test]
    fn value_keeps_embedded_commas() {
        let record = parse_one("2025-10-21 23:08:28.000,DEV-1,Status,Error,code 5").unwrap();
        assert_eq!(record.value, Value::Str("Error,code 5".to_string()));
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(parse_one("2025-10-21 23:08:27.995,DEV-1,B").is_err());
        assert!(parse_one("2025-10-21 23:08:27.995 DEV-1,B,62").is_err());
        assert!(parse_one("not,a,timestamp,42").is_err());
    }
}
