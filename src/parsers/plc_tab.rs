//! Tab-separated PLC trace dialect.
//!
//! ```text
//! 2025-09-22 13:34:46.877 [] Line1.Belts.B1ACNV13301-102@B13\tO_MOVE_IN_ACK\tOUT\tON\t\tB13\t1\t0\t2025-09-22 13:34:46.880
//! ```
//!
//! Fields sit at fixed tab positions, so the hot path is a plain split with
//! no pattern matching. The trailing field repeats the timestamp at write
//! time and is only checked for shape.

use super::{infer_value, Dialect, RawRecord};
use crate::error::LineError;
use crate::timestamp::{scan_datetime, RawTs};

/// path, signal, direction, value, blank, location, flag, write timestamp
const MIN_FIELDS: usize = 8;

#[derive(Debug, Default)]
pub struct PlcTabDialect;

impl PlcTabDialect {
    pub fn new() -> Self {
        Self
    }
}

/// Trailing `NAME-NNN` component of the equipment path, with an optional
/// `@location` suffix stripped.
fn device_from_path(path: &str) -> Option<&str> {
    let path = path.trim();
    let base = path.rsplit_once('@').map_or(path, |(head, _)| head);
    let device = base.rsplit('.').next()?;
    if device.is_empty()
        || !device
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return None;
    }
    Some(device)
}

fn split_fields(line: &str) -> Option<(RawTs, Vec<&str>)> {
    let (ts, consumed) = scan_datetime(line)?;
    let rest = line.get(consumed..)?.strip_prefix(" [] ")?;
    let fields: Vec<&str> = rest.split('\t').collect();
    if fields.len() < MIN_FIELDS {
        return None;
    }
    // Last field is the write-side timestamp.
    scan_datetime(fields[fields.len() - 1].trim())?;
    Some((ts, fields))
}

impl Dialect for PlcTabDialect {
    fn name(&self) -> &'static str {
        "plc_tab"
    }

    fn matches_line(&self, line: &str) -> bool {
        split_fields(line)
            .map(|(_, fields)| device_from_path(fields[0]).is_some() && !fields[1].trim().is_empty())
            .unwrap_or(false)
    }

    fn parse_line(
        &self,
        line_no: usize,
        line: &str,
        out: &mut Vec<RawRecord>,
    ) -> Result<(), LineError> {
        let (ts, fields) = split_fields(line).ok_or(LineError::Grammar("plc_tab"))?;
        let device_id = device_from_path(fields[0])
            .ok_or(LineError::Grammar("plc_tab"))?
            .to_string();
        let signal_name = fields[1].trim();
        if signal_name.is_empty() {
            return Err(LineError::Grammar("plc_tab"));
        }
        let (value, signal_type) = infer_value(fields[3]);

        out.push(RawRecord {
            line: line_no,
            device_id,
            signal_name: signal_name.to_string(),
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
