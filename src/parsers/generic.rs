//! Generic whitespace dialect, the registry default.
//!
//! ```text
//! DEVICE_A MOTOR_START 10:30:45 true boolean
//! DEVICE_A SENSOR_A 10:30:46 ready string
//! DEVICE_B COUNTER_1 10:30:47 100 integer
//! ```
//!
//! Lines carry a bare time of day, anchored to the local date at decode
//! time; files spanning local midnight are outside this dialect's grammar.
//! The trailing token declares the value type.

use chrono::Local;

use super::{Dialect, RawRecord};
use crate::error::LineError;
use crate::model::{SignalType, Value};
use crate::timestamp::{scan_time_of_day, RawTs};

#[derive(Debug, Default)]
pub struct GenericDialect;

impl GenericDialect {
    pub fn new() -> Self {
        Self
    }
}

fn declared_type(token: &str) -> Option<SignalType> {
    match token {
        "boolean" => Some(SignalType::Boolean),
        "integer" => Some(SignalType::Integer),
        "string" => Some(SignalType::String),
        _ => None,
    }
}

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn matches_line(&self, line: &str) -> bool {
        let parts: Vec<&str> = line.split_whitespace().collect();
        parts.len() >= 5
            && scan_time_of_day(parts[2]).is_some()
            && declared_type(parts[4]).is_some()
    }

    fn parse_line(
        &self,
        line_no: usize,
        line: &str,
        out: &mut Vec<RawRecord>,
    ) -> Result<(), LineError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            return Err(LineError::Grammar("generic"));
        }

        let (hour, minute, second) =
            scan_time_of_day(parts[2]).ok_or_else(|| LineError::Timestamp(parts[2].to_string()))?;

        // Everything past the value token must be the type declaration.
        let type_str = parts[4..].join(" ");
        let signal_type =
            declared_type(&type_str).ok_or(LineError::SignalType(type_str))?;

        let value_str = parts[3];
        let value = match signal_type {
            SignalType::Boolean => match value_str.to_ascii_lowercase().as_str() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => return Err(LineError::BoolValue(value_str.to_string())),
            },
            SignalType::Integer => Value::Int(
                value_str
                    .parse::<i64>()
                    .map_err(|_| LineError::IntValue(value_str.to_string()))?,
            ),
            SignalType::String => Value::Str(value_str.to_string()),
        };

        out.push(RawRecord {
            line: line_no,
            device_id: parts[0].to_string(),
            signal_name: parts[1].to_string(),
            ts: RawTs::from_date_hms(Local::now().date_naive(), hour, minute, second),
            value,
            signal_type,
        });
        Ok(())
    }

    fn scan_timestamp(&self, line: &str) -> Option<RawTs> {
        let time_field = line.split_whitespace().nth(2)?;
        let (hour, minute, second) = scan_time_of_day(time_field)?;
        Some(RawTs::from_date_hms(
            Local::now().date_naive(),
            hour,
            minute,
            second,
        ))
    }
}
