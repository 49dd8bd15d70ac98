//! Fixed-position timestamp scanning for the per-line hot path.
//!
//! Per-line overhead dominates throughput on multi-million-line files, so
//! the dialects never call a general date parser while scanning. They call
//! these byte-level scanners, which produce a [`RawTs`] of plain integers;
//! [`RawTs::resolve`] is the only place a `chrono` value is constructed,
//! and the parse driver defers that until after batch reassembly.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Minimal timestamp token: range-checked integer fields, cheap to copy
/// across worker boundaries. Field order makes the derived `Ord`
/// chronological, so monotonicity checks need no resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RawTs {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub millis: u32,
}

impl RawTs {
    pub fn from_date_hms(date: NaiveDate, hour: u32, minute: u32, second: u32) -> Self {
        use chrono::Datelike;
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            hour,
            minute,
            second,
            millis: 0,
        }
    }

    /// Construct the canonical instant. Scanners range-check every field,
    /// so this only fails on calendar-invalid dates (e.g. Feb 30).
    pub fn resolve(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?
            .and_hms_milli_opt(self.hour, self.minute, self.second, self.millis)
    }
}

#[inline]
fn digit(b: u8) -> Option<u32> {
    if b.is_ascii_digit() {
        Some((b - b'0') as u32)
    } else {
        None
    }
}

#[inline]
fn digits2(bytes: &[u8], at: usize) -> Option<u32> {
    Some(digit(*bytes.get(at)?)? * 10 + digit(*bytes.get(at + 1)?)?)
}

#[inline]
fn digits4(bytes: &[u8], at: usize) -> Option<u32> {
    Some(digits2(bytes, at)? * 100 + digits2(bytes, at + 2)?)
}

/// Scan a `YYYY-MM-DD HH:MM:SS` prefix with an optional fractional-second
/// tail of one or more digits. Returns the token and the number of bytes
/// consumed, or `None` when the prefix does not match.
pub fn scan_datetime(s: &str) -> Option<(RawTs, usize)> {
    let b = s.as_bytes();
    if b.len() < 19 {
        return None;
    }
    if b[4] != b'-' || b[7] != b'-' || b[10] != b' ' || b[13] != b':' || b[16] != b':' {
        return None;
    }

    let year = digits4(b, 0)?;
    let month = digits2(b, 5)?;
    let day = digits2(b, 8)?;
    let hour = digits2(b, 11)?;
    let minute = digits2(b, 14)?;
    let second = digits2(b, 17)?;

    if !(1..=12).contains(&month)
        || !(1..=31).contains(&day)
        || hour > 23
        || minute > 59
        || second > 59
    {
        return None;
    }

    let mut consumed = 19;
    let mut millis = 0u32;
    if b.get(19) == Some(&b'.') {
        let mut scale = 100u32;
        let mut frac_len = 0usize;
        for &byte in &b[20..] {
            match digit(byte) {
                Some(d) => {
                    // Millisecond precision; further digits only advance the cursor.
                    if scale > 0 {
                        millis += d * scale;
                        scale /= 10;
                    }
                    frac_len += 1;
                }
                None => break,
            }
        }
        if frac_len == 0 {
            return None;
        }
        consumed = 20 + frac_len;
    }

    let ts = RawTs {
        year: year as i32,
        month,
        day,
        hour,
        minute,
        second,
        millis,
    };
    Some((ts, consumed))
}

/// Scan a bare `H:MM:SS` / `HH:MM:SS` time-of-day token. The token must end
/// at a field boundary (whitespace or end of input).
pub fn scan_time_of_day(s: &str) -> Option<(u32, u32, u32)> {
    let b = s.as_bytes();
    let (hour, rest_at) = if b.len() >= 2 && b[1] == b':' {
        (digit(b[0])?, 1)
    } else {
        (digits2(b, 0)?, 2)
    };
    if b.get(rest_at) != Some(&b':') || b.get(rest_at + 3) != Some(&b':') {
        return None;
    }
    let minute = digits2(b, rest_at + 1)?;
    let second = digits2(b, rest_at + 4)?;
    let end = rest_at + 6;
    if b.len() > end && !b[end].is_ascii_whitespace() {
        return None;
    }
    if hour > 23 || minute > 59 || second > 59 {
        return None;
    }
    Some((hour, minute, second))
}
