//! PDF and XMP date strings.
//!
//! Accepted forms:
//!
//! ```text
//! D:20080918111951
//! D:20080918111951Z
//! D:20080918111951-07'00'
//! D:191080918111951          Distiller y2k bug, year 1900 + 108
//! 2023-04-25T12:13:14Z
//! 2023-04-25T12:13:14+01
//! 2023-04-25T12:13:14+0100
//! 2023-04-25T12:13:14-01:00
//! ```
//!
//! Everything after the year is optional; month and day default to 1,
//! the time of day to midnight, and a missing offset means UTC.

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_EPOCH: i64 = 11_644_473_600;

struct Cursor<'a> {
    rest: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn number(&mut self, digits: usize) -> Option<u32> {
        if self.rest.len() < digits || !self.rest[..digits].iter().all(u8::is_ascii_digit) {
            return None;
        }
        let value = self.rest[..digits]
            .iter()
            .fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'));
        self.rest = &self.rest[digits..];
        Some(value)
    }

    fn skip(&mut self, separators: &[u8]) {
        if let Some((first, tail)) = self.rest.split_first() {
            if separators.contains(first) {
                self.rest = tail;
            }
        }
    }
}

/// Parse a PDF or XMP date into UTC.
///
/// Returns `None` when not even the year can be read or a component is out
/// of range.
pub fn parse_pdf_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let value = value.strip_prefix("D:").unwrap_or(value);
    let mut cur = Cursor {
        rest: value.as_bytes(),
    };

    let mut year = cur.number(4)?;
    if (1909..=1913).contains(&year) && value.len() > 14 {
        // CC YYY MMDD...: the first four digits were "19" plus the start of
        // a three digit year offset
        cur = Cursor {
            rest: &value.as_bytes()[2..],
        };
        year = 1900 + cur.number(3)?;
    }

    let mut month = 1;
    let mut day = 1;
    let (mut hour, mut minute, mut second) = (0, 0, 0);
    let mut offset_minutes: i64 = 0;

    cur.skip(b"-");
    if let Some(m) = cur.number(2) {
        month = m;
        cur.skip(b"-");
        if let Some(d) = cur.number(2) {
            day = d;
            cur.skip(b"T");
            if let Some(h) = cur.number(2) {
                hour = h;
                cur.skip(b":");
                if let Some(min) = cur.number(2) {
                    minute = min;
                    cur.skip(b":");
                    if let Some(s) = cur.number(2) {
                        second = s;
                    }
                    offset_minutes = parse_offset(&mut cur);
                }
            }
        }
    }

    let local = NaiveDate::from_ymd_opt(year as i32, month, day)?.and_hms_opt(hour, minute, second)?;
    let utc = local.and_utc() - Duration::minutes(offset_minutes);
    Some(utc)
}

/// Signed offset from UTC in minutes; `Z` and anything unreadable are 0.
fn parse_offset(cur: &mut Cursor<'_>) -> i64 {
    // skip fractional seconds of XMP dates
    if cur.rest.first() == Some(&b'.') {
        let digits = cur.rest[1..].iter().take_while(|b| b.is_ascii_digit()).count();
        cur.rest = &cur.rest[1 + digits..];
    }
    let sign = match cur.rest.first() {
        Some(b'+') => 1,
        Some(b'-') => -1,
        _ => return 0,
    };
    cur.rest = &cur.rest[1..];
    let Some(hours) = cur.number(2) else {
        return 0;
    };
    cur.skip(b":'");
    let minutes = cur.number(2).unwrap_or(0);
    sign * i64::from(hours * 60 + minutes)
}

/// Convert to a Windows FILETIME value (100 ns ticks since 1601-01-01 UTC).
pub fn to_filetime(value: &DateTime<Utc>) -> u64 {
    let seconds = value.timestamp() + FILETIME_UNIX_EPOCH;
    let ticks = seconds * 10_000_000 + i64::from(value.timestamp_subsec_nanos() / 100);
    ticks.max(0) as u64
}
