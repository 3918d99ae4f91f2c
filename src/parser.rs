//! Timestamp parsing for access-log entries.
//!
//! Unlike aggregation code, extraction keeps the source UTC offset: an entry
//! logged at `+0530` stays at `+0530`.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Offset-aware layouts tried by the flexible parser, most specific first.
const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S %z",
    "%d/%b/%Y:%H:%M:%S%.f %z",
    "%d/%b/%Y %H:%M:%S %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

const NCSA_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";
const NCSA_NAIVE_FORMAT: &str = "%d/%b/%Y:%H:%M:%S";

static RE_BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\[\]]+)\]").unwrap());

static RE_ISO_ANY: Lazy<Regex> = Lazy::new(|| {
    // 2025-08-07T06:41:18Z, 2025-08-07 06:41:18.123+05:30, 2025-08-07T06:41:18-0800
    Regex::new(r"\b\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d{1,9})?(?:Z|[+-]\d{2}:?\d{2})?").unwrap()
});

/// Parse one timestamp token: flexible formats first, then strict NCSA,
/// then NCSA without an offset (read as UTC).
pub fn parse_timestamp(token: &str) -> Option<DateTime<FixedOffset>> {
    let s = token.trim();
    if s.is_empty() {
        return None;
    }
    parse_flexible(s)
        .or_else(|| DateTime::parse_from_str(s, NCSA_FORMAT).ok())
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, NCSA_NAIVE_FORMAT)
                .ok()
                .map(as_utc_offset)
        })
}

fn parse_flexible(s: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt);
    }
    for f in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, f) {
            return Some(dt);
        }
    }
    if let Some(stripped) = s.strip_suffix('Z') {
        for f in NAIVE_FORMATS {
            if let Ok(ndt) = NaiveDateTime::parse_from_str(stripped, f) {
                return Some(as_utc_offset(ndt));
            }
        }
    }
    for f in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, f) {
            return Some(as_utc_offset(ndt));
        }
    }
    parse_epoch(s)
}

fn as_utc_offset(ndt: NaiveDateTime) -> DateTime<FixedOffset> {
    Utc.from_utc_datetime(&ndt).fixed_offset()
}

/// 10/13/16 digit epoch values (seconds, millis, micros).
fn parse_epoch(s: &str) -> Option<DateTime<FixedOffset>> {
    if !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let v = s.parse::<i64>().ok()?;
    let utc = match s.len() {
        10 => DateTime::<Utc>::from_timestamp(v, 0),
        13 => DateTime::<Utc>::from_timestamp(v / 1000, ((v % 1000) * 1_000_000) as u32),
        16 => DateTime::<Utc>::from_timestamp(v / 1_000_000, ((v % 1_000_000) * 1_000) as u32),
        _ => None,
    }?;
    Some(utc.fixed_offset())
}

/// The first `[...]` token of an entry, verbatim.
pub fn first_bracketed(entry: &str) -> Option<&str> {
    RE_BRACKETED
        .captures(entry)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Timestamp from the first bracketed token, falling back to an ISO-8601
/// timestamp anywhere in the text.
pub fn detect_timestamp_in_entry(entry: &str) -> Option<DateTime<FixedOffset>> {
    if let Some(ts) = first_bracketed(entry).and_then(parse_timestamp) {
        return Some(ts);
    }
    RE_ISO_ANY.find(entry).and_then(|m| parse_timestamp(m.as_str()))
}
