//! Timestamp normalization for loosely-specified upstream formats.
//!
//! Brokers disagree on how an execution time is reported: unix seconds,
//! unix milliseconds, RFC 3339 strings, bare date-time strings, or nothing
//! at all. Everything funnels through [`normalize_timestamp`], which tries
//! an ordered list of candidate fields and falls back to "now" rather than
//! dropping the fill.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::TimeMs;

/// Reject instants further in the future than now + 1 day.
pub const MAX_FUTURE_SKEW_MS: i64 = 86_400_000;

/// Unix values below this digit threshold are seconds, not milliseconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// A raw timestamp value as it appears in a broker payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Integer unix time (seconds or milliseconds).
    Unix(i64),
    /// Fractional unix time.
    UnixFloat(f64),
    /// Free-form date/time text.
    Text(String),
}

/// Return the first defined candidate from a priority-ordered list.
pub fn first_some<'a, T>(candidates: impl IntoIterator<Item = Option<&'a T>>) -> Option<&'a T> {
    candidates.into_iter().flatten().next()
}

/// Normalize a priority-ordered list of raw timestamp candidates into a
/// canonical instant.
///
/// Falls back to `now` when no candidate parses. A missing or garbled
/// timestamp must not drop the fill; downstream ordering tolerates skew
/// but not missing trades.
pub fn normalize_timestamp(candidates: &[Option<&RawTimestamp>], now: TimeMs) -> TimeMs {
    match first_some(candidates.iter().copied()) {
        Some(raw) => match parse_timestamp(raw, now) {
            Some(ts) => ts,
            None => {
                warn!(raw = ?raw, "unparseable timestamp, falling back to now");
                now
            }
        },
        None => {
            warn!("no timestamp candidate present, falling back to now");
            now
        }
    }
}

/// Parse a single raw timestamp, returning None if it is invalid.
pub fn parse_timestamp(raw: &RawTimestamp, now: TimeMs) -> Option<TimeMs> {
    let ms = match raw {
        RawTimestamp::Unix(n) => scale_unix(*n),
        RawTimestamp::UnixFloat(f) => {
            if !f.is_finite() {
                return None;
            }
            scale_unix(f.trunc() as i64)
        }
        RawTimestamp::Text(s) => parse_text(s)?,
    };
    validate(ms, now)
}

/// Unix values with fewer than 13 digits are seconds; scale to millis.
fn scale_unix(n: i64) -> i64 {
    if n.abs() < MILLIS_THRESHOLD {
        n.saturating_mul(1000)
    } else {
        n
    }
}

fn parse_text(s: &str) -> Option<i64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    // All-digit strings are unix times in disguise.
    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed.parse::<i64>().ok().map(scale_unix);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.timestamp_millis());
    }

    // Common broker layouts, naive values treated as UTC.
    const LAYOUTS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%m/%d/%Y %H:%M:%S",
    ];
    for layout in LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, layout) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }

    None
}

/// An instant must be strictly positive (epoch-zero artifacts rejected)
/// and no further ahead than now + 1 day.
fn validate(ms: i64, now: TimeMs) -> Option<TimeMs> {
    if ms <= 0 || ms > now.as_i64() + MAX_FUTURE_SKEW_MS {
        return None;
    }
    Some(TimeMs::new(ms))
}
