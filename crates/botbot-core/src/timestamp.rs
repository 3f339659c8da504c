//! Conversion of the upstream nanosecond timestamps.
//!
//! The bot process stamps every packet with an RFC 3339 string carrying up to
//! nine fractional digits and a trailing `Z`, e.g.
//! `2014-01-27T16:35:53.123456789Z`. In memory we keep microsecond precision.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};

use crate::error::{LineError, LineResult};

const SECONDS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const MICRO_DIGITS: usize = 6;

/// Parses a nanosecond-precision UTC timestamp, truncating to microseconds.
///
/// Fractions shorter than six digits are read as written (`.1234` is
/// 123 400 µs); digits past the sixth are dropped. The string must split into
/// exactly one seconds part and one fractional part around a single `.`.
pub fn convert_nano_timestamp(value: &str) -> LineResult<DateTime<Utc>> {
    let malformed = || LineError::MalformedTimestamp(value.to_string());

    let mut parts = value.split('.');
    let (Some(seconds), Some(fraction), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed());
    };

    let naive = NaiveDateTime::parse_from_str(seconds.trim(), SECONDS_FORMAT)
        .map_err(|_| malformed())?;

    let digit_count = fraction.bytes().take_while(|b| b.is_ascii_digit()).count();
    let (digits, marker) = fraction.split_at(digit_count);
    if digits.is_empty() || !matches!(marker.trim_end(), "" | "Z") {
        return Err(malformed());
    }

    let kept = &digits[..digits.len().min(MICRO_DIGITS)];
    let mut micros: u32 = kept.parse().map_err(|_| malformed())?;
    for _ in kept.len()..MICRO_DIGITS {
        micros *= 10;
    }

    naive
        .with_nanosecond(micros * 1_000)
        .map(|dt| dt.and_utc())
        .ok_or_else(malformed)
}
