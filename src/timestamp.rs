//! Capture timestamps encoded in image filenames.
//!
//! Camera frames are named after the epoch second they were captured at,
//! e.g. `1693412345.123.jpg`. Only the part before the first `.` is used,
//! so the fractional part of the name is dropped along with the extension.

use chrono::{DateTime, Datelike, Utc};
use std::borrow::Cow;

/// Extract the capture instant from an image filename.
///
/// Returns `None` for anything that is not a finite number of epoch
/// seconds falling in years 1 through 9999. `_` may separate digits. A missing timestamp is an
/// expected outcome for some sources, so nothing is logged here.
pub fn extract_timestamp(filename: &str) -> Option<DateTime<Utc>> {
    let prefix = filename.split('.').next()?.trim();
    if prefix.is_empty() {
        return None;
    }

    let secs: f64 = strip_digit_separators(prefix)?.parse().ok()?;
    if !secs.is_finite() {
        return None;
    }

    let whole = secs.floor();
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return None;
    }
    let nanos = ((secs - whole) * 1_000_000_000.0).round() as u32;
    let (whole, nanos) = if nanos >= 1_000_000_000 {
        (whole as i64 + 1, 0)
    } else {
        (whole as i64, nanos)
    };

    DateTime::from_timestamp(whole, nanos).filter(|ts| (1..=9999).contains(&ts.year()))
}

/// Drop `_` separators, which are only valid between two digits.
fn strip_digit_separators(token: &str) -> Option<Cow<'_, str>> {
    if !token.contains('_') {
        return Some(Cow::Borrowed(token));
    }
    let bytes = token.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'_' {
            let before = i.checked_sub(1).map(|j| bytes[j]);
            let after = bytes.get(i + 1).copied();
            if !before.is_some_and(|c| c.is_ascii_digit())
                || !after.is_some_and(|c| c.is_ascii_digit())
            {
                return None;
            }
        }
    }
    Some(Cow::Owned(token.replace('_', "")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_integer_prefix() {
        let ts = extract_timestamp("100.0.jpg").unwrap();
        assert_eq!(ts, Utc.timestamp_opt(100, 0).unwrap());
    }

    #[test]
    fn test_realistic_frame_name() {
        let ts = extract_timestamp("1693412345.png").unwrap();
        assert_eq!(ts.to_rfc3339(), "2023-08-30T16:19:05+00:00");
    }

    #[test]
    fn test_non_numeric_prefix() {
        assert!(extract_timestamp("frame_a.jpg").is_none());
    }

    #[test]
    fn test_empty_and_dot_only() {
        assert!(extract_timestamp("").is_none());
        assert!(extract_timestamp(".jpg").is_none());
    }

    #[test]
    fn test_non_finite_values() {
        assert!(extract_timestamp("inf.jpg").is_none());
        assert!(extract_timestamp("NaN.jpg").is_none());
    }

    #[test]
    fn test_out_of_range() {
        assert!(extract_timestamp("99999999999999999999.jpg").is_none());
    }

    #[test]
    fn test_year_range_is_four_digits() {
        let last = extract_timestamp("253402300799.jpg").unwrap();
        assert_eq!(last.year(), 9999);
        assert!(extract_timestamp("253402300800.jpg").is_none());
        assert!(extract_timestamp("-62135596801.jpg").is_none());
        assert_eq!(extract_timestamp("-62135596800.jpg").unwrap().year(), 1);
    }

    #[test]
    fn test_digit_separators() {
        assert_eq!(extract_timestamp("1_000.jpg").unwrap().timestamp(), 1000);
        assert!(extract_timestamp("_1000.jpg").is_none());
        assert!(extract_timestamp("1000_.jpg").is_none());
        assert!(extract_timestamp("1__000.jpg").is_none());
    }

    #[test]
    fn test_no_extension() {
        let ts = extract_timestamp("42").unwrap();
        assert_eq!(ts.timestamp(), 42);
    }

    #[test]
    fn test_negative_epoch() {
        let ts = extract_timestamp("-60.jpg").unwrap();
        assert_eq!(ts.timestamp(), -60);
    }
}
