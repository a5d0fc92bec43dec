//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use regex::Regex;
use tally_core::{ValidationError, validate};

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+(second|minute|hour|day|week)s?\s+ago$").unwrap()
});

/// Estimates like `90m`, `2h`, `1h30m` or `1h 30m`.
static ESTIMATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:(\d+)h)?\s*(?:(\d+)m)?$").unwrap());

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Parse a datetime string as either ISO 8601 or relative time.
///
/// Supports:
/// - ISO 8601: "2026-01-15T10:30:00Z"
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
///
/// Relative times are resolved against `now`.
pub fn parse_datetime(s: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let s = s.trim();

    // Try ISO 8601 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try relative time: "N seconds/minutes/hours/days/weeks ago"
    let Some(caps) = RELATIVE_TIME_RE.captures(s) else {
        return Err(ValidationError::InvalidFormat {
            field: "timestamp",
            value: s.to_string(),
            expected: "use ISO 8601 (e.g., 2026-01-15T10:30:00Z) or relative (e.g., '2 hours ago')",
        }
        .into());
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    if &caps[2] == "second" {
        if n > MAX_RELATIVE_MINUTES * 60 {
            anyhow::bail!("Relative time value too large: {n} seconds");
        }
        return Ok(now - Duration::seconds(n));
    }

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok(now - Duration::minutes(n * minutes_per_unit))
}

/// Parses an optional `--at` argument.
pub fn parse_at(at: Option<&str>, now: DateTime<Utc>) -> anyhow::Result<Option<DateTime<Utc>>> {
    at.map(|s| parse_datetime(s, now)).transpose()
}

/// Parses an estimate into validated minutes.
///
/// A bare number is taken as minutes.
pub fn parse_estimate(s: &str) -> Result<u32, ValidationError> {
    let s = s.trim();
    let invalid = || ValidationError::InvalidFormat {
        field: "estimate",
        value: s.to_string(),
        expected: "use minutes or hours, e.g. 90m, 2h, 1h30m",
    };

    if let Ok(minutes) = s.parse::<u32>() {
        return validate::estimate_minutes(minutes);
    }

    let caps = ESTIMATE_RE.captures(s).filter(|_| !s.is_empty()).ok_or_else(invalid)?;
    if caps.get(1).is_none() && caps.get(2).is_none() {
        return Err(invalid());
    }
    let part = |i: usize| -> Result<u64, ValidationError> {
        caps.get(i)
            .map_or(Ok(0), |m| m.as_str().parse::<u64>().map_err(|_| invalid()))
    };
    let total = part(1)?
        .checked_mul(60)
        .and_then(|h| h.checked_add(part(2).ok()?))
        .ok_or_else(invalid)?;
    let minutes = u32::try_from(total).unwrap_or(u32::MAX);
    validate::estimate_minutes(minutes)
}

// ========== Formatting ==========

/// Formats seconds as a duration string.
///
/// Returns "Xh Ym" if >= 1 hour, "Xm Ys" if >= 1 minute, "Xs" otherwise.
/// Negative durations are shown as 0s.
pub fn format_duration(seconds: i64) -> String {
    if seconds <= 0 {
        return "0s".to_string();
    }
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else if minutes >= 1 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// Formats minutes the way estimates are entered, e.g. "1h30m".
pub fn format_estimate(minutes: u32) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h{m}m"),
    }
}

/// RFC 3339 in UTC, whole seconds.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// First eight characters of a session ID, enough to tell sessions apart.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_datetime_iso8601() {
        let result = parse_datetime("2025-01-15T10:30:00Z", now()).unwrap();
        assert_eq!(result, Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_datetime_with_offset_converts_to_utc() {
        let result = parse_datetime("2025-01-15T10:30:00+02:00", now()).unwrap();
        assert_eq!(result, Utc.with_ymd_and_hms(2025, 1, 15, 8, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_datetime_relative() {
        assert_eq!(
            parse_datetime("15 minutes ago", now()).unwrap(),
            now() - Duration::minutes(15)
        );
        assert_eq!(
            parse_datetime("1 hour ago", now()).unwrap(),
            now() - Duration::hours(1)
        );
        assert_eq!(
            parse_datetime("2 days ago", now()).unwrap(),
            now() - Duration::days(2)
        );
        assert_eq!(
            parse_datetime("30 seconds ago", now()).unwrap(),
            now() - Duration::seconds(30)
        );
    }

    #[test]
    fn test_parse_datetime_invalid_is_validation_error() {
        let err = parse_datetime("yesterday-ish", now()).unwrap_err();
        assert!(err.downcast_ref::<ValidationError>().is_some());
    }

    #[test]
    fn test_parse_datetime_rejects_huge_values() {
        assert!(parse_datetime("99999999 weeks ago", now()).is_err());
    }

    #[test]
    fn test_parse_estimate_forms() {
        assert_eq!(parse_estimate("90m").unwrap(), 90);
        assert_eq!(parse_estimate("2h").unwrap(), 120);
        assert_eq!(parse_estimate("1h30m").unwrap(), 90);
        assert_eq!(parse_estimate("1h 30m").unwrap(), 90);
        assert_eq!(parse_estimate("45").unwrap(), 45);
    }

    #[test]
    fn test_parse_estimate_rejects_garbage_and_out_of_range() {
        for input in ["", "h", "1.5h", "soon", "30x"] {
            assert!(
                matches!(
                    parse_estimate(input),
                    Err(ValidationError::InvalidFormat { .. })
                ),
                "{input:?} should be rejected"
            );
        }
        assert!(matches!(
            parse_estimate("0m"),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            parse_estimate("200h"),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(-5), "0s");
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(240), "4m 0s");
        assert_eq!(format_duration(380), "6m 20s");
        assert_eq!(format_duration(5400), "1h 30m");
    }

    #[test]
    fn test_format_estimate() {
        assert_eq!(format_estimate(45), "45m");
        assert_eq!(format_estimate(120), "2h");
        assert_eq!(format_estimate(90), "1h30m");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
