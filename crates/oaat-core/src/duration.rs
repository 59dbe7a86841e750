//! Duration and time-of-day parsing.
//!
//! Durations are written as repeated `<int><unit>` tokens (`"1h30m"`,
//! `"5 hours 6 m 100 sec"`). Tokens may appear anywhere in the string and
//! text between them is ignored. Time-of-day values (`"09:30"`,
//! `"22+02:00"`) are normalized to an offset from UTC midnight so that
//! no-start windows can be checked against the current time.

use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use regex::Regex;
use thiserror::Error;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

static DURATION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d+)\s*(weeks?|wks?|w|days?|d|hours?|hrs?|h|minutes?|mins?|m|seconds?|secs?|s)",
    )
    .expect("duration token pattern is valid")
});

static TIME_OF_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2})(?::(\d{2}))?\s*(Z|z|[+-]\d{1,2}(?::?\d{2})?)?\s*$")
        .expect("time-of-day pattern is valid")
});

static ZONE_OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-])(\d{1,2})(?::?(\d{2}))?$").expect("zone offset pattern is valid")
});

/// Errors from parsing time-of-day values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid time of day: {0:?}")]
    InvalidTime(String),

    #[error("invalid time zone: {0:?}")]
    InvalidZone(String),
}

/// Parse a human-readable duration such as `"1h30m"` or `"2 days 4 hours"`.
///
/// Repeated tokens of the same unit are summed. Returns `None` when no token
/// matches at all, which keeps "not specified" distinct from `"0s"`.
pub fn parse_duration(text: &str) -> Option<TimeDelta> {
    let mut matched = false;
    let mut total: i64 = 0;

    for caps in DURATION_TOKEN.captures_iter(text) {
        matched = true;
        let amount: i64 = caps[1].parse().unwrap_or(i64::MAX);
        let unit = caps[2].to_ascii_lowercase();
        let scale = match unit.as_bytes()[0] {
            b'w' => 7 * SECONDS_PER_DAY,
            b'd' => SECONDS_PER_DAY,
            b'h' => 60 * 60,
            b'm' => 60,
            _ => 1,
        };
        total = total.saturating_add(amount.saturating_mul(scale));
    }

    if !matched {
        return None;
    }
    Some(TimeDelta::try_seconds(total).unwrap_or(TimeDelta::MAX))
}

/// Parse a time of day (`HH` or `HH:MM`, optional `Z`/`±HH:MM` suffix) into
/// an offset from UTC midnight in `[0, 24h)`.
///
/// `tz` is used when the time carries no zone suffix; both absent means UTC.
pub fn parse_time_of_day(time: &str, tz: Option<&str>) -> Result<TimeDelta, DurationError> {
    let caps = TIME_OF_DAY
        .captures(time)
        .ok_or_else(|| DurationError::InvalidTime(time.to_string()))?;

    let hours: i64 = caps[1]
        .parse()
        .map_err(|_| DurationError::InvalidTime(time.to_string()))?;
    let minutes: i64 = match caps.get(2) {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|_| DurationError::InvalidTime(time.to_string()))?,
        None => 0,
    };
    if hours > 23 || minutes > 59 {
        return Err(DurationError::InvalidTime(time.to_string()));
    }

    let zone = caps.get(3).map(|m| m.as_str()).or(tz);
    let offset = match zone {
        Some(zone) => parse_zone_offset(zone)?,
        None => 0,
    };

    let local = hours * 3600 + minutes * 60;
    Ok(TimeDelta::seconds((local - offset).rem_euclid(SECONDS_PER_DAY)))
}

/// Offset of a zone designator east of UTC, in seconds.
fn parse_zone_offset(zone: &str) -> Result<i64, DurationError> {
    let zone = zone.trim();
    if zone.eq_ignore_ascii_case("z") || zone.eq_ignore_ascii_case("utc") {
        return Ok(0);
    }
    let caps = ZONE_OFFSET
        .captures(zone)
        .ok_or_else(|| DurationError::InvalidZone(zone.to_string()))?;
    let hours: i64 = caps[2]
        .parse()
        .map_err(|_| DurationError::InvalidZone(zone.to_string()))?;
    let minutes: i64 = match caps.get(3) {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|_| DurationError::InvalidZone(zone.to_string()))?,
        None => 0,
    };
    if hours > 14 || minutes > 59 {
        return Err(DurationError::InvalidZone(zone.to_string()));
    }
    let magnitude = hours * 3600 + minutes * 60;
    Ok(if &caps[1] == "-" { -magnitude } else { magnitude })
}

/// Offset of `at` from UTC midnight.
pub fn time_of_day(at: DateTime<Utc>) -> TimeDelta {
    TimeDelta::seconds(i64::from(at.num_seconds_from_midnight()))
}

/// A daily window between two times of day, both offsets from UTC midnight.
///
/// When `start > end` the window wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: TimeDelta,
    pub end: TimeDelta,
}

impl TimeWindow {
    pub fn new(start: TimeDelta, end: TimeDelta) -> Self {
        Self { start, end }
    }

    /// Whether the time of day `t` falls inside the window (inclusive).
    pub fn contains(&self, t: TimeDelta) -> bool {
        if self.start <= self.end {
            t >= self.start && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }

    /// Whether the instant `at` falls inside the window.
    pub fn contains_instant(&self, at: DateTime<Utc>) -> bool {
        self.contains(time_of_day(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hms(h: i64, m: i64, s: i64) -> TimeDelta {
        TimeDelta::seconds(h * 3600 + m * 60 + s)
    }

    #[test]
    fn compact_duration() {
        assert_eq!(parse_duration("1h30m"), Some(hms(1, 30, 0)));
    }

    #[test]
    fn spaced_duration_folds_seconds_into_minutes() {
        assert_eq!(parse_duration("5 hour 6 m 100 sec"), Some(hms(5, 7, 40)));
    }

    #[test]
    fn same_unit_tokens_are_summed() {
        assert_eq!(parse_duration("1m 1m 1 minute"), Some(hms(0, 3, 0)));
    }

    #[test]
    fn weeks_and_days() {
        assert_eq!(
            parse_duration("1 week 2 days"),
            Some(TimeDelta::days(9))
        );
        assert_eq!(parse_duration("3wks"), Some(TimeDelta::weeks(3)));
    }

    #[test]
    fn zero_is_distinct_from_unspecified() {
        assert_eq!(parse_duration("0s"), Some(TimeDelta::zero()));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn unmatched_text_between_tokens_is_ignored() {
        assert_eq!(
            parse_duration("every 2 hours, plus 15 minutes"),
            Some(hms(2, 15, 0))
        );
    }

    #[test]
    fn time_of_day_defaults_to_utc() {
        assert_eq!(parse_time_of_day("09:30", None), Ok(hms(9, 30, 0)));
        assert_eq!(parse_time_of_day("7", None), Ok(hms(7, 0, 0)));
        assert_eq!(parse_time_of_day("23:59Z", None), Ok(hms(23, 59, 0)));
    }

    #[test]
    fn time_of_day_applies_zone_and_wraps() {
        assert_eq!(parse_time_of_day("09:00+02:00", None), Ok(hms(7, 0, 0)));
        assert_eq!(parse_time_of_day("01:00+02:00", None), Ok(hms(23, 0, 0)));
        assert_eq!(parse_time_of_day("22:00", Some("-05:00")), Ok(hms(3, 0, 0)));
    }

    #[test]
    fn suffix_zone_wins_over_tz_argument() {
        assert_eq!(
            parse_time_of_day("10:00Z", Some("+03:00")),
            Ok(hms(10, 0, 0))
        );
    }

    #[test]
    fn invalid_times_are_rejected() {
        assert!(matches!(
            parse_time_of_day("25:00", None),
            Err(DurationError::InvalidTime(_))
        ));
        assert!(matches!(
            parse_time_of_day("noon", None),
            Err(DurationError::InvalidTime(_))
        ));
        assert!(matches!(
            parse_time_of_day("10:00", Some("Mars/Olympus")),
            Err(DurationError::InvalidZone(_))
        ));
    }

    #[test]
    fn plain_window_is_closed_interval() {
        let window = TimeWindow::new(hms(9, 0, 0), hms(17, 0, 0));
        assert!(window.contains(hms(9, 0, 0)));
        assert!(window.contains(hms(12, 0, 0)));
        assert!(window.contains(hms(17, 0, 0)));
        assert!(!window.contains(hms(17, 0, 1)));
        assert!(!window.contains(hms(8, 59, 59)));
    }

    #[test]
    fn wrapping_window_spans_midnight() {
        let window = TimeWindow::new(hms(22, 0, 0), hms(2, 0, 0));
        assert!(window.contains(hms(23, 0, 0)));
        assert!(window.contains(hms(0, 30, 0)));
        assert!(window.contains(hms(2, 0, 0)));
        assert!(!window.contains(hms(12, 0, 0)));
    }

    #[test]
    fn window_checks_instants_in_utc() {
        let window = TimeWindow::new(hms(1, 0, 0), hms(3, 0, 0));
        let inside = Utc.with_ymd_and_hms(2024, 5, 1, 2, 15, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2024, 5, 1, 4, 0, 0).unwrap();
        assert!(window.contains_instant(inside));
        assert!(!window.contains_instant(outside));
    }
}
