//! Time utilities for classroll
//!
//! Every timestamp is carried as `DateTime<Utc>`; calendar days are UTC
//! midnight instants. Parsing never fails loudly: malformed input yields
//! `None` and the caller picks the fallback.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `CLASSROLL_MOCK_TIME` environment variable can be set
//! to override the reference instant returned by [`now`]. Only outermost
//! callers use [`now`]; everything below takes the instant as a parameter.
//!
//! Format: `YYYY-MM-DD HH:MM:SS`, read as UTC (e.g., `2025-08-11 09:30:00`)

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "CLASSROLL_MOCK_TIME";

/// Offset between mock time and real time, fixed at first use so mock time
/// advances naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<Duration>> = OnceLock::new();

fn get_mock_time_offset() -> Option<Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                if let Ok(naive_dt) =
                    NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S")
                {
                    let mock_dt = Utc.from_utc_datetime(&naive_dt);
                    let offset = mock_dt.signed_duration_since(Utc::now());
                    tracing::info!(
                        mock_time = %mock_time_str,
                        offset_secs = offset.num_seconds(),
                        "Mock time enabled"
                    );
                    return Some(offset);
                }
                tracing::warn!(
                    mock_time = %mock_time_str,
                    expected_format = "%Y-%m-%d %H:%M:%S",
                    "Invalid mock time format"
                );
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Current instant, respecting mock time settings in debug builds.
pub fn now() -> DateTime<Utc> {
    let real_now = Utc::now();

    if let Some(offset) = get_mock_time_offset() {
        real_now + offset
    } else {
        real_now
    }
}

/// A clock reading as captured, not range-checked.
///
/// `25:00:00` is kept as hour 25; resolving it against a base date rolls
/// into the following day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTriple {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl ClockTriple {
    pub fn seconds_from_midnight(&self) -> i64 {
        i64::from(self.hour) * 3600 + i64::from(self.minute) * 60 + i64::from(self.second)
    }
}

/// Parse `H:MM:SS`, `H:MM` or `H`. Missing fields default to 0.
pub fn parse_clock_triple(text: &str) -> Option<ClockTriple> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let parts: Vec<&str> = text.split(':').map(str::trim).collect();
    if parts.len() > 3 {
        return None;
    }

    let field = |idx: usize| -> Option<u32> {
        match parts.get(idx) {
            None => Some(0),
            Some(p) if p.is_empty() && idx > 0 => Some(0),
            Some(p) if p.chars().all(|c| c.is_ascii_digit()) => p.parse().ok(),
            Some(_) => None,
        }
    };

    Some(ClockTriple {
        hour: field(0)?,
        minute: field(1)?,
        second: field(2)?,
    })
}

/// Parse an absolute timestamp. Offset-less forms are read as UTC.
pub fn parse_absolute_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Resolve a captured time value.
///
/// An absolute timestamp is returned verbatim; otherwise the value is read
/// as a clock triple on the calendar day of `base`.
pub fn resolve_timestamp(value: &str, base: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(absolute) = parse_absolute_timestamp(value) {
        return Some(absolute);
    }

    let clock = parse_clock_triple(value)?;
    let midnight = utc_midnight(base.date_naive());
    midnight.checked_add_signed(Duration::try_seconds(clock.seconds_from_midnight())?)
}

/// Zero-padded `HH:MM:SS`.
pub fn format_clock(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(|dt| format!("{:02}:{:02}:{:02}", dt.hour(), dt.minute(), dt.second()))
}

/// UTC midnight of a calendar date
pub fn utc_midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Parse a calendar day into its UTC midnight.
///
/// Accepts an absolute timestamp, `YYYY-MM-DD`, or day-first
/// `dd/mm/yyyy` (also `-` or `.` separated); two-digit years are 20xx.
pub fn try_parse_calendar_day(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Some(dt) = parse_absolute_timestamp(input) {
        return Some(utc_midnight(dt.date_naive()));
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Some(utc_midnight(date));
    }

    let parts: Vec<&str> = input.split(['/', '-', '.']).collect();
    if parts.len() != 3 || parts[0].len() > 2 {
        return None;
    }
    if !parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }

    let day: u32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let mut year: i32 = parts[2].parse().ok()?;
    if parts[2].len() <= 2 {
        year += 2000;
    }

    NaiveDate::from_ymd_opt(year, month, day).map(utc_midnight)
}

/// [`try_parse_calendar_day`] with a fallback of `today` at UTC midnight.
///
/// The fallback is a last resort, not a validated result.
pub fn parse_calendar_day(input: &str, today: NaiveDate) -> DateTime<Utc> {
    try_parse_calendar_day(input).unwrap_or_else(|| {
        tracing::debug!(input = %input, "Unparseable calendar day, using today");
        utc_midnight(today)
    })
}

/// Wall-clock time of day for class schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    /// Returns minutes since midnight
    pub fn minutes_from_midnight(&self) -> u32 {
        (self.hour as u32) * 60 + self.minute as u32
    }

    /// This clock time on the given day, in UTC
    pub fn on(&self, date: NaiveDate) -> DateTime<Utc> {
        utc_midnight(date) + Duration::minutes(i64::from(self.minutes_from_midnight()))
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.minutes_from_midnight().cmp(&other.minutes_from_midnight())
    }
}

/// Days of the week mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DaysOfWeek(u8);

impl DaysOfWeek {
    pub const MONDAY: u8 = 1 << 0;
    pub const TUESDAY: u8 = 1 << 1;
    pub const WEDNESDAY: u8 = 1 << 2;
    pub const THURSDAY: u8 = 1 << 3;
    pub const FRIDAY: u8 = 1 << 4;
    pub const SATURDAY: u8 = 1 << 5;
    pub const SUNDAY: u8 = 1 << 6;

    pub const WEEKDAYS: DaysOfWeek = DaysOfWeek(
        Self::MONDAY | Self::TUESDAY | Self::WEDNESDAY | Self::THURSDAY | Self::FRIDAY,
    );
    pub const NONE: DaysOfWeek = DaysOfWeek(0);

    pub fn new(mask: u8) -> Self {
        Self(mask & 0x7F)
    }

    fn bit(weekday: Weekday) -> u8 {
        match weekday {
            Weekday::Mon => Self::MONDAY,
            Weekday::Tue => Self::TUESDAY,
            Weekday::Wed => Self::WEDNESDAY,
            Weekday::Thu => Self::THURSDAY,
            Weekday::Fri => Self::FRIDAY,
            Weekday::Sat => Self::SATURDAY,
            Weekday::Sun => Self::SUNDAY,
        }
    }

    pub fn from_weekdays(days: impl IntoIterator<Item = Weekday>) -> Self {
        days.into_iter()
            .fold(Self::NONE, |acc, day| Self(acc.0 | Self::bit(day)))
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        (self.0 & Self::bit(weekday)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of days in the set (sessions per week)
    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn mask(&self) -> u8 {
        self.0
    }
}

/// Parse a weekday name, full or abbreviated, case-insensitive
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.trim().to_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tues" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thur" | "thurs" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Helper to format durations in human-readable form
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_parse_clock_triple() {
        assert_eq!(
            parse_clock_triple("9:05:30"),
            Some(ClockTriple { hour: 9, minute: 5, second: 30 })
        );
        assert_eq!(
            parse_clock_triple("14:30"),
            Some(ClockTriple { hour: 14, minute: 30, second: 0 })
        );
        assert_eq!(
            parse_clock_triple("7"),
            Some(ClockTriple { hour: 7, minute: 0, second: 0 })
        );
    }

    #[test]
    fn test_parse_clock_triple_keeps_out_of_range() {
        assert_eq!(
            parse_clock_triple("25:75"),
            Some(ClockTriple { hour: 25, minute: 75, second: 0 })
        );
    }

    #[test]
    fn test_parse_clock_triple_rejects_garbage() {
        assert_eq!(parse_clock_triple(""), None);
        assert_eq!(parse_clock_triple("   "), None);
        assert_eq!(parse_clock_triple("ten:30"), None);
        assert_eq!(parse_clock_triple("10:3x"), None);
        assert_eq!(parse_clock_triple(":30"), None);
        assert_eq!(parse_clock_triple("1:2:3:4"), None);
    }

    #[test]
    fn test_resolve_absolute_verbatim() {
        let base = at(2025, 8, 11, 0, 0, 0);
        assert_eq!(
            resolve_timestamp("2025-09-01T10:15:00Z", base),
            Some(at(2025, 9, 1, 10, 15, 0))
        );
        assert_eq!(
            resolve_timestamp("2025-09-01T10:15:00+02:00", base),
            Some(at(2025, 9, 1, 8, 15, 0))
        );
        assert_eq!(
            resolve_timestamp("2025-09-01 10:15:00", base),
            Some(at(2025, 9, 1, 10, 15, 0))
        );
    }

    #[test]
    fn test_resolve_clock_against_base() {
        let base = at(2025, 8, 11, 17, 42, 9);
        assert_eq!(resolve_timestamp("9:30", base), Some(at(2025, 8, 11, 9, 30, 0)));
        assert_eq!(resolve_timestamp("25:00", base), Some(at(2025, 8, 12, 1, 0, 0)));
        assert_eq!(resolve_timestamp("soon", base), None);
        assert_eq!(resolve_timestamp("", base), None);
    }

    #[test]
    fn test_resolve_clock_past_date_range_is_none() {
        let base = at(2025, 8, 11, 0, 0, 0);
        assert_eq!(resolve_timestamp("4294967295", base), None);
        assert_eq!(resolve_timestamp("4294967295:4294967295:4294967295", base), None);
        assert!(resolve_timestamp("876000:00", base).is_some());
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(
            format_clock(Some(at(2025, 8, 11, 7, 5, 3))),
            Some("07:05:03".to_string())
        );
        assert_eq!(format_clock(None), None);
    }

    #[test]
    fn test_calendar_day_formats() {
        let expected = at(2025, 8, 11, 0, 0, 0);
        assert_eq!(try_parse_calendar_day("2025-08-11"), Some(expected));
        assert_eq!(try_parse_calendar_day("11/08/2025"), Some(expected));
        assert_eq!(try_parse_calendar_day("11/08/25"), Some(expected));
        assert_eq!(try_parse_calendar_day("11-08-2025"), Some(expected));
        assert_eq!(try_parse_calendar_day("2025-08-11T22:30:00Z"), Some(expected));
    }

    #[test]
    fn test_calendar_day_rejects_invalid() {
        assert_eq!(try_parse_calendar_day("31/02/2025"), None);
        assert_eq!(try_parse_calendar_day("next monday"), None);
        assert_eq!(try_parse_calendar_day(""), None);
    }

    #[test]
    fn test_calendar_day_fallback() {
        let today = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        assert_eq!(parse_calendar_day("garbage", today), at(2025, 10, 1, 0, 0, 0));
        assert_eq!(parse_calendar_day("02/10/2025", today), at(2025, 10, 2, 0, 0, 0));
    }

    #[test]
    fn test_wall_clock_ordering() {
        let morning = WallClock::new(8, 0).unwrap();
        let noon = WallClock::new(12, 0).unwrap();
        assert!(morning < noon);
        assert_eq!(noon.minutes_from_midnight(), 720);
        assert!(WallClock::new(24, 0).is_none());
    }

    #[test]
    fn test_wall_clock_on_date() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 11).unwrap();
        let start = WallClock::new(9, 15).unwrap().on(date);
        assert_eq!(start, at(2025, 8, 11, 9, 15, 0));
    }

    #[test]
    fn test_days_of_week() {
        let days = DaysOfWeek::from_weekdays([Weekday::Mon, Weekday::Wed]);
        assert!(days.contains(Weekday::Mon));
        assert!(days.contains(Weekday::Wed));
        assert!(!days.contains(Weekday::Tue));
        assert_eq!(days.count(), 2);
        assert_eq!(DaysOfWeek::WEEKDAYS.count(), 5);
        assert!(DaysOfWeek::NONE.is_empty());
    }

    #[test]
    fn test_parse_weekday_names() {
        assert_eq!(parse_weekday("Monday"), Some(Weekday::Mon));
        assert_eq!(parse_weekday("wed"), Some(Weekday::Wed));
        assert_eq!(parse_weekday(" THU "), Some(Weekday::Thu));
        assert_eq!(parse_weekday("funday"), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3661), "1h 1m 1s");
    }

    #[test]
    fn test_now_returns_time() {
        let t = now();
        assert!(t.year() >= 2020);
        assert!(t.year() <= 2100);
    }
}
