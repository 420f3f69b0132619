//! Validated policy structures

use crate::schema::{RawConfig, RawPolicyConstants, RawRosterSettings, RawSubject};
use crate::validation::{parse_date, parse_days, parse_time};
use chrono::{Duration, NaiveDate};
use classroll_api::ScheduleInput;
use classroll_util::{DaysOfWeek, SubjectId, WallClock, parse_weekday};
use tracing::warn;

/// Validated policy ready for use by the core engine
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub constants: PolicyConstants,
    pub roster: RosterSettings,
    pub subjects: Vec<Subject>,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            constants: PolicyConstants::from_raw(&raw.policy),
            roster: RosterSettings::from_raw(&raw.roster),
            subjects: raw.subjects.into_iter().map(Subject::from_raw).collect(),
        }
    }

    /// Get subject by ID
    pub fn get_subject(&self, id: &SubjectId) -> Option<&Subject> {
        self.subjects.iter().find(|s| &s.id == id)
    }
}

/// Institutional attendance policy, fixed for the lifetime of an engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyConstants {
    pub tardiness_fraction: f64,
    pub tardies_per_absence: u32,
    pub df_absence_fraction: f64,
    /// 4 months of 30 days
    pub semester_window_days: u32,
    pub default_semester_weeks: u32,
    pub default_session_count: u32,
    pub default_class_minutes: u32,
    pub consecutive_weeks_df: u32,
    pub at_risk_fraction: f64,
}

impl Default for PolicyConstants {
    fn default() -> Self {
        Self {
            tardiness_fraction: 0.25,
            tardies_per_absence: 3,
            df_absence_fraction: 0.17,
            semester_window_days: 4 * 30,
            default_semester_weeks: 18,
            default_session_count: 18,
            default_class_minutes: 90,
            consecutive_weeks_df: 3,
            at_risk_fraction: 0.8,
        }
    }
}

impl PolicyConstants {
    fn from_raw(raw: &RawPolicyConstants) -> Self {
        let d = Self::default();
        Self {
            tardiness_fraction: raw.tardiness_fraction.unwrap_or(d.tardiness_fraction),
            tardies_per_absence: raw.tardies_per_absence.unwrap_or(d.tardies_per_absence),
            df_absence_fraction: raw.df_absence_fraction.unwrap_or(d.df_absence_fraction),
            semester_window_days: raw.semester_window_days.unwrap_or(d.semester_window_days),
            default_semester_weeks: raw
                .default_semester_weeks
                .unwrap_or(d.default_semester_weeks),
            default_session_count: raw.default_session_count.unwrap_or(d.default_session_count),
            default_class_minutes: raw.default_class_minutes.unwrap_or(d.default_class_minutes),
            consecutive_weeks_df: raw.consecutive_weeks_df.unwrap_or(d.consecutive_weeks_df),
            at_risk_fraction: raw.at_risk_fraction.unwrap_or(d.at_risk_fraction),
        }
    }
}

/// How the merger treats participants missing from a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterSettings {
    pub preserve_left: bool,
    pub aging_window: Duration,
}

impl Default for RosterSettings {
    fn default() -> Self {
        Self {
            preserve_left: true,
            aging_window: Duration::minutes(5),
        }
    }
}

impl RosterSettings {
    fn from_raw(raw: &RawRosterSettings) -> Self {
        let d = Self::default();
        Self {
            preserve_left: raw.preserve_left.unwrap_or(d.preserve_left),
            aging_window: raw
                .aging_window_seconds
                .map(|secs| Duration::seconds(secs as i64))
                .unwrap_or(d.aging_window),
        }
    }
}

/// A subject with its weekly schedule
#[derive(Debug, Clone)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    pub schedule: ScheduleConfig,
    pub add_drop_until: Option<NaiveDate>,
}

impl Subject {
    fn from_raw(raw: RawSubject) -> Self {
        let schedule = ScheduleConfig {
            days: parse_days(&raw.days).unwrap_or(DaysOfWeek::NONE),
            start: raw.start_time.as_deref().and_then(|s| parse_time(s).ok()),
            end: raw.end_time.as_deref().and_then(|s| parse_time(s).ok()),
            start_date: raw.start_date.as_deref().and_then(parse_date),
            end_date: raw.end_date.as_deref().and_then(parse_date),
            is_active: raw.is_active,
        };

        Self {
            name: raw.name.unwrap_or_else(|| raw.id.clone()),
            id: SubjectId::new(raw.id),
            schedule,
            add_drop_until: raw.add_drop_until.as_deref().and_then(parse_date),
        }
    }

    /// Whether a session on `date` falls in the add/drop period
    pub fn is_add_drop(&self, date: NaiveDate) -> bool {
        self.add_drop_until.is_some_and(|until| date <= until)
    }
}

/// Weekly class schedule. Missing fields activate the engine's fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub days: DaysOfWeek,
    pub start: Option<WallClock>,
    pub end: Option<WallClock>,
    pub start_date: Option<NaiveDate>,
    /// Kept for collaborators; session counting ignores it
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            days: DaysOfWeek::NONE,
            start: None,
            end: None,
            start_date: None,
            end_date: None,
            is_active: true,
        }
    }
}

impl ScheduleConfig {
    /// Lenient conversion of collaborator-supplied schedule data.
    ///
    /// Unparseable fields are dropped rather than rejected.
    pub fn from_input(input: &ScheduleInput) -> Self {
        let mut weekdays = Vec::with_capacity(input.days.len());
        for name in &input.days {
            match parse_weekday(name) {
                Some(day) => weekdays.push(day),
                None => warn!(day = %name, "Ignoring unknown weekday name"),
            }
        }

        let time = |value: &Option<String>| {
            value.as_deref().and_then(|s| match parse_time(s) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!(value = %s, error = %e, "Ignoring malformed schedule time");
                    None
                }
            })
        };

        Self {
            days: DaysOfWeek::from_weekdays(weekdays),
            start: time(&input.start_time),
            end: time(&input.end_time),
            start_date: input.start_date.as_deref().and_then(parse_date),
            end_date: input.end_date.as_deref().and_then(parse_date),
            is_active: input.is_active,
        }
    }

    /// End-of-class minutes minus start-of-class minutes.
    ///
    /// `None` when either time is missing; `Some(0)` when end is not after start.
    pub fn duration_minutes(&self) -> Option<u32> {
        let (start, end) = (self.start?, self.end?);
        Some(
            end.minutes_from_midnight()
                .saturating_sub(start.minutes_from_midnight()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn input(days: &[&str], start: Option<&str>, end: Option<&str>) -> ScheduleInput {
        ScheduleInput {
            days: days.iter().map(|d| d.to_string()).collect(),
            start_time: start.map(String::from),
            end_time: end.map(String::from),
            start_date: Some("2025-08-11".into()),
            end_date: Some("2025-12-12".into()),
            is_active: true,
        }
    }

    #[test]
    fn test_constants_defaults() {
        let c = PolicyConstants::default();
        assert_eq!(c.semester_window_days, 120);
        assert_eq!(c.tardies_per_absence, 3);
        assert_eq!(c.default_session_count, 18);
        assert_eq!(c.default_class_minutes, 90);
    }

    #[test]
    fn test_schedule_from_input() {
        let schedule = ScheduleConfig::from_input(&input(&["Monday", "wed"], Some("09:00"), Some("10:30")));
        assert!(schedule.days.contains(Weekday::Mon));
        assert!(schedule.days.contains(Weekday::Wed));
        assert_eq!(schedule.duration_minutes(), Some(90));
        assert_eq!(schedule.start_date, NaiveDate::from_ymd_opt(2025, 8, 11));
    }

    #[test]
    fn test_schedule_drops_bad_fields() {
        let schedule = ScheduleConfig::from_input(&input(&["Mon", "Caturday"], Some("9am"), Some("10:30")));
        assert_eq!(schedule.days.count(), 1);
        assert_eq!(schedule.start, None);
        assert_eq!(schedule.duration_minutes(), None);
    }

    #[test]
    fn test_reversed_times_give_zero_duration() {
        let schedule = ScheduleConfig::from_input(&input(&["Mon"], Some("11:00"), Some("10:00")));
        assert_eq!(schedule.duration_minutes(), Some(0));

        let same = ScheduleConfig::from_input(&input(&["Mon"], Some("10:00"), Some("10:00")));
        assert_eq!(same.duration_minutes(), Some(0));
    }

    #[test]
    fn test_add_drop_window() {
        let subject = Subject {
            id: SubjectId::new("CS101"),
            name: "CS101".into(),
            schedule: ScheduleConfig::default(),
            add_drop_until: NaiveDate::from_ymd_opt(2025, 8, 25),
        };

        assert!(subject.is_add_drop(NaiveDate::from_ymd_opt(2025, 8, 25).unwrap()));
        assert!(!subject.is_add_drop(NaiveDate::from_ymd_opt(2025, 8, 26).unwrap()));
    }
}
