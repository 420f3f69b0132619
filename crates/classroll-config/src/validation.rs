//! Configuration validation

use crate::schema::{RawConfig, RawDays, RawPolicyConstants, RawSubject};
use chrono::{NaiveDate, Weekday};
use classroll_util::{DaysOfWeek, WallClock, parse_weekday, try_parse_calendar_day};
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Subject '{subject_id}': {message}")]
    SubjectError { subject_id: String, message: String },

    #[error("Duplicate subject ID: {0}")]
    DuplicateSubjectId(String),

    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Invalid day specification: {0}")]
    InvalidDaySpec(String),

    #[error("Invalid date '{value}' for subject '{subject_id}'")]
    InvalidDate { subject_id: String, value: String },

    #[error("Policy constant '{key}': {message}")]
    PolicyError { key: &'static str, message: String },

    #[error("Roster setting '{key}': {message}")]
    RosterError { key: &'static str, message: String },
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = validate_policy(&config.policy);

    if config.roster.aging_window_seconds == Some(0) {
        errors.push(ValidationError::RosterError {
            key: "aging_window_seconds",
            message: "must be greater than zero".into(),
        });
    }

    let mut seen_ids = HashSet::new();
    for subject in &config.subjects {
        if !seen_ids.insert(&subject.id) {
            errors.push(ValidationError::DuplicateSubjectId(subject.id.clone()));
        }
    }

    for subject in &config.subjects {
        errors.extend(validate_subject(subject));
    }

    errors
}

fn validate_policy(policy: &RawPolicyConstants) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let fractions = [
        ("tardiness_fraction", policy.tardiness_fraction),
        ("df_absence_fraction", policy.df_absence_fraction),
        ("at_risk_fraction", policy.at_risk_fraction),
    ];
    for (key, value) in fractions {
        if let Some(v) = value
            && !(v > 0.0 && v <= 1.0)
        {
            errors.push(ValidationError::PolicyError {
                key,
                message: format!("{} is outside (0, 1]", v),
            });
        }
    }

    let counts = [
        ("tardies_per_absence", policy.tardies_per_absence),
        ("semester_window_days", policy.semester_window_days),
        ("default_semester_weeks", policy.default_semester_weeks),
        ("default_session_count", policy.default_session_count),
        ("default_class_minutes", policy.default_class_minutes),
        ("consecutive_weeks_df", policy.consecutive_weeks_df),
    ];
    for (key, value) in counts {
        if value == Some(0) {
            errors.push(ValidationError::PolicyError {
                key,
                message: "must be greater than zero".into(),
            });
        }
    }

    errors
}

fn validate_subject(subject: &RawSubject) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if subject.id.trim().is_empty() {
        errors.push(ValidationError::SubjectError {
            subject_id: subject.id.clone(),
            message: "id cannot be empty".into(),
        });
    }

    if let Err(e) = parse_days(&subject.days) {
        errors.push(ValidationError::SubjectError {
            subject_id: subject.id.clone(),
            message: e,
        });
    }

    let mut start = None;
    if let Some(raw) = &subject.start_time {
        match parse_time(raw) {
            Ok(t) => start = Some(t),
            Err(e) => errors.push(ValidationError::InvalidTimeFormat {
                value: raw.clone(),
                message: e,
            }),
        }
    }

    let mut end = None;
    if let Some(raw) = &subject.end_time {
        match parse_time(raw) {
            Ok(t) => end = Some(t),
            Err(e) => errors.push(ValidationError::InvalidTimeFormat {
                value: raw.clone(),
                message: e,
            }),
        }
    }

    // Not fatal: the duration degrades to zero
    if let (Some(start), Some(end)) = (start, end)
        && end <= start
    {
        warn!(
            subject_id = %subject.id,
            "End time is not after start time, class duration will be zero"
        );
    }

    for value in [&subject.start_date, &subject.end_date, &subject.add_drop_until]
        .into_iter()
        .flatten()
    {
        if parse_date(value).is_none() {
            errors.push(ValidationError::InvalidDate {
                subject_id: subject.id.clone(),
                value: value.clone(),
            });
        }
    }

    errors
}

/// Parse HH:MM time format
pub fn parse_time(s: &str) -> Result<WallClock, String> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.len() != 2 {
        return Err("Expected HH:MM format".into());
    }

    let hour: u8 = parts[0]
        .parse()
        .map_err(|_| "Invalid hour".to_string())?;
    let minute: u8 = parts[1]
        .parse()
        .map_err(|_| "Invalid minute".to_string())?;

    if hour >= 24 {
        return Err("Hour must be 0-23".into());
    }
    if minute >= 60 {
        return Err("Minute must be 0-59".into());
    }

    WallClock::new(hour, minute).ok_or_else(|| "Invalid time".to_string())
}

/// Parse a calendar date in any accepted calendar-day form
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    try_parse_calendar_day(s).map(|dt| dt.date_naive())
}

/// Parse days specification
pub fn parse_days(days: &RawDays) -> Result<DaysOfWeek, String> {
    match days {
        RawDays::Preset(preset) => match preset.trim().to_lowercase().as_str() {
            "all" | "every" | "daily" => Ok(DaysOfWeek::new(0x7F)),
            "weekdays" => Ok(DaysOfWeek::WEEKDAYS),
            "weekends" => Ok(DaysOfWeek::new(DaysOfWeek::SATURDAY | DaysOfWeek::SUNDAY)),
            "mwf" => Ok(DaysOfWeek::from_weekdays([Weekday::Mon, Weekday::Wed, Weekday::Fri])),
            "tth" => Ok(DaysOfWeek::from_weekdays([Weekday::Tue, Weekday::Thu])),
            other => Err(format!("Unknown day preset: {}", other)),
        },
        RawDays::List(list) => {
            let mut parsed = Vec::with_capacity(list.len());
            for day in list {
                match parse_weekday(day) {
                    Some(weekday) => parsed.push(weekday),
                    None => return Err(format!("Unknown day: {}", day)),
                }
            }
            Ok(DaysOfWeek::from_weekdays(parsed))
        }
    }
}
