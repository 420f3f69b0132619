//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Institutional attendance policy constants
    #[serde(default)]
    pub policy: RawPolicyConstants,

    /// Roster merge behaviour
    #[serde(default)]
    pub roster: RawRosterSettings,

    /// Subjects and their weekly schedules
    #[serde(default)]
    pub subjects: Vec<RawSubject>,
}

/// Policy constants; every key falls back to the institutional default
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawPolicyConstants {
    /// Share of class duration after which a join counts as tardy
    pub tardiness_fraction: Option<f64>,

    /// Tardiness instances that make one absence
    pub tardies_per_absence: Option<u32>,

    /// Share of total sessions that may be missed before D/F
    pub df_absence_fraction: Option<f64>,

    /// Days counted from the schedule start date
    pub semester_window_days: Option<u32>,

    /// Semester length used for contact hours
    pub default_semester_weeks: Option<u32>,

    /// Session count when the schedule is incomplete
    pub default_session_count: Option<u32>,

    /// Class duration when the schedule is incomplete
    pub default_class_minutes: Option<u32>,

    /// Consecutive absent weeks that trigger D/F on their own
    pub consecutive_weeks_df: Option<u32>,

    /// Share of a limit at which a student is flagged at risk
    pub at_risk_fraction: Option<f64>,
}

/// Roster merge settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRosterSettings {
    /// Keep participants missing from a batch, marked as left
    pub preserve_left: Option<bool>,

    /// Seconds a missing participant is kept before eviction
    pub aging_window_seconds: Option<u64>,
}

/// Raw subject definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSubject {
    /// Unique stable ID
    pub id: String,

    /// Display name
    pub name: Option<String>,

    /// Meeting days: "weekdays", "all", or a list like ["Monday", "wed"]
    pub days: RawDays,

    /// Start time (HH:MM format)
    pub start_time: Option<String>,

    /// End time (HH:MM format)
    pub end_time: Option<String>,

    /// First day of the semester
    pub start_date: Option<String>,

    /// Last day of the semester (not used for session counting)
    pub end_date: Option<String>,

    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Sessions on or before this date fall in the add/drop period
    pub add_drop_until: Option<String>,
}

fn default_active() -> bool {
    true
}

/// Days specification
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawDays {
    Preset(String),
    List(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_subject_entry() {
        let toml_str = r#"
            config_version = 1

            [[subjects]]
            id = "CS101"
            days = ["Monday", "Wednesday"]
            start_time = "09:00"
            end_time = "10:30"
            start_date = "2025-08-11"
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.subjects.len(), 1);
        assert_eq!(config.subjects[0].id, "CS101");
        assert!(config.subjects[0].is_active);
        assert!(config.policy.tardiness_fraction.is_none());
    }

    #[test]
    fn parse_policy_and_roster_tables() {
        let toml_str = r#"
            config_version = 1

            [policy]
            tardies_per_absence = 4
            df_absence_fraction = 0.2

            [roster]
            preserve_left = false
            aging_window_seconds = 120

            [[subjects]]
            id = "MATH2"
            days = "weekdays"
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.policy.tardies_per_absence, Some(4));
        assert_eq!(config.roster.preserve_left, Some(false));
        assert!(matches!(config.subjects[0].days, RawDays::Preset(_)));
    }
}
