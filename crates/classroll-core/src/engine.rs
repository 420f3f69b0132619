//! Attendance policy engine
//!
//! Turns a subject schedule into session counts, contact hours and
//! absence limits. Tardiness converts to absences at a fixed ratio, and
//! D/F eligibility is judged on converted absences plus runs of fully
//! absent weeks. Every computation is a pure function of the schedule,
//! the tally and the constants the engine was built with.

use chrono::{Datelike, Duration, NaiveDate};
use classroll_api::{
    AttendanceStatus, AttendanceTally, DfEligibility, DfReason, DfStatus, PolicyThresholds,
    RiskTier, SessionOutcome, StudentPolicyStatus, TardinessConversion,
};
use classroll_config::{PolicyConstants, ScheduleConfig};
use std::collections::BTreeMap;
use tracing::debug;

/// Guards the floor in the absence threshold against representation error
const FLOOR_EPSILON: f64 = 1e-9;

/// The core policy engine
#[derive(Debug, Clone, Copy)]
pub struct PolicyEngine {
    constants: PolicyConstants,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new(PolicyConstants::default())
    }
}

impl PolicyEngine {
    pub fn new(constants: PolicyConstants) -> Self {
        Self { constants }
    }

    pub fn constants(&self) -> &PolicyConstants {
        &self.constants
    }

    /// Sessions held within the semester window starting at the schedule's
    /// start date. The schedule end date is not consulted.
    pub fn session_count(&self, schedule: &ScheduleConfig) -> u32 {
        let Some(start) = schedule.start_date else {
            debug!("No start date, using default session count");
            return self.constants.default_session_count;
        };
        if schedule.days.is_empty() {
            debug!("No meeting days, using default session count");
            return self.constants.default_session_count;
        }

        (0..self.constants.semester_window_days)
            .filter_map(|offset| start.checked_add_signed(Duration::days(offset as i64)))
            .filter(|day| schedule.days.contains(day.weekday()))
            .count() as u32
    }

    /// Minutes per class; zero marks an invalid schedule
    pub fn class_duration_minutes(&self, schedule: &ScheduleConfig) -> u32 {
        schedule
            .duration_minutes()
            .unwrap_or(self.constants.default_class_minutes)
    }

    pub fn sessions_per_week(&self, schedule: &ScheduleConfig) -> u32 {
        if schedule.days.is_empty() {
            let weeks = self.constants.default_semester_weeks.max(1);
            return (self.constants.default_session_count / weeks).max(1);
        }
        schedule.days.count()
    }

    pub fn weekly_contact_hours(&self, schedule: &ScheduleConfig) -> f64 {
        self.sessions_per_week(schedule) as f64 * self.class_duration_minutes(schedule) as f64
            / 60.0
    }

    pub fn total_contact_hours(&self, schedule: &ScheduleConfig) -> f64 {
        self.weekly_contact_hours(schedule) * self.constants.default_semester_weeks as f64
    }

    /// Minutes after class start at which a join counts as tardy
    pub fn tardiness_threshold_minutes(&self, class_minutes: u32) -> u32 {
        (class_minutes as f64 * self.constants.tardiness_fraction).round() as u32
    }

    /// Equivalent absences that trigger D/F
    pub fn absence_threshold(&self, session_count: u32) -> u32 {
        (session_count as f64 * self.constants.df_absence_fraction + FLOOR_EPSILON).floor() as u32
    }

    pub fn tardiness_limit(&self, absence_threshold: u32) -> u32 {
        absence_threshold.saturating_mul(self.constants.tardies_per_absence)
    }

    pub fn convert_tardiness(&self, tardiness_count: u32) -> TardinessConversion {
        let per_absence = self.constants.tardies_per_absence.max(1);
        TardinessConversion {
            equivalent_absences: tardiness_count / per_absence,
            remainder: tardiness_count % per_absence,
        }
    }

    pub fn thresholds(&self, schedule: &ScheduleConfig) -> PolicyThresholds {
        let class_duration_minutes = self.class_duration_minutes(schedule);
        let total_sessions = self.session_count(schedule);
        let max_allowed_absences = self.absence_threshold(total_sessions);
        let total_contact_hours = self.total_contact_hours(schedule);

        PolicyThresholds {
            class_duration_minutes,
            tardiness_threshold_minutes: self.tardiness_threshold_minutes(class_duration_minutes),
            total_sessions,
            sessions_per_week: self.sessions_per_week(schedule),
            max_allowed_absences,
            max_allowed_tardiness: self.tardiness_limit(max_allowed_absences),
            weekly_contact_hours: self.weekly_contact_hours(schedule),
            total_contact_hours,
            max_allowed_missed_hours: round2(
                total_contact_hours * self.constants.df_absence_fraction,
            ),
        }
    }

    /// Per-student standing against the absence and tardiness limits
    pub fn student_status(
        &self,
        thresholds: &PolicyThresholds,
        tally: &AttendanceTally,
    ) -> StudentPolicyStatus {
        let conversion = self.convert_tardiness(tally.tardiness_count);
        let total = tally.direct_absences.saturating_add(conversion.equivalent_absences);
        let max_absences = thresholds.max_allowed_absences;
        let max_tardiness = thresholds.max_allowed_tardiness;

        let risk = if reached(total, max_absences) {
            RiskTier::OverLimit
        } else if self.near(total, max_absences) || self.near(tally.tardiness_count, max_tardiness)
        {
            RiskTier::AtRisk
        } else {
            RiskTier::Safe
        };

        StudentPolicyStatus {
            direct_absences: tally.direct_absences,
            tardiness_count: tally.tardiness_count,
            tardiness_to_absence: conversion.equivalent_absences,
            tardiness_remainder: conversion.remainder,
            total_absence_count: total,
            absence_percentage: percentage(total, thresholds.total_sessions),
            tardiness_percentage: percentage(tally.tardiness_count, thresholds.total_sessions),
            remaining_absences: max_absences.saturating_sub(total),
            remaining_tardiness: max_tardiness.saturating_sub(tally.tardiness_count),
            risk,
        }
    }

    pub fn evaluate_df(
        &self,
        thresholds: &PolicyThresholds,
        tally: &AttendanceTally,
    ) -> DfEligibility {
        let conversion = self.convert_tardiness(tally.tardiness_count);
        let total = tally.direct_absences.saturating_add(conversion.equivalent_absences);
        let absence_threshold = thresholds.max_allowed_absences;
        let weeks_threshold = self.constants.consecutive_weeks_df;
        let weeks = tally.consecutive_weeks_absent;

        let mut reasons = Vec::new();
        if weeks >= weeks_threshold {
            reasons.push(DfReason::ConsecutiveWeeksAbsent {
                weeks,
                threshold: weeks_threshold,
            });
        }
        if reached(total, absence_threshold) {
            reasons.push(DfReason::AbsenceThresholdReached {
                total,
                threshold: absence_threshold,
            });
        }

        let eligible = !reasons.is_empty();
        let status = if eligible {
            DfStatus::DfEligible
        } else if self.near(total, absence_threshold)
            || self.near(tally.tardiness_count, thresholds.max_allowed_tardiness)
            || (weeks > 0 && weeks + 1 >= weeks_threshold)
        {
            DfStatus::AtRisk
        } else {
            DfStatus::Safe
        };

        DfEligibility {
            status,
            eligible,
            total_equivalent_absences: total,
            absence_threshold,
            consecutive_weeks_absent: weeks,
            reasons,
        }
    }

    fn near(&self, count: u32, limit: u32) -> bool {
        count > 0 && count as f64 >= self.constants.at_risk_fraction * limit as f64
    }
}

/// A limit counts as reached only with at least one absence on record
fn reached(count: u32, limit: u32) -> bool {
    count > 0 && count >= limit
}

fn percentage(count: u32, out_of: u32) -> f64 {
    if out_of == 0 {
        return 0.0;
    }
    round2(count as f64 / out_of as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Build a tally from per-session outcomes.
///
/// A week counts as absent when every session held in it was absent.
/// Weeks without any session neither extend nor break a run.
pub fn tally_from_history(history: &[SessionOutcome]) -> AttendanceTally {
    let mut weeks: BTreeMap<(i32, u32), bool> = BTreeMap::new();
    let mut tally = AttendanceTally::default();

    for outcome in history {
        let absent = outcome.status == AttendanceStatus::Absent;
        match outcome.status {
            AttendanceStatus::Absent => tally.direct_absences += 1,
            AttendanceStatus::Late => tally.tardiness_count += 1,
            _ => {}
        }

        let week = outcome.date.iso_week();
        weeks
            .entry((week.year(), week.week()))
            .and_modify(|all_absent| *all_absent &= absent)
            .or_insert(absent);
    }

    let mut run = 0;
    for all_absent in weeks.values() {
        run = if *all_absent { run + 1 } else { 0 };
        tally.consecutive_weeks_absent = tally.consecutive_weeks_absent.max(run);
    }

    tally
}

/// Convenience for collaborators holding dated outcomes
pub fn outcome(date: NaiveDate, status: AttendanceStatus) -> SessionOutcome {
    SessionOutcome { date, status }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroll_util::{DaysOfWeek, WallClock};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn mon_wed() -> ScheduleConfig {
        ScheduleConfig {
            days: DaysOfWeek::new(DaysOfWeek::MONDAY | DaysOfWeek::WEDNESDAY),
            start: WallClock::new(9, 0),
            end: WallClock::new(10, 30),
            // A Monday
            start_date: Some(date(2025, 8, 11)),
            end_date: Some(date(2025, 9, 1)),
            is_active: true,
        }
    }

    fn tally(direct: u32, tardies: u32, weeks: u32) -> AttendanceTally {
        AttendanceTally {
            direct_absences: direct,
            tardiness_count: tardies,
            consecutive_weeks_absent: weeks,
        }
    }

    /// 18 sessions: threshold 3 absences, 9 tardies
    fn eighteen_sessions() -> PolicyThresholds {
        let engine = PolicyEngine::default();
        let thresholds = engine.thresholds(&ScheduleConfig::default());
        assert_eq!(thresholds.total_sessions, 18);
        thresholds
    }

    #[test]
    fn test_session_count_over_window_ignores_end_date() {
        let engine = PolicyEngine::default();
        // 18 Mondays (offsets 0..=119 step 7) and 17 Wednesdays (2..=114)
        assert_eq!(engine.session_count(&mon_wed()), 35);
    }

    #[test]
    fn test_session_count_fallbacks() {
        let engine = PolicyEngine::default();
        let no_days = ScheduleConfig {
            days: DaysOfWeek::NONE,
            ..mon_wed()
        };
        let no_start = ScheduleConfig {
            start_date: None,
            ..mon_wed()
        };
        assert_eq!(engine.session_count(&no_days), 18);
        assert_eq!(engine.session_count(&no_start), 18);
    }

    #[test]
    fn test_class_duration_fallbacks() {
        let engine = PolicyEngine::default();
        assert_eq!(engine.class_duration_minutes(&mon_wed()), 90);
        assert_eq!(engine.class_duration_minutes(&ScheduleConfig::default()), 90);

        let reversed = ScheduleConfig {
            start: WallClock::new(11, 0),
            ..mon_wed()
        };
        assert_eq!(engine.class_duration_minutes(&reversed), 0);
        assert_eq!(engine.thresholds(&reversed).tardiness_threshold_minutes, 0);
    }

    #[test]
    fn test_thresholds_for_mon_wed() {
        let engine = PolicyEngine::default();
        let t = engine.thresholds(&mon_wed());

        assert_eq!(t.class_duration_minutes, 90);
        assert_eq!(t.tardiness_threshold_minutes, 23);
        assert_eq!(t.sessions_per_week, 2);
        assert_eq!(t.total_sessions, 35);
        // floor(35 * 0.17) = floor(5.95)
        assert_eq!(t.max_allowed_absences, 5);
        assert_eq!(t.max_allowed_tardiness, 15);
        assert_eq!(t.weekly_contact_hours, 3.0);
        assert_eq!(t.total_contact_hours, 54.0);
        assert_eq!(t.max_allowed_missed_hours, 9.18);
    }

    #[test]
    fn test_absence_threshold_is_monotonic() {
        let engine = PolicyEngine::default();
        let mut last = 0;
        for sessions in 0..=200 {
            let threshold = engine.absence_threshold(sessions);
            assert!(threshold >= last, "threshold dropped at {} sessions", sessions);
            last = threshold;
        }
        assert_eq!(engine.absence_threshold(18), 3);
        assert_eq!(engine.absence_threshold(100), 17);
    }

    #[test]
    fn test_tardiness_conversion_round_trip() {
        let engine = PolicyEngine::default();
        for count in 0..50 {
            let c = engine.convert_tardiness(count);
            assert!(c.remainder < 3);
            assert_eq!(c.equivalent_absences * 3 + c.remainder, count);
        }
    }

    #[test]
    fn test_df_boundary_at_threshold() {
        let engine = PolicyEngine::default();
        let t = eighteen_sessions();
        assert_eq!(t.max_allowed_absences, 3);

        let df = engine.evaluate_df(&t, &tally(3, 0, 0));
        assert_eq!(df.status, DfStatus::DfEligible);
        assert!(df.eligible);
        assert_eq!(
            df.reasons,
            vec![DfReason::AbsenceThresholdReached { total: 3, threshold: 3 }]
        );
        assert_eq!(engine.student_status(&t, &tally(3, 0, 0)).risk, RiskTier::OverLimit);

        let two_and_two = tally(2, 2, 0);
        assert_eq!(engine.evaluate_df(&t, &two_and_two).status, DfStatus::Safe);
        let status = engine.student_status(&t, &two_and_two);
        assert_eq!(status.risk, RiskTier::Safe);
        assert_eq!(status.total_absence_count, 2);
        assert_eq!(status.tardiness_remainder, 2);
        assert_eq!(status.remaining_absences, 1);
    }

    #[test]
    fn test_tardies_convert_into_df() {
        let engine = PolicyEngine::default();
        let t = eighteen_sessions();

        let df = engine.evaluate_df(&t, &tally(2, 3, 0));
        assert!(df.eligible);
        assert_eq!(df.total_equivalent_absences, 3);
    }

    #[test]
    fn test_consecutive_weeks_trigger_df() {
        let engine = PolicyEngine::default();
        let t = eighteen_sessions();

        let df = engine.evaluate_df(&t, &tally(0, 0, 3));
        assert!(df.eligible);
        assert_eq!(
            df.reasons,
            vec![DfReason::ConsecutiveWeeksAbsent { weeks: 3, threshold: 3 }]
        );

        assert_eq!(engine.evaluate_df(&t, &tally(0, 0, 2)).status, DfStatus::AtRisk);
        assert_eq!(engine.evaluate_df(&t, &tally(0, 0, 0)).status, DfStatus::Safe);
    }

    #[test]
    fn test_zero_threshold_needs_an_absence() {
        let engine = PolicyEngine::default();
        let t = PolicyThresholds {
            total_sessions: 5,
            max_allowed_absences: engine.absence_threshold(5),
            max_allowed_tardiness: 0,
            ..eighteen_sessions()
        };
        assert_eq!(t.max_allowed_absences, 0);

        assert_eq!(engine.evaluate_df(&t, &tally(0, 0, 0)).status, DfStatus::Safe);
        assert_eq!(engine.student_status(&t, &tally(0, 0, 0)).risk, RiskTier::Safe);
        assert!(engine.evaluate_df(&t, &tally(1, 0, 0)).eligible);
    }

    #[test]
    fn test_at_risk_tiers() {
        let engine = PolicyEngine::default();
        let t = PolicyThresholds {
            max_allowed_absences: 5,
            max_allowed_tardiness: 15,
            ..eighteen_sessions()
        };

        // 4 >= 0.8 * 5
        assert_eq!(engine.student_status(&t, &tally(4, 0, 0)).risk, RiskTier::AtRisk);
        assert_eq!(engine.student_status(&t, &tally(3, 0, 0)).risk, RiskTier::Safe);
        // 12 tardies >= 0.8 * 15, converting to 4 absences
        assert_eq!(engine.student_status(&t, &tally(0, 12, 0)).risk, RiskTier::AtRisk);
        assert_eq!(engine.evaluate_df(&t, &tally(4, 0, 0)).status, DfStatus::AtRisk);
    }

    #[test]
    fn test_extreme_counts_saturate() {
        let engine = PolicyEngine::default();
        let t = eighteen_sessions();

        let status = engine.student_status(&t, &tally(u32::MAX, 3, 0));
        assert_eq!(status.total_absence_count, u32::MAX);
        assert_eq!(status.remaining_absences, 0);
        assert_eq!(status.risk, RiskTier::OverLimit);

        let df = engine.evaluate_df(&t, &tally(u32::MAX, 3, 0));
        assert!(df.eligible);
        assert_eq!(df.total_equivalent_absences, u32::MAX);

        let lenient = PolicyEngine::new(PolicyConstants {
            tardies_per_absence: u32::MAX,
            ..PolicyConstants::default()
        });
        assert_eq!(lenient.tardiness_limit(3), u32::MAX);
    }

    #[test]
    fn test_percentages() {
        let engine = PolicyEngine::default();
        let status = engine.student_status(&eighteen_sessions(), &tally(1, 3, 0));
        // 2 of 18 sessions
        assert_eq!(status.absence_percentage, 11.11);
        assert_eq!(status.tardiness_percentage, 16.67);
    }

    #[test]
    fn test_tally_from_history() {
        use AttendanceStatus::{Absent, Late, Present};

        let history = vec![
            // Week of Aug 11: both absent
            outcome(date(2025, 8, 11), Absent),
            outcome(date(2025, 8, 13), Absent),
            // Week of Aug 18: one late breaks the run
            outcome(date(2025, 8, 18), Absent),
            outcome(date(2025, 8, 20), Late),
            // Weeks of Aug 25, Sep 1, Sep 8: all absent
            outcome(date(2025, 8, 25), Absent),
            outcome(date(2025, 9, 1), Absent),
            outcome(date(2025, 9, 3), Absent),
            outcome(date(2025, 9, 8), Absent),
            outcome(date(2025, 9, 15), Present),
        ];

        let tally = tally_from_history(&history);
        assert_eq!(tally.direct_absences, 7);
        assert_eq!(tally.tardiness_count, 1);
        assert_eq!(tally.consecutive_weeks_absent, 3);
    }

    #[test]
    fn test_tally_from_empty_history() {
        assert_eq!(tally_from_history(&[]), AttendanceTally::default());
    }
}
