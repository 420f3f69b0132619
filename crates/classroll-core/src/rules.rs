//! Post-derivation status rules for students

use chrono::{DateTime, Utc};
use classroll_api::AttendanceStatus;

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleContext {
    pub is_tardy: bool,
    pub session_is_during_add_drop: bool,
    pub instructor_late: bool,
    /// Class start plus one third of its duration
    pub first_third_threshold: Option<DateTime<Utc>>,
    pub leave_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedRule {
    /// Left inside the first third of a class the instructor was late to
    InstructorLateness,
    /// Tardy outside the add/drop period
    Tardiness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleOutcome {
    pub status: AttendanceStatus,
    pub applied: Option<AppliedRule>,
}

/// Apply the rules in order. Instructor lateness stops evaluation.
pub fn evaluate_status_rules(status: AttendanceStatus, ctx: &RuleContext) -> RuleOutcome {
    if ctx.instructor_late
        && status == AttendanceStatus::Absent
        && let (Some(threshold), Some(leave)) = (ctx.first_third_threshold, ctx.leave_at)
        && leave < threshold
    {
        return RuleOutcome {
            status: AttendanceStatus::Present,
            applied: Some(AppliedRule::InstructorLateness),
        };
    }

    if status == AttendanceStatus::Present && ctx.is_tardy && !ctx.session_is_during_add_drop {
        return RuleOutcome {
            status: AttendanceStatus::Late,
            applied: Some(AppliedRule::Tardiness),
        };
    }

    RuleOutcome {
        status,
        applied: None,
    }
}

pub fn apply_status_rules(status: AttendanceStatus, ctx: &RuleContext) -> AttendanceStatus {
    evaluate_status_rules(status, ctx).status
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, h, m, 0).unwrap()
    }

    fn late_instructor(leave: DateTime<Utc>) -> RuleContext {
        RuleContext {
            instructor_late: true,
            first_third_threshold: Some(at(9, 30)),
            leave_at: Some(leave),
            ..Default::default()
        }
    }

    #[test]
    fn test_instructor_lateness_overrides_absence() {
        let outcome = evaluate_status_rules(AttendanceStatus::Absent, &late_instructor(at(9, 20)));
        assert_eq!(outcome.status, AttendanceStatus::Present);
        assert_eq!(outcome.applied, Some(AppliedRule::InstructorLateness));

        // Leaving at the threshold itself is not "before" it
        let at_threshold = late_instructor(at(9, 30));
        assert_eq!(
            apply_status_rules(AttendanceStatus::Absent, &at_threshold),
            AttendanceStatus::Absent
        );

        let punctual = RuleContext {
            instructor_late: false,
            ..late_instructor(at(9, 20))
        };
        assert_eq!(
            apply_status_rules(AttendanceStatus::Absent, &punctual),
            AttendanceStatus::Absent
        );
    }

    #[test]
    fn test_instructor_lateness_stops_evaluation() {
        let ctx = RuleContext {
            is_tardy: true,
            ..late_instructor(at(9, 20))
        };
        assert_eq!(apply_status_rules(AttendanceStatus::Absent, &ctx), AttendanceStatus::Present);
    }

    #[test]
    fn test_tardiness_overrides_present() {
        let ctx = RuleContext {
            is_tardy: true,
            ..Default::default()
        };
        let outcome = evaluate_status_rules(AttendanceStatus::Present, &ctx);
        assert_eq!(outcome.status, AttendanceStatus::Late);
        assert_eq!(outcome.applied, Some(AppliedRule::Tardiness));

        assert_eq!(apply_status_rules(AttendanceStatus::Pending, &ctx), AttendanceStatus::Pending);
    }

    #[test]
    fn test_add_drop_waives_tardiness() {
        let ctx = RuleContext {
            is_tardy: true,
            session_is_during_add_drop: true,
            ..Default::default()
        };
        let outcome = evaluate_status_rules(AttendanceStatus::Present, &ctx);
        assert_eq!(outcome.status, AttendanceStatus::Present);
        assert_eq!(outcome.applied, None);
    }
}
