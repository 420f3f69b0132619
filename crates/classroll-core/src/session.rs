//! Per-session batch pipeline
//!
//! A `SessionTracker` owns the roster of one meeting instance. Each batch
//! is normalized, merged, and then every affected record is re-derived:
//! raw status, final status, then the student rules. Once the meeting is
//! finalized every retained record is re-derived on each batch, so
//! pending students settle even when they never reappear.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use classroll_api::{
    AttendanceStatus, BatchMetadata, EventBatch, Heartbeat, ParticipantResult,
};
use classroll_config::{RosterSettings, Subject};
use classroll_util::{
    ParticipantToken, SessionKey, format_clock, format_duration, resolve_timestamp, utc_midnight,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    CoreEvent, DerivationContext, MeetingPhase, MergeReport, ParticipantEvent, ParticipantRecord,
    PolicyEngine, Role, Roster, RuleContext, StatusInput, StatusOutcome, apply_status_rules,
    derive_raw_status, determine_final_status,
};

/// Timing facts for one scheduled class instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSchedule {
    pub class_start: DateTime<Utc>,
    /// Joins after this are tardy
    pub tardiness_cutoff: DateTime<Utc>,
    pub first_third_threshold: DateTime<Utc>,
    pub during_add_drop: bool,
}

impl SessionSchedule {
    /// `None` when the subject has no start time
    pub fn for_subject(engine: &PolicyEngine, subject: &Subject, date: NaiveDate) -> Option<Self> {
        let start = subject.schedule.start?;
        let class_start = start.on(date);
        let minutes = engine.class_duration_minutes(&subject.schedule);
        let tardiness = engine.tardiness_threshold_minutes(minutes);

        Some(Self {
            class_start,
            tardiness_cutoff: class_start + Duration::minutes(tardiness as i64),
            first_third_threshold: class_start + Duration::seconds(minutes as i64 * 60 / 3),
            during_add_drop: subject.is_add_drop(date),
        })
    }

    pub fn is_tardy_join(&self, join_at: DateTime<Utc>) -> bool {
        join_at > self.tardiness_cutoff
    }
}

/// Everything produced by one batch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub session: SessionKey,
    pub results: Vec<ParticipantResult>,
    pub metadata: BatchMetadata,
    pub heartbeat: Heartbeat,
    #[serde(skip)]
    pub events: Vec<CoreEvent>,
}

/// Roster and status state for one meeting instance
#[derive(Debug, Clone)]
pub struct SessionTracker {
    key: SessionKey,
    session_date: Option<NaiveDate>,
    roster: Roster,
    schedule: Option<SessionSchedule>,
    finalized: bool,
    host_left_at: Option<DateTime<Utc>>,
}

impl SessionTracker {
    pub fn new(
        key: SessionKey,
        session_date: Option<NaiveDate>,
        settings: RosterSettings,
        schedule: Option<SessionSchedule>,
    ) -> Self {
        Self {
            key,
            session_date,
            roster: Roster::new(settings),
            schedule,
            finalized: false,
            host_left_at: None,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn schedule(&self) -> Option<&SessionSchedule> {
        self.schedule.as_ref()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn host_left_at(&self) -> Option<DateTime<Utc>> {
        self.host_left_at
    }

    /// Fold one batch into the session and re-derive statuses
    pub fn process_batch(&mut self, batch: &EventBatch, now: DateTime<Utc>) -> BatchOutcome {
        let base = utc_midnight(self.session_date.unwrap_or_else(|| now.date_naive()));
        let subject = batch.subject_id.as_deref().unwrap_or_default();

        let events: Vec<ParticipantEvent> = batch
            .participants
            .iter()
            .map(|raw| ParticipantEvent::from_raw(raw, subject, &self.key, base))
            .collect();

        let reported_host_left = batch
            .host_left_at
            .as_deref()
            .and_then(|value| resolve_timestamp(value, base))
            .or_else(|| host_leave_from_events(&events));

        let mut core_events = Vec::new();
        let report = self.roster.merge_batch(events, now);

        if report.duplicates_removed > 0 {
            debug!(
                session = %self.key,
                count = report.duplicates_removed,
                "Collapsed duplicate participant events"
            );
            core_events.push(CoreEvent::DuplicatesCollapsed {
                count: report.duplicates_removed,
            });
        }

        if self.host_left_at.is_none() {
            self.host_left_at = reported_host_left;
        }
        let was_finalized = self.finalized;
        self.finalized |= batch.meeting_ended || self.host_left_at.is_some();
        if self.finalized && !was_finalized {
            info!(
                session = %self.key,
                host_left_at = ?self.host_left_at,
                roster_size = self.roster.len(),
                "Meeting finalized"
            );
            core_events.push(CoreEvent::MeetingFinalized {
                host_left_at: self.host_left_at,
            });
        }

        let instructor_late = batch
            .instructor_late
            .or_else(|| self.instructor_late_from_schedule())
            .unwrap_or(false);
        let during_add_drop = batch
            .session_is_during_add_drop
            .or(self.schedule.map(|s| s.during_add_drop))
            .unwrap_or(false);
        let first_third = batch
            .first_third_threshold
            .as_deref()
            .and_then(|value| resolve_timestamp(value, base))
            .or(self.schedule.map(|s| s.first_third_threshold));

        if instructor_late && first_third.is_none() {
            warn!(
                session = %self.key,
                "Instructor late without a first-third threshold, skipping lateness rule"
            );
        }
        let overrides = PolicyOverrides {
            instructor_late,
            during_add_drop,
            first_third,
        };

        let targets: Vec<ParticipantToken> = if self.finalized {
            self.roster.tokens()
        } else {
            report.seen.iter().copied().collect()
        };

        for token in targets {
            if let Some(change) =
                self.derive_status(token, &report, &overrides, now)
            {
                core_events.push(change);
            }
        }

        self.push_transition_events(&report, &mut core_events);

        let results: Vec<ParticipantResult> =
            self.roster.records().map(|r| self.result_for(r, now)).collect();
        let heartbeat = heartbeat(&self.roster);

        debug!(
            session = %self.key,
            roster_size = heartbeat.total,
            in_meeting = heartbeat.in_meeting,
            pending = heartbeat.pending,
            "Batch processed"
        );

        BatchOutcome {
            session: self.key.clone(),
            results,
            metadata: BatchMetadata {
                duplicates_removed: report.duplicates_removed,
                joined: report.joined,
                left: report.left,
                evicted: report.evicted,
                roster_size: self.roster.len(),
                finalized: self.finalized,
            },
            heartbeat,
            events: core_events,
        }
    }

    /// Host arrived after the tardiness cut-off
    fn instructor_late_from_schedule(&self) -> Option<bool> {
        let schedule = self.schedule?;
        let host_join = self
            .roster
            .records()
            .filter(|r| r.is_host)
            .filter_map(|r| r.first_join_at)
            .min()?;
        Some(schedule.is_tardy_join(host_join))
    }

    fn derive_status(
        &mut self,
        token: ParticipantToken,
        report: &MergeReport,
        overrides: &PolicyOverrides,
        now: DateTime<Utc>,
    ) -> Option<CoreEvent> {
        let phase = MeetingPhase::from_signals(self.finalized, self.host_left_at);
        let schedule = self.schedule;
        let host_left_at = self.host_left_at;
        let record = self.roster.get_mut(&token)?;
        let is_new = report.inserted.contains(&token);

        let previous = (!is_new).then_some(StatusOutcome {
            final_status: record.final_status,
            pending_since: record.pending_since,
        });

        let snapshot = record.snapshot();
        let raw_status = derive_raw_status(
            &snapshot,
            &DerivationContext {
                meeting_ended: phase == MeetingPhase::Finalized,
                host_left_at,
                previous_status: previous.map(|p| p.final_status),
            },
        );

        let role = if record.is_host { Role::Instructor } else { Role::Student };
        let mut outcome = determine_final_status(&StatusInput {
            role,
            phase,
            raw_status,
            has_join_evidence: record.has_join_evidence(),
            has_left: record.has_left(),
            is_currently_in_meeting: record.is_currently_in_meeting,
            was_synchronized: record.timeout_synchronized,
            leave_at: record.current_leave_at(),
            last_return_at: record.last_return_at,
            last_leave_at: record.last_leave_at,
            previous,
            now,
        });

        if role == Role::Student {
            let rule_ctx = RuleContext {
                is_tardy: is_tardy(record, schedule.as_ref()),
                session_is_during_add_drop: overrides.during_add_drop,
                instructor_late: overrides.instructor_late,
                first_third_threshold: overrides.first_third,
                leave_at: record.last_leave_at,
            };
            outcome.final_status = apply_status_rules(outcome.final_status, &rule_ctx);
        }

        let from = previous.map(|p| p.final_status);
        record.raw_status = raw_status;
        record.final_status = outcome.final_status;
        record.pending_since = outcome.pending_since;

        if from == Some(outcome.final_status) {
            return None;
        }

        debug!(
            token = %token,
            name = %record.display_name,
            from = ?from,
            to = %outcome.final_status,
            raw = %raw_status,
            "Status changed"
        );
        Some(CoreEvent::StatusChanged {
            token,
            from,
            to: outcome.final_status,
        })
    }

    fn push_transition_events(&self, report: &MergeReport, events: &mut Vec<CoreEvent>) {
        for token in &report.joined {
            if let Some(record) = self.roster.get(token) {
                events.push(CoreEvent::ParticipantJoined {
                    token: *token,
                    display_name: record.display_name.clone(),
                });
            }
        }
        for token in &report.left {
            let display_name = self
                .roster
                .get(token)
                .map(|r| r.display_name.clone())
                .unwrap_or_default();
            events.push(CoreEvent::ParticipantLeft {
                token: *token,
                display_name,
            });
        }
        for token in &report.evicted {
            events.push(CoreEvent::ParticipantEvicted { token: *token });
        }
    }

    fn result_for(&self, record: &ParticipantRecord, now: DateTime<Utc>) -> ParticipantResult {
        let duration_seconds = record.attended_seconds(now);
        let leave_time = record.current_leave_at();

        ParticipantResult {
            token: record.token,
            display_name: record.display_name.clone(),
            is_host: record.is_host,
            raw_status: record.raw_status,
            final_status: record.final_status.view(),
            is_currently_in_meeting: record.is_currently_in_meeting,
            is_left: !record.is_currently_in_meeting && record.has_left(),
            is_tardy: is_tardy(record, self.schedule.as_ref()),
            duration_seconds,
            duration_formatted: format_duration(duration_seconds),
            join_time: record.first_join_at,
            join_time_formatted: format_clock(record.first_join_at),
            leave_time,
            leave_time_formatted: format_clock(leave_time),
            pending_since: record.pending_since,
        }
    }
}

/// Explicit capture flag, else a join after the tardiness cut-off
/// Session-wide rule inputs for one batch
struct PolicyOverrides {
    instructor_late: bool,
    during_add_drop: bool,
    first_third: Option<DateTime<Utc>>,
}

fn is_tardy(record: &ParticipantRecord, schedule: Option<&SessionSchedule>) -> bool {
    record.is_tardy.unwrap_or_else(|| {
        matches!(
            (schedule, record.first_join_at),
            (Some(s), Some(join)) if s.is_tardy_join(join)
        )
    })
}

/// A host seen leaving and no longer in the meeting
fn host_leave_from_events(events: &[ParticipantEvent]) -> Option<DateTime<Utc>> {
    events
        .iter()
        .filter(|e| e.is_host && !e.in_meeting())
        .filter_map(|e| e.leave_at)
        .max()
}

fn heartbeat(roster: &Roster) -> Heartbeat {
    let mut hb = Heartbeat {
        total: roster.len(),
        ..Default::default()
    };
    for record in roster.records() {
        if record.is_currently_in_meeting {
            hb.in_meeting += 1;
        }
        match record.final_status {
            AttendanceStatus::Pending => hb.pending += 1,
            AttendanceStatus::Left => hb.left += 1,
            _ => {}
        }
    }
    hb
}
