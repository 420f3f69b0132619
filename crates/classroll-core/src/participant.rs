//! Normalized participant events and the per-token records built from them

use chrono::{DateTime, Utc};
use classroll_api::{AttendanceStatus, RawParticipant};
use classroll_util::{ParticipantToken, SessionKey, resolve_timestamp};
use tracing::debug;

/// Fallback display name when a capture carries neither name nor id
const UNNAMED_PARTICIPANT: &str = "Unnamed participant";

/// One participant as observed in one batch, with timestamps resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantEvent {
    pub token: ParticipantToken,
    pub display_name: String,
    pub participant_id: Option<String>,
    pub is_host: bool,
    pub join_at: Option<DateTime<Utc>>,
    pub leave_at: Option<DateTime<Utc>>,
    pub is_currently_in_meeting: Option<bool>,
    pub is_live: Option<bool>,
    pub is_tardy: Option<bool>,
    pub duration_seconds: Option<f64>,
    /// Explicit status label supplied by the capture agent
    pub status_override: Option<String>,
    pub timeout_synchronized: bool,
}

impl ParticipantEvent {
    /// Normalize a raw capture entry.
    ///
    /// Clock-only timestamps are resolved against `base`, usually the
    /// session day at midnight UTC.
    pub fn from_raw(
        raw: &RawParticipant,
        subject: &str,
        session: &SessionKey,
        base: DateTime<Utc>,
    ) -> Self {
        let participant_id = non_empty(raw.participant_id.as_deref());
        let display_name = non_empty(raw.name.as_deref())
            .or_else(|| participant_id.clone())
            .unwrap_or_else(|| UNNAMED_PARTICIPANT.to_string());

        let token = ParticipantToken::derive(&display_name, subject, session.as_str());

        let join_at = resolve_field(&display_name, "join", raw.join_time_iso.as_deref(), base);
        let leave_at = resolve_field(&display_name, "leave", raw.leave_time_iso.as_deref(), base)
            .or_else(|| resolve_field(&display_name, "time_out", raw.time_out.as_deref(), base));

        Self {
            token,
            display_name,
            participant_id,
            is_host: raw.is_host,
            join_at,
            leave_at,
            is_currently_in_meeting: raw.is_currently_in_meeting,
            is_live: raw.is_live,
            is_tardy: raw.is_tardy,
            duration_seconds: raw.duration_seconds.filter(|d| d.is_finite() && *d >= 0.0),
            status_override: non_empty(raw.status.as_deref())
                .or_else(|| non_empty(raw.raw_status.as_deref())),
            timeout_synchronized: raw.timeout_synchronized.unwrap_or(false),
        }
    }

    /// Freshest in-meeting signal: the explicit flag, else "no leave seen"
    pub fn in_meeting(&self) -> bool {
        self.is_currently_in_meeting
            .unwrap_or(self.leave_at.is_none())
    }

    /// Number of informative fields, used to pick among duplicates
    pub fn completeness(&self) -> usize {
        [
            self.participant_id.is_some(),
            self.join_at.is_some(),
            self.leave_at.is_some(),
            self.is_currently_in_meeting.is_some(),
            self.is_live.is_some(),
            self.is_tardy.is_some(),
            self.duration_seconds.is_some(),
            self.status_override.is_some(),
            self.timeout_synchronized,
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn resolve_field(
    name: &str,
    field: &'static str,
    value: Option<&str>,
    base: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    let resolved = resolve_timestamp(value, base);
    if resolved.is_none() {
        debug!(participant = %name, field, value, "Ignoring unparseable timestamp");
    }
    resolved
}

/// Merged state of one logical participant across batches
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantRecord {
    pub token: ParticipantToken,
    pub display_name: String,
    pub participant_id: Option<String>,
    pub is_host: bool,
    pub first_join_at: Option<DateTime<Utc>>,
    pub last_leave_at: Option<DateTime<Utc>>,
    pub last_return_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub is_tardy: Option<bool>,
    pub is_live: Option<bool>,
    pub status_override: Option<String>,
    pub is_currently_in_meeting: bool,
    /// Ever observed inside the meeting, even without a join timestamp
    pub ever_in_meeting: bool,
    pub timeout_synchronized: bool,
    pub raw_status: AttendanceStatus,
    pub final_status: AttendanceStatus,
    pub pending_since: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl ParticipantRecord {
    pub fn new(event: &ParticipantEvent, now: DateTime<Utc>) -> Self {
        let in_meeting = event.in_meeting();
        Self {
            token: event.token,
            display_name: event.display_name.clone(),
            participant_id: event.participant_id.clone(),
            is_host: event.is_host,
            first_join_at: event.join_at,
            last_leave_at: event.leave_at,
            last_return_at: None,
            duration_seconds: event.duration_seconds,
            is_tardy: event.is_tardy,
            is_live: event.is_live,
            status_override: event.status_override.clone(),
            is_currently_in_meeting: in_meeting,
            ever_in_meeting: in_meeting,
            timeout_synchronized: event.timeout_synchronized,
            raw_status: AttendanceStatus::Joined,
            final_status: AttendanceStatus::Joined,
            pending_since: None,
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    /// Fold a fresh observation of the same participant into this record
    pub fn absorb(&mut self, event: &ParticipantEvent, now: DateTime<Utc>) {
        let was_in_meeting = self.is_currently_in_meeting;

        if self.participant_id.is_none() {
            self.participant_id = event.participant_id.clone();
        }
        self.is_host |= event.is_host;

        if let Some(join) = event.join_at {
            self.first_join_at = Some(self.first_join_at.map_or(join, |j| j.min(join)));
            if self.last_leave_at.is_some_and(|leave| join > leave) {
                self.mark_return(join);
            }
        }

        if let Some(leave) = event.leave_at {
            self.last_leave_at = Some(self.last_leave_at.map_or(leave, |l| l.max(leave)));
        }

        self.duration_seconds = event.duration_seconds.or(self.duration_seconds);
        self.is_tardy = event.is_tardy.or(self.is_tardy);
        self.is_live = event.is_live.or(self.is_live);
        self.status_override = event.status_override.clone();
        self.timeout_synchronized |= event.timeout_synchronized;

        let in_meeting = match event.is_currently_in_meeting {
            Some(flag) => flag,
            None => event.leave_at.is_none() || !self.has_left(),
        };

        // Back in the meeting with no join later than the last leave
        if in_meeting && !was_in_meeting && self.has_left() {
            self.mark_return(now);
        }

        self.is_currently_in_meeting = in_meeting;
        self.ever_in_meeting |= in_meeting;
        self.last_seen_at = now;
    }

    /// Record missing from a batch while the roster keeps it
    pub fn mark_left(&mut self) {
        self.is_currently_in_meeting = false;
        if !self.has_left() {
            self.last_leave_at = Some(self.last_seen_at);
        }
        self.raw_status = AttendanceStatus::Left;
        self.final_status = AttendanceStatus::Left;
        self.pending_since = None;
    }

    fn mark_return(&mut self, at: DateTime<Utc>) {
        self.last_return_at = Some(self.last_return_at.map_or(at, |r| r.max(at)));
    }

    /// Returned strictly after the most recent leave
    pub fn returned_after_leave(&self) -> bool {
        matches!(
            (self.last_return_at, self.last_leave_at),
            (Some(ret), Some(leave)) if ret > leave
        )
    }

    /// A leave is on record and no later return
    pub fn has_left(&self) -> bool {
        self.last_leave_at.is_some() && !self.returned_after_leave()
    }

    /// Leave timestamp that is still current
    pub fn current_leave_at(&self) -> Option<DateTime<Utc>> {
        if self.has_left() { self.last_leave_at } else { None }
    }

    pub fn has_join_evidence(&self) -> bool {
        self.first_join_at.is_some() || self.ever_in_meeting
    }

    /// Merged view shaped like a single event, for status derivation
    pub fn snapshot(&self) -> ParticipantEvent {
        ParticipantEvent {
            token: self.token,
            display_name: self.display_name.clone(),
            participant_id: self.participant_id.clone(),
            is_host: self.is_host,
            join_at: self.first_join_at,
            leave_at: self.current_leave_at(),
            is_currently_in_meeting: Some(self.is_currently_in_meeting),
            is_live: self.is_live,
            is_tardy: self.is_tardy,
            duration_seconds: self.duration_seconds,
            status_override: self.status_override.clone(),
            timeout_synchronized: self.timeout_synchronized,
        }
    }

    /// Reported duration, else time spent since the first join
    pub fn attended_seconds(&self, now: DateTime<Utc>) -> u64 {
        if let Some(reported) = self.duration_seconds {
            return reported.round() as u64;
        }
        match self.first_join_at {
            Some(join) => {
                let until = self.current_leave_at().unwrap_or(now);
                (until - join).num_seconds().max(0) as u64
            }
            None => 0,
        }
    }
}
