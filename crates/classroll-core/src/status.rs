//! Final status state machine
//!
//! Two phases: `Ongoing` while the host is still in the meeting, and
//! `Finalized` once the host leaves or the meeting is marked ended. A
//! student who leaves during `Ongoing` sits in `Pending` until they
//! return or the meeting is finalized. `pending_since` is only ever set
//! while the final status is `Pending`.

use chrono::{DateTime, Utc};
use classroll_api::AttendanceStatus;

/// Meeting phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingPhase {
    Ongoing,
    Finalized,
}

impl MeetingPhase {
    pub fn from_signals(meeting_ended: bool, host_left_at: Option<DateTime<Utc>>) -> Self {
        if meeting_ended || host_left_at.is_some() {
            Self::Finalized
        } else {
            Self::Ongoing
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Instructor,
    Student,
}

/// Final status with its pending timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusOutcome {
    pub final_status: AttendanceStatus,
    pub pending_since: Option<DateTime<Utc>>,
}

impl StatusOutcome {
    fn settled(final_status: AttendanceStatus) -> Self {
        Self {
            final_status,
            pending_since: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatusInput {
    pub role: Role,
    pub phase: MeetingPhase,
    pub raw_status: AttendanceStatus,
    pub has_join_evidence: bool,
    /// A leave is on record with no later return
    pub has_left: bool,
    pub is_currently_in_meeting: bool,
    pub was_synchronized: bool,
    pub leave_at: Option<DateTime<Utc>>,
    pub last_return_at: Option<DateTime<Utc>>,
    pub last_leave_at: Option<DateTime<Utc>>,
    pub previous: Option<StatusOutcome>,
    pub now: DateTime<Utc>,
}

impl StatusInput {
    fn returned_after_leave(&self) -> bool {
        matches!(
            (self.last_return_at, self.last_leave_at),
            (Some(ret), Some(leave)) if ret > leave
        )
    }
}

/// Determine the final status of a participant for this batch
pub fn determine_final_status(input: &StatusInput) -> StatusOutcome {
    match (input.role, input.phase) {
        (Role::Instructor, _) => instructor_status(input),
        (Role::Student, MeetingPhase::Finalized) => finalized_student_status(input),
        (Role::Student, MeetingPhase::Ongoing) => ongoing_student_status(input),
    }
}

fn instructor_status(input: &StatusInput) -> StatusOutcome {
    let status = if input.raw_status == AttendanceStatus::Late {
        AttendanceStatus::Late
    } else if !input.has_join_evidence {
        AttendanceStatus::Absent
    } else {
        AttendanceStatus::Present
    };
    StatusOutcome::settled(status)
}

fn finalized_student_status(input: &StatusInput) -> StatusOutcome {
    // Pending records resolve here too: present only through a return
    // after their last leave.
    let status = if input.was_synchronized
        || input.is_currently_in_meeting
        || input.returned_after_leave()
    {
        AttendanceStatus::Present
    } else {
        AttendanceStatus::Absent
    };

    StatusOutcome::settled(status)
}

fn ongoing_student_status(input: &StatusInput) -> StatusOutcome {
    use AttendanceStatus::{Absent, Late, Pending, Present};

    if !input.has_join_evidence {
        return StatusOutcome::settled(Absent);
    }

    let raw_late = input.raw_status == Late;

    if input.is_currently_in_meeting {
        return StatusOutcome::settled(if raw_late { Late } else { Present });
    }

    if input.has_left && !input.was_synchronized {
        let pending_since = input
            .previous
            .and_then(|p| p.pending_since)
            .or(input.leave_at)
            .unwrap_or(input.now);
        return StatusOutcome {
            final_status: Pending,
            pending_since: Some(pending_since),
        };
    }

    StatusOutcome::settled(if raw_late { Late } else { Present })
}
