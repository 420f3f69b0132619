//! Raw status derivation from the capture signals of one participant

use chrono::{DateTime, Utc};
use classroll_api::AttendanceStatus;

use crate::ParticipantEvent;

/// Shorter than this and a participant has only just arrived
pub const JUST_JOINED_SECONDS: f64 = 60.0;

/// Meeting level facts the derivation depends on
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivationContext {
    pub meeting_ended: bool,
    pub host_left_at: Option<DateTime<Utc>>,
    /// Final status from the previous batch, if the record existed
    pub previous_status: Option<AttendanceStatus>,
}

/// Compute the raw status of a participant. The first matching rule wins.
pub fn derive_raw_status(event: &ParticipantEvent, ctx: &DerivationContext) -> AttendanceStatus {
    if let Some(label) = &event.status_override {
        return AttendanceStatus::from_label(label);
    }

    let synchronized = event.timeout_synchronized;

    if synchronized && ctx.meeting_ended && ctx.host_left_at.is_some() {
        return AttendanceStatus::Present;
    }

    if event.leave_at.is_some() {
        if !ctx.meeting_ended
            && !event.in_meeting()
            && ctx.previous_status != Some(AttendanceStatus::Absent)
        {
            return AttendanceStatus::Pending;
        }
        if ctx.meeting_ended && !synchronized {
            return AttendanceStatus::Absent;
        }
        return AttendanceStatus::Left;
    }

    if event
        .duration_seconds
        .is_some_and(|secs| secs < JUST_JOINED_SECONDS)
    {
        return AttendanceStatus::Joined;
    }

    let live = event.is_live.or(event.is_currently_in_meeting);
    if live == Some(false) && !synchronized {
        return AttendanceStatus::Left;
    }

    AttendanceStatus::Present
}
