//! Core events emitted while folding batches into a session

use chrono::{DateTime, Utc};
use classroll_api::AttendanceStatus;
use classroll_util::ParticipantToken;

/// Events emitted by a session tracker
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// Token present in this batch but not the previous one
    ParticipantJoined {
        token: ParticipantToken,
        display_name: String,
    },

    /// Token present in the previous batch but not this one
    ParticipantLeft {
        token: ParticipantToken,
        display_name: String,
    },

    /// Record dropped from the roster
    ParticipantEvicted {
        token: ParticipantToken,
    },

    /// Within-batch duplicates collapsed to one event each
    DuplicatesCollapsed {
        count: usize,
    },

    /// Final status moved; `from` is `None` on first derivation
    StatusChanged {
        token: ParticipantToken,
        from: Option<AttendanceStatus>,
        to: AttendanceStatus,
    },

    /// Host left or the meeting was marked ended
    MeetingFinalized {
        host_left_at: Option<DateTime<Utc>>,
    },
}
