//! Progress events for collaborators that report on live sessions

use chrono::{DateTime, Utc};
use classroll_util::{ParticipantToken, SessionKey};
use serde::{Deserialize, Serialize};

use crate::{AttendanceStatus, BatchMetadata, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Utc>,
    pub session: SessionKey,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(session: SessionKey, timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp,
            session,
            payload,
        }
    }
}

/// Roster counts after a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub in_meeting: usize,
    pub pending: usize,
    pub left: usize,
    pub total: usize,
}

/// All possible progress events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A batch was folded into the roster
    BatchProcessed {
        heartbeat: Heartbeat,
        metadata: BatchMetadata,
    },

    /// Token newly present compared to the previous batch
    ParticipantJoined {
        token: ParticipantToken,
        display_name: String,
    },

    /// Token newly absent compared to the previous batch
    ParticipantLeft {
        token: ParticipantToken,
        display_name: String,
    },

    /// Final status moved
    StatusChanged {
        token: ParticipantToken,
        from: Option<AttendanceStatus>,
        to: AttendanceStatus,
    },

    /// Host left or meeting marked ended
    MeetingFinalized {
        host_left_at: Option<DateTime<Utc>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_tagged() {
        let payload = EventPayload::MeetingFinalized { host_left_at: None };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"type\":\"meeting_finalized\""));
    }
}
