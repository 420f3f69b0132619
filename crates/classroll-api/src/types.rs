//! Shared types for the classroll data contracts

use chrono::{DateTime, NaiveDate, Utc};
use classroll_util::ParticipantToken;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Attendance status, raw or final.
///
/// `Unknown` stands for a label outside the closed set; it is never
/// produced by derivation on its own, only carried through from input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    Pending,
    Left,
    Joined,
    Unknown,
}

impl AttendanceStatus {
    /// Parse a status label after trimming and lower-casing
    pub fn from_label(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "present" => Self::Present,
            "late" => Self::Late,
            "absent" => Self::Absent,
            "pending" => Self::Pending,
            "left" => Self::Left,
            "joined" => Self::Joined,
            _ => Self::Unknown,
        }
    }

    /// Machine code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Late => "late",
            Self::Absent => "absent",
            Self::Pending => "pending",
            Self::Left => "left",
            Self::Joined => "joined",
            Self::Unknown => "unknown",
        }
    }

    /// Human label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Late => "Late",
            Self::Absent => "Absent",
            Self::Pending => "Pending",
            Self::Left => "Left Meeting",
            Self::Joined => "Just Joined",
            Self::Unknown => "Unknown",
        }
    }

    pub fn view(&self) -> StatusView {
        StatusView {
            code: *self,
            label: self.label().to_string(),
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Human label for a free-form status string; unmapped input is `"Unknown"`.
pub fn format_status_label(raw: &str) -> &'static str {
    AttendanceStatus::from_label(raw).label()
}

/// Status as shown to collaborators: machine code plus human label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    pub code: AttendanceStatus,
    pub label: String,
}

/// One participant as captured in a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawParticipant {
    #[serde(default, alias = "displayName")]
    pub name: Option<String>,

    #[serde(default, alias = "id")]
    pub participant_id: Option<String>,

    #[serde(default)]
    pub is_host: bool,

    #[serde(default, alias = "joinTime", alias = "timeIn")]
    pub join_time_iso: Option<String>,

    #[serde(default, alias = "leaveTime")]
    pub leave_time_iso: Option<String>,

    #[serde(default)]
    pub time_out: Option<String>,

    #[serde(default)]
    pub is_currently_in_meeting: Option<bool>,

    #[serde(default)]
    pub is_live: Option<bool>,

    #[serde(default)]
    pub is_tardy: Option<bool>,

    #[serde(default, alias = "duration")]
    pub duration_seconds: Option<f64>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub raw_status: Option<String>,

    #[serde(default)]
    pub timeout_synchronized: Option<bool>,
}

/// One capture batch for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBatch {
    #[serde(default)]
    pub meet_code: String,

    #[serde(default)]
    pub session_date: Option<String>,

    #[serde(default)]
    pub subject_id: Option<String>,

    #[serde(default)]
    pub meeting_ended: bool,

    /// When the host left; finalizes the meeting
    #[serde(default, alias = "instructorLeaveTimeIso")]
    pub host_left_at: Option<String>,

    #[serde(default)]
    pub captured_at: Option<String>,

    /// Overrides the schedule-derived instructor lateness
    #[serde(default)]
    pub instructor_late: Option<bool>,

    /// Overrides the schedule-derived add/drop flag
    #[serde(default)]
    pub session_is_during_add_drop: Option<bool>,

    /// Overrides the schedule-derived one-third-of-class instant
    #[serde(default)]
    pub first_third_threshold: Option<String>,

    #[serde(default)]
    pub participants: Vec<RawParticipant>,
}

/// Outbound result for one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResult {
    pub token: ParticipantToken,
    pub display_name: String,
    pub is_host: bool,
    pub raw_status: AttendanceStatus,
    pub final_status: StatusView,
    pub is_currently_in_meeting: bool,
    pub is_left: bool,
    pub is_tardy: bool,
    pub duration_seconds: u64,
    pub duration_formatted: String,
    pub join_time: Option<DateTime<Utc>>,
    pub join_time_formatted: Option<String>,
    pub leave_time: Option<DateTime<Utc>>,
    pub leave_time_formatted: Option<String>,
    pub pending_since: Option<DateTime<Utc>>,
}

/// Per-batch bookkeeping reported alongside results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMetadata {
    pub duplicates_removed: usize,
    pub joined: Vec<ParticipantToken>,
    pub left: Vec<ParticipantToken>,
    pub evicted: Vec<ParticipantToken>,
    pub roster_size: usize,
    pub finalized: bool,
}

/// Schedule as owned by the subject-configuration collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInput {
    #[serde(default, alias = "weekdays")]
    pub days: Vec<String>,

    #[serde(default)]
    pub start_time: Option<String>,

    #[serde(default)]
    pub end_time: Option<String>,

    #[serde(default)]
    pub start_date: Option<String>,

    /// Accepted but ignored by session counting
    #[serde(default)]
    pub end_date: Option<String>,

    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Thresholds derived from a schedule and the policy constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyThresholds {
    pub class_duration_minutes: u32,
    pub tardiness_threshold_minutes: u32,
    pub total_sessions: u32,
    pub sessions_per_week: u32,
    pub max_allowed_absences: u32,
    pub max_allowed_tardiness: u32,
    pub weekly_contact_hours: f64,
    pub total_contact_hours: f64,
    pub max_allowed_missed_hours: f64,
}

/// Tardiness instances folded into absence-equivalents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TardinessConversion {
    pub equivalent_absences: u32,
    pub remainder: u32,
}

/// Counts accumulated for one student in one subject
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceTally {
    pub direct_absences: u32,
    pub tardiness_count: u32,
    pub consecutive_weeks_absent: u32,
}

/// Final status of one student in one past session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

/// Live risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Safe,
    AtRisk,
    OverLimit,
}

/// Per-student live status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPolicyStatus {
    pub direct_absences: u32,
    pub tardiness_count: u32,
    pub tardiness_to_absence: u32,
    pub tardiness_remainder: u32,
    pub total_absence_count: u32,
    pub absence_percentage: f64,
    pub tardiness_percentage: f64,
    pub remaining_absences: u32,
    pub remaining_tardiness: u32,
    pub risk: RiskTier,
}

/// D/F eligibility tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DfStatus {
    Safe,
    AtRisk,
    DfEligible,
}

/// Why a student was flagged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum DfReason {
    ConsecutiveWeeksAbsent { weeks: u32, threshold: u32 },
    AbsenceThresholdReached { total: u32, threshold: u32 },
}

/// D/F evaluation result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DfEligibility {
    pub status: DfStatus,
    pub eligible: bool,
    pub total_equivalent_absences: u32,
    pub absence_threshold: u32,
    pub consecutive_weeks_absent: u32,
    pub reasons: Vec<DfReason>,
}
