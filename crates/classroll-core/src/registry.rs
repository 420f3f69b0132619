//! Session registry keyed by meeting instance

use chrono::{DateTime, NaiveDate, Utc};
use classroll_api::{EventBatch, PolicyThresholds};
use classroll_config::Policy;
use classroll_util::{ClassrollError, Result, SessionKey, SubjectId, try_parse_calendar_day};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::{BatchOutcome, PolicyEngine, SessionSchedule, SessionTracker};

/// Independent trackers per session key. Sessions never share state.
#[derive(Debug)]
pub struct SessionRegistry {
    policy: Policy,
    engine: PolicyEngine,
    sessions: HashMap<SessionKey, SessionTracker>,
}

impl SessionRegistry {
    pub fn new(policy: Policy) -> Self {
        info!(
            subject_count = policy.subjects.len(),
            preserve_left = policy.roster.preserve_left,
            "Session registry initialized"
        );
        Self {
            engine: PolicyEngine::new(policy.constants),
            policy,
            sessions: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    /// Key a batch correlates to
    pub fn session_key(batch: &EventBatch) -> Result<SessionKey> {
        if batch.meet_code.trim().is_empty() {
            return Err(ClassrollError::MissingSessionKey);
        }
        Ok(SessionKey::for_meeting(&batch.meet_code, session_date(batch)))
    }

    /// Build a fresh tracker for the session a batch belongs to
    pub fn new_tracker(&self, batch: &EventBatch) -> Result<SessionTracker> {
        let key = Self::session_key(batch)?;
        let date = session_date(batch);

        let schedule = match (batch.subject_id.as_deref(), date) {
            (Some(id), Some(date)) => match self.policy.get_subject(&SubjectId::new(id)) {
                Some(subject) => SessionSchedule::for_subject(&self.engine, subject, date),
                None => {
                    warn!(subject_id = %id, session = %key, "Unknown subject, schedule rules disabled");
                    None
                }
            },
            _ => None,
        };

        debug!(session = %key, has_schedule = schedule.is_some(), "Opening session");
        Ok(SessionTracker::new(key, date, self.policy.roster, schedule))
    }

    /// Route a batch to its session, opening one on first sight
    pub fn process(&mut self, batch: &EventBatch, now: DateTime<Utc>) -> Result<BatchOutcome> {
        let key = Self::session_key(batch)?;
        if !self.sessions.contains_key(&key) {
            let tracker = self.new_tracker(batch)?;
            self.sessions.insert(key.clone(), tracker);
        }

        let tracker = self
            .sessions
            .get_mut(&key)
            .ok_or_else(|| ClassrollError::internal(format!("session {} vanished", key)))?;
        Ok(tracker.process_batch(batch, now))
    }

    pub fn tracker(&self, key: &SessionKey) -> Option<&SessionTracker> {
        self.sessions.get(key)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop a session, returning its final state
    pub fn close(&mut self, key: &SessionKey) -> Option<SessionTracker> {
        let closed = self.sessions.remove(key);
        if closed.is_some() {
            info!(session = %key, "Session closed");
        }
        closed
    }

    pub fn thresholds_for(&self, subject: &SubjectId) -> Result<PolicyThresholds> {
        let subject = self
            .policy
            .get_subject(subject)
            .ok_or_else(|| ClassrollError::UnknownSubject(subject.clone()))?;
        Ok(self.engine.thresholds(&subject.schedule))
    }
}

fn session_date(batch: &EventBatch) -> Option<NaiveDate> {
    let raw = batch.session_date.as_deref()?;
    let parsed = try_parse_calendar_day(raw).map(|dt| dt.date_naive());
    if parsed.is_none() {
        warn!(value = %raw, "Unparseable session date, keying by meet code only");
    }
    parsed
}
