//! Roster merging across batches
//!
//! Each batch is a full snapshot of who the capture agent can see. The
//! roster collapses duplicates within a batch, folds each event into
//! the record for its token, and ages out records that stop appearing.
//! Feeding the same batch twice with the same `now` leaves the roster
//! unchanged the second time.

use chrono::{DateTime, Utc};
use classroll_config::RosterSettings;
use classroll_util::{ParticipantToken, normalize_identity};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::{ParticipantEvent, ParticipantRecord};

/// What one merge did to the roster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub duplicates_removed: usize,
    /// Tokens carried by this batch after deduplication
    pub seen: BTreeSet<ParticipantToken>,
    /// Records created by this batch
    pub inserted: BTreeSet<ParticipantToken>,
    /// Seen in this batch but not the previous one
    pub joined: Vec<ParticipantToken>,
    /// Seen in the previous batch but not this one
    pub left: Vec<ParticipantToken>,
    /// Kept but missing from this batch
    pub marked_left: Vec<ParticipantToken>,
    pub evicted: Vec<ParticipantToken>,
}

#[derive(Debug, Clone)]
pub struct Roster {
    settings: RosterSettings,
    records: BTreeMap<ParticipantToken, ParticipantRecord>,
    /// Normalized participant id to the token first seen with it
    aliases: HashMap<String, ParticipantToken>,
    previous_batch: BTreeSet<ParticipantToken>,
}

impl Roster {
    pub fn new(settings: RosterSettings) -> Self {
        Self {
            settings,
            records: BTreeMap::new(),
            aliases: HashMap::new(),
            previous_batch: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, token: &ParticipantToken) -> Option<&ParticipantRecord> {
        self.records.get(token)
    }

    pub fn get_mut(&mut self, token: &ParticipantToken) -> Option<&mut ParticipantRecord> {
        self.records.get_mut(token)
    }

    /// Records in token order
    pub fn records(&self) -> impl Iterator<Item = &ParticipantRecord> {
        self.records.values()
    }

    pub fn tokens(&self) -> Vec<ParticipantToken> {
        self.records.keys().copied().collect()
    }

    /// Fold one batch of events into the roster
    pub fn merge_batch(&mut self, events: Vec<ParticipantEvent>, now: DateTime<Utc>) -> MergeReport {
        let mut report = MergeReport::default();

        let deduped = self.collapse_duplicates(events, &mut report);

        for event in &deduped {
            report.seen.insert(event.token);
            match self.records.get_mut(&event.token) {
                Some(record) => record.absorb(event, now),
                None => {
                    debug!(token = %event.token, name = %event.display_name, "New participant");
                    self.records.insert(event.token, ParticipantRecord::new(event, now));
                    report.inserted.insert(event.token);
                }
            }
        }

        self.sweep_missing(now, &mut report);

        report.joined = report.seen.difference(&self.previous_batch).copied().collect();
        report.left = self.previous_batch.difference(&report.seen).copied().collect();
        self.previous_batch = report.seen.clone();

        report
    }

    /// Map aliased events onto their canonical token, then keep one event
    /// per token: the most complete, with ties going to the later one.
    fn collapse_duplicates(
        &mut self,
        events: Vec<ParticipantEvent>,
        report: &mut MergeReport,
    ) -> Vec<ParticipantEvent> {
        let mut order: Vec<ParticipantToken> = Vec::with_capacity(events.len());
        let mut chosen: HashMap<ParticipantToken, ParticipantEvent> = HashMap::new();

        for mut event in events {
            if let Some(id) = &event.participant_id {
                let key = normalize_identity(id);
                if !key.is_empty() {
                    let canonical = *self.aliases.entry(key).or_insert(event.token);
                    event.token = canonical;
                }
            }

            match chosen.get(&event.token) {
                Some(existing) => {
                    report.duplicates_removed += 1;
                    if event.completeness() >= existing.completeness() {
                        chosen.insert(event.token, event);
                    }
                }
                None => {
                    order.push(event.token);
                    chosen.insert(event.token, event);
                }
            }
        }

        order
            .into_iter()
            .filter_map(|token| chosen.remove(&token))
            .collect()
    }

    fn sweep_missing(&mut self, now: DateTime<Utc>, report: &mut MergeReport) {
        let missing: Vec<ParticipantToken> = self
            .records
            .keys()
            .filter(|token| !report.seen.contains(token))
            .copied()
            .collect();

        for token in missing {
            let expired = !self.settings.preserve_left
                || self
                    .records
                    .get(&token)
                    .is_some_and(|r| now - r.last_seen_at > self.settings.aging_window);

            if expired {
                self.records.remove(&token);
                self.aliases.retain(|_, t| *t != token);
                debug!(token = %token, "Evicted participant");
                report.evicted.push(token);
            } else if let Some(record) = self.records.get_mut(&token) {
                record.mark_left();
                report.marked_left.push(token);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use classroll_api::AttendanceStatus;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, h, m, 0).unwrap()
    }

    fn event(name: &str) -> ParticipantEvent {
        ParticipantEvent {
            token: ParticipantToken::derive(name, "CS101", "abc@2025-09-01"),
            display_name: name.into(),
            participant_id: None,
            is_host: false,
            join_at: Some(at(9, 0)),
            leave_at: None,
            is_currently_in_meeting: Some(true),
            is_live: None,
            is_tardy: None,
            duration_seconds: None,
            status_override: None,
            timeout_synchronized: false,
        }
    }

    fn roster() -> Roster {
        Roster::new(RosterSettings::default())
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut roster = roster();
        let mut ana = event("Ana");
        ana.leave_at = Some(at(9, 20));
        ana.is_currently_in_meeting = Some(false);
        let batch = vec![ana, event("Ben"), event("ben")];

        roster.merge_batch(batch.clone(), at(9, 30));
        let snapshot: Vec<ParticipantRecord> = roster.records().cloned().collect();

        let report = roster.merge_batch(batch, at(9, 30));
        let again: Vec<ParticipantRecord> = roster.records().cloned().collect();

        assert_eq!(snapshot, again);
        assert!(report.inserted.is_empty());
        assert!(report.joined.is_empty());
        assert!(report.left.is_empty());
    }

    #[test]
    fn test_duplicates_collapse_to_most_complete() {
        let mut roster = roster();
        let sparse = ParticipantEvent {
            join_at: None,
            ..event("Ana Cruz")
        };
        let mut rich = event("ana  cruz");
        rich.duration_seconds = Some(300.0);

        let report = roster.merge_batch(vec![rich, sparse], at(9, 5));

        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(roster.len(), 1);
        let record = roster.records().next().unwrap();
        assert_eq!(record.duration_seconds, Some(300.0));
        assert_eq!(record.first_join_at, Some(at(9, 0)));
    }

    #[test]
    fn test_participant_id_aliases_renamed_display() {
        let mut roster = roster();
        let mut first = event("Ana Cruz");
        first.participant_id = Some("p-1".into());
        roster.merge_batch(vec![first.clone()], at(9, 5));

        let mut renamed = event("Ana C. (Guest)");
        renamed.participant_id = Some("P-1".into());
        let report = roster.merge_batch(vec![renamed], at(9, 6));

        assert_eq!(roster.len(), 1);
        assert!(report.inserted.is_empty());
        assert!(roster.get(&first.token).is_some());
    }

    #[test]
    fn test_missing_participants_are_marked_left() {
        let mut roster = roster();
        let ana = event("Ana");
        roster.merge_batch(vec![ana.clone(), event("Ben")], at(9, 5));

        let report = roster.merge_batch(vec![event("Ben")], at(9, 6));
        assert_eq!(report.left, vec![ana.token]);
        assert_eq!(report.marked_left, vec![ana.token]);

        let record = roster.get(&ana.token).unwrap();
        assert!(!record.is_currently_in_meeting);
        assert_eq!(record.final_status, AttendanceStatus::Left);
        assert_eq!(record.last_leave_at, Some(at(9, 5)));
        assert_eq!(record.pending_since, None);
    }

    #[test]
    fn test_aging_window_evicts() {
        let mut roster = roster();
        let ana = event("Ana");
        roster.merge_batch(vec![ana.clone()], at(9, 0));

        let report = roster.merge_batch(vec![], at(9, 5));
        assert!(report.evicted.is_empty());

        let report = roster.merge_batch(vec![], at(9, 5) + Duration::seconds(1));
        assert_eq!(report.evicted, vec![ana.token]);
        assert!(roster.is_empty());
    }

    #[test]
    fn test_without_preserve_left_drops_immediately() {
        let mut roster = Roster::new(RosterSettings {
            preserve_left: false,
            ..RosterSettings::default()
        });
        roster.merge_batch(vec![event("Ana"), event("Ben")], at(9, 0));

        let report = roster.merge_batch(vec![event("Ben")], at(9, 1));
        assert_eq!(report.evicted.len(), 1);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_returning_participant_is_rejoined() {
        let mut roster = roster();
        let ana = event("Ana");
        roster.merge_batch(vec![ana.clone()], at(9, 0));
        roster.merge_batch(vec![], at(9, 2));

        let report = roster.merge_batch(vec![ana.clone()], at(9, 3));
        assert_eq!(report.joined, vec![ana.token]);

        let record = roster.get(&ana.token).unwrap();
        assert!(record.is_currently_in_meeting);
        assert!(record.returned_after_leave());
        assert_eq!(record.last_return_at, Some(at(9, 3)));
    }
}
