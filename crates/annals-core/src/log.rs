//! The append-only snapshot log.
//!
//! Every tracked instance owns one history: a list of immutable
//! [`Snapshot`] rows in append order. The log assigns each snapshot a
//! monotonic sequence number, so "most recent" is always well defined as
//! the maximum of `(created, seq)` even when two wall-clock timestamps
//! collide.
//!
//! # Design
//!
//! - **Append-only**: snapshots are never modified; the only removal is
//!   the cascade [`purge`](SnapshotLog::purge) when a subject row is
//!   deleted.
//! - **Per-subject ordering**: each history slice is in `seq` order,
//!   which is also creation order.

use std::collections::BTreeMap;

use annals_types::{EntityId, EntityType, FieldValue, Snapshot, SnapshotId};
use chrono::Utc;

use crate::AuditError;

/// Append-only store of snapshot histories, keyed by subject.
#[derive(Debug, Clone, Default)]
pub struct SnapshotLog {
    histories: BTreeMap<(EntityType, EntityId), Vec<Snapshot>>,
    next_seq: u64,
}

impl SnapshotLog {
    /// Create an empty log.
    pub const fn new() -> Self {
        Self {
            histories: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Append a snapshot for the given subject and return it.
    ///
    /// Stamps `created` and `modified` with the same instant and assigns
    /// the next sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Internal`] if the appended snapshot cannot
    /// be retrieved back, which should not occur in normal operation.
    pub fn append(
        &mut self,
        subject_type: EntityType,
        subject_id: EntityId,
        values: BTreeMap<String, FieldValue>,
    ) -> Result<&Snapshot, AuditError> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);

        let now = Utc::now();
        let snapshot = Snapshot {
            id: SnapshotId::new(),
            seq,
            subject_type: subject_type.clone(),
            subject_id,
            created: now,
            modified: now,
            values,
        };

        tracing::debug!(subject = %subject_type, %subject_id, seq, "Appended snapshot");

        let history = self
            .histories
            .entry((subject_type, subject_id))
            .or_default();
        history.push(snapshot);

        // Return a reference to the snapshot we just pushed.
        history.last().ok_or(AuditError::Internal(
            "failed to retrieve snapshot after append",
        ))
    }

    /// A subject's full history, in append (sequence) order. Empty slice
    /// when the subject has never been recorded.
    pub fn history(&self, subject_type: &EntityType, subject_id: EntityId) -> &[Snapshot] {
        self.histories
            .get(&(subject_type.clone(), subject_id))
            .map_or(&[], Vec::as_slice)
    }

    /// The most recent snapshot of a subject: maximum `(created, seq)`.
    /// `None` when the subject has no snapshots.
    pub fn latest(&self, subject_type: &EntityType, subject_id: EntityId) -> Option<&Snapshot> {
        self.history(subject_type, subject_id)
            .iter()
            .max_by_key(|s| (s.created, s.seq))
    }

    /// Number of snapshots recorded for one subject.
    pub fn count(&self, subject_type: &EntityType, subject_id: EntityId) -> usize {
        self.history(subject_type, subject_id).len()
    }

    /// Total number of snapshots across all subjects.
    pub fn len(&self) -> usize {
        self.histories.values().map(Vec::len).sum()
    }

    /// Whether the log holds no snapshots at all.
    pub fn is_empty(&self) -> bool {
        self.histories.values().all(Vec::is_empty)
    }

    /// Cascade-delete a subject's history, returning how many snapshots
    /// were dropped. This is the only removal the log supports.
    pub fn purge(&mut self, subject_type: &EntityType, subject_id: EntityId) -> usize {
        let dropped = self
            .histories
            .remove(&(subject_type.clone(), subject_id))
            .map_or(0, |h| h.len());
        if dropped > 0 {
            tracing::debug!(subject = %subject_type, %subject_id, dropped, "Purged history");
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(text: &str) -> BTreeMap<String, FieldValue> {
        let mut map = BTreeMap::new();
        map.insert("text".to_owned(), FieldValue::from(text));
        map
    }

    #[test]
    fn new_log_is_empty() {
        let log = SnapshotLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn append_assigns_monotonic_sequence_numbers() {
        let mut log = SnapshotLog::new();
        let ty = EntityType::from("comment");
        let id = EntityId::new();

        let first_seq = log.append(ty.clone(), id, values("a")).map(|s| s.seq).ok();
        let second_seq = log.append(ty.clone(), id, values("b")).map(|s| s.seq).ok();
        assert!(second_seq > first_seq);
        assert_eq!(log.count(&ty, id), 2);
    }

    #[test]
    fn latest_breaks_timestamp_ties_by_sequence() {
        let mut log = SnapshotLog::new();
        let ty = EntityType::from("comment");
        let id = EntityId::new();

        let _ = log.append(ty.clone(), id, values("a"));
        let _ = log.append(ty.clone(), id, values("b"));

        // Force a timestamp collision: both snapshots share one instant,
        // so ordering must fall back to the sequence number.
        if let Some(history) = log.histories.get_mut(&(ty.clone(), id)) {
            let instant = Utc::now();
            for snapshot in history.iter_mut() {
                snapshot.created = instant;
                snapshot.modified = instant;
            }
        }

        let latest = log.latest(&ty, id);
        assert_eq!(
            latest.and_then(|s| s.value("text")).cloned(),
            Some(FieldValue::from("b"))
        );
    }

    #[test]
    fn histories_are_isolated_per_subject() {
        let mut log = SnapshotLog::new();
        let ty = EntityType::from("comment");
        let a = EntityId::new();
        let b = EntityId::new();

        let _ = log.append(ty.clone(), a, values("a"));
        let _ = log.append(ty.clone(), b, values("b"));

        assert_eq!(log.count(&ty, a), 1);
        assert_eq!(log.count(&ty, b), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn latest_on_unknown_subject_is_none() {
        let log = SnapshotLog::new();
        let ty = EntityType::from("comment");
        assert!(log.latest(&ty, EntityId::new()).is_none());
    }

    #[test]
    fn purge_drops_the_whole_history() {
        let mut log = SnapshotLog::new();
        let ty = EntityType::from("comment");
        let id = EntityId::new();
        let _ = log.append(ty.clone(), id, values("a"));
        let _ = log.append(ty.clone(), id, values("b"));

        assert_eq!(log.purge(&ty, id), 2);
        assert!(log.history(&ty, id).is_empty());
        assert_eq!(log.purge(&ty, id), 0);
    }

    #[test]
    fn modified_mirrors_created_at_append_time() {
        let mut log = SnapshotLog::new();
        let ty = EntityType::from("comment");
        let id = EntityId::new();
        let snapshot = log.append(ty, id, values("a")).ok();
        assert!(snapshot.is_some());
        if let Some(snapshot) = snapshot {
            assert_eq!(snapshot.created, snapshot.modified);
        }
    }
}
