//! The auditor: change detection, recording, relation resolution, and
//! save-event dispatch.
//!
//! All four operations run synchronously inside the host's write path:
//! the detect-then-record sequence for a subject executes in the same
//! transactional context as the triggering save, and a failed record
//! propagates as a failure of that save. A lost audit record is a
//! correctness defect, never a logged-and-forgotten event.
//!
//! # Known race
//!
//! The read-latest -> compare -> conditionally-append sequence takes no
//! lock of its own; it relies on the host write path being serialized per
//! row. Two truly concurrent writers saving the same subject can each
//! read the same "latest" snapshot, both conclude "changed", and both
//! record -- producing two near-duplicate snapshots. This is an accepted
//! limitation of the design, inherited from the single-writer assumption,
//! and is exercised by the integration tests rather than papered over.

use std::collections::{BTreeMap, BTreeSet};

use annals_types::{EntityId, EntityRow, EntityType, FieldValue, SaveEvent, Snapshot, SnapshotId};

use crate::log::SnapshotLog;
use crate::registry::{AuditRegistry, Tracker};
use crate::store::EntitySource;
use crate::AuditError;

/// The audit engine: owns the registry and the snapshot log, and applies
/// the detector-gated recording policy to every save event.
#[derive(Debug)]
pub struct Auditor {
    registry: AuditRegistry,
    log: SnapshotLog,
}

impl Auditor {
    /// Create an auditor over a fully registered registry.
    pub const fn new(registry: AuditRegistry) -> Self {
        Self {
            registry,
            log: SnapshotLog::new(),
        }
    }

    /// The registry this auditor dispatches against.
    pub const fn registry(&self) -> &AuditRegistry {
        &self.registry
    }

    /// The underlying snapshot log.
    pub const fn log(&self) -> &SnapshotLog {
        &self.log
    }

    /// A subject's snapshot history, in creation order.
    pub fn history(&self, entity_type: &EntityType, entity_id: EntityId) -> &[Snapshot] {
        self.log.history(entity_type, entity_id)
    }

    /// A subject's most recent snapshot.
    pub fn latest(&self, entity_type: &EntityType, entity_id: EntityId) -> Option<&Snapshot> {
        self.log.latest(entity_type, entity_id)
    }

    // -----------------------------------------------------------------------
    // Change detector
    // -----------------------------------------------------------------------

    /// Decide whether the subject's monitored values differ from its most
    /// recent snapshot.
    ///
    /// Returns `true` unconditionally when the subject has no snapshots:
    /// the first observation is always new information. Otherwise compares
    /// field by field with native value equality, short-circuiting on the
    /// first mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::NotTracked`] for untracked types,
    /// [`AuditError::RowMissing`] when the subject row is absent from the
    /// source, and [`AuditError::Property`] when a computed property fails
    /// to evaluate. None of these are swallowed; a value that cannot be
    /// resolved is a configuration error, not a "no change".
    pub fn has_changed(
        &self,
        source: &dyn EntitySource,
        entity_type: &EntityType,
        entity_id: EntityId,
    ) -> Result<bool, AuditError> {
        let tracker = self.tracker_for(entity_type)?;
        let row = subject_row(source, entity_type, entity_id)?;

        let Some(latest) = self.log.latest(entity_type, entity_id) else {
            return Ok(true);
        };

        for name in &tracker.schema.monitored {
            let current = monitored_value(tracker, source, row, name)?;
            let previous = latest.value(name).unwrap_or(&FieldValue::Null);
            if current != *previous {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // -----------------------------------------------------------------------
    // Recorder
    // -----------------------------------------------------------------------

    /// Materialize one snapshot of the subject's current monitored values
    /// and append it to the log.
    ///
    /// Every monitored name is read at call time -- computed properties
    /// are re-evaluated, never served from a cache. No dedup check happens
    /// here; callers gate on [`has_changed`](Self::has_changed) first.
    ///
    /// # Errors
    ///
    /// Same resolution errors as [`has_changed`](Self::has_changed); any
    /// failure aborts the record with nothing appended.
    pub fn record(
        &mut self,
        source: &dyn EntitySource,
        entity_type: &EntityType,
        entity_id: EntityId,
    ) -> Result<&Snapshot, AuditError> {
        let tracker = self
            .registry
            .tracker(entity_type)
            .ok_or_else(|| AuditError::NotTracked(entity_type.clone()))?;
        let row = subject_row(source, entity_type, entity_id)?;

        let mut captured = BTreeMap::new();
        for name in &tracker.schema.monitored {
            let value = monitored_value(tracker, source, row, name)?;
            captured.insert(name.clone(), value);
        }

        self.log.append(entity_type.clone(), entity_id, captured)
    }

    // -----------------------------------------------------------------------
    // Relation resolver
    // -----------------------------------------------------------------------

    /// All tracked instances reachable from one related row, across every
    /// tracker watching its type, deduplicated.
    ///
    /// Forward-partition relations (the tracked type holds the field) are
    /// resolved with a reverse-accessor query; reverse-partition relations
    /// (the related type holds the field) are read off the related row.
    /// Both produce zero-or-more subjects -- never assume one-to-one.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::RowMissing`] when a reverse-partition lookup
    /// needs the related row and the source no longer has it.
    pub fn affected_subjects(
        &self,
        source: &dyn EntitySource,
        related_type: &EntityType,
        related_id: EntityId,
    ) -> Result<BTreeSet<(EntityType, EntityId)>, AuditError> {
        let mut affected = BTreeSet::new();

        for subject in self.registry.watchers_of(related_type) {
            let Some(tracker) = self.registry.tracker(subject) else {
                continue;
            };

            if let Some(relations) = tracker.graph.forward.get(related_type) {
                for relation in relations {
                    for id in source.referencing(subject, relation, related_id) {
                        affected.insert((subject.clone(), id));
                    }
                }
            }

            if let Some(relations) = tracker.graph.reverse.get(related_type) {
                let row = subject_row(source, related_type, related_id)?;
                for relation in relations {
                    if let Some(id) = row.reference(relation) {
                        affected.insert((subject.clone(), id));
                    }
                }
            }
        }

        Ok(affected)
    }

    // -----------------------------------------------------------------------
    // Dispatcher
    // -----------------------------------------------------------------------

    /// Route one post-persist event.
    ///
    /// The direct arm fires when the written type is itself tracked: an
    /// insert records unconditionally, an update records when the detector
    /// reports a change. The indirect arm fires when the written type is
    /// watched: every affected subject is re-evaluated through the
    /// detector. A subject reachable through both arms is still recorded
    /// at most once -- the second evaluation finds no difference -- so
    /// dispatch itself performs no dedup.
    ///
    /// Returns the ids of the snapshots recorded by this event.
    ///
    /// # Errors
    ///
    /// Any detection or recording error aborts the dispatch and should
    /// fail the triggering save.
    pub fn on_saved(
        &mut self,
        source: &dyn EntitySource,
        event: &SaveEvent,
    ) -> Result<Vec<SnapshotId>, AuditError> {
        let mut recorded = Vec::new();

        if self.registry.is_tracked(&event.entity_type)
            && (event.created || self.has_changed(source, &event.entity_type, event.entity_id)?)
        {
            let id = self.record(source, &event.entity_type, event.entity_id)?.id;
            recorded.push(id);
        }

        if !self.registry.watchers_of(&event.entity_type).is_empty() {
            let affected =
                self.affected_subjects(source, &event.entity_type, event.entity_id)?;
            for (subject_type, subject_id) in affected {
                if self.has_changed(source, &subject_type, subject_id)? {
                    let id = self.record(source, &subject_type, subject_id)?.id;
                    recorded.push(id);
                }
            }
        }

        if !recorded.is_empty() {
            tracing::debug!(
                entity_type = %event.entity_type,
                entity_id = %event.entity_id,
                created = event.created,
                recorded = recorded.len(),
                "Save event recorded snapshots"
            );
        }
        Ok(recorded)
    }

    /// Cascade hook for a deleted row: drop the subject's snapshot
    /// history. Returns how many snapshots were purged. Deleting rows of
    /// merely related types purges nothing.
    pub fn on_deleted(&mut self, entity_type: &EntityType, entity_id: EntityId) -> usize {
        self.log.purge(entity_type, entity_id)
    }

    fn tracker_for(&self, entity_type: &EntityType) -> Result<&Tracker, AuditError> {
        self.registry
            .tracker(entity_type)
            .ok_or_else(|| AuditError::NotTracked(entity_type.clone()))
    }
}

/// Read the subject row or fail with [`AuditError::RowMissing`].
fn subject_row<'a>(
    source: &'a dyn EntitySource,
    entity_type: &EntityType,
    entity_id: EntityId,
) -> Result<&'a EntityRow, AuditError> {
    source
        .row(entity_type, entity_id)
        .ok_or_else(|| AuditError::RowMissing {
            entity_type: entity_type.clone(),
            entity_id,
        })
}

/// Resolve one monitored name to its current value: computed properties
/// are re-evaluated through the source; declared fields read the row map,
/// with absence meaning an unset (`Null`) value.
fn monitored_value(
    tracker: &Tracker,
    source: &dyn EntitySource,
    row: &EntityRow,
    name: &str,
) -> Result<FieldValue, AuditError> {
    if let Some(property) = tracker.property(name) {
        return (**property)(row, source).map_err(|err| AuditError::Property {
            entity_type: row.entity_type.clone(),
            entity_id: row.id,
            property: name.to_owned(),
            source: err,
        });
    }
    Ok(row.value(name).cloned().unwrap_or(FieldValue::Null))
}

#[cfg(test)]
mod tests {
    use annals_types::{ColumnType, EntityDescriptor};

    use super::*;
    use crate::spec::{PropertyError, TrackedSpec};
    use crate::store::MemoryStore;

    fn tracked_comment_registry() -> AuditRegistry {
        let mut registry = AuditRegistry::new();
        let _ = registry.declare(
            EntityDescriptor::new("comment")
                .field("text", ColumnType::Text)
                .field("impact", ColumnType::Integer),
        );
        let _ = registry.track(
            TrackedSpec::new("comment")
                .field("text")
                .property("impact_next", ColumnType::Integer, |row, _| {
                    match row.value("impact") {
                        Some(FieldValue::Integer(n)) => {
                            Ok(FieldValue::Integer(n.saturating_add(1)))
                        }
                        _ => Ok(FieldValue::Null),
                    }
                }),
        );
        registry
    }

    #[test]
    fn untracked_type_is_rejected() {
        let auditor = Auditor::new(AuditRegistry::new());
        let store = MemoryStore::new();
        let ghost = EntityType::from("ghost");
        let result = auditor.has_changed(&store, &ghost, EntityId::new());
        assert!(matches!(result, Err(AuditError::NotTracked(_))));
    }

    #[test]
    fn missing_row_is_rejected() {
        let auditor = Auditor::new(tracked_comment_registry());
        let store = MemoryStore::new();
        let comment = EntityType::from("comment");
        let result = auditor.has_changed(&store, &comment, EntityId::new());
        assert!(matches!(result, Err(AuditError::RowMissing { .. })));
    }

    #[test]
    fn first_observation_always_changed() {
        let auditor = Auditor::new(tracked_comment_registry());
        let mut store = MemoryStore::new();
        let row = EntityRow::new("comment").with("text", "a").with("impact", 1_i64);
        let (ty, id) = (row.entity_type.clone(), row.id);
        let _ = store.upsert(row);

        assert_eq!(auditor.has_changed(&store, &ty, id).ok(), Some(true));
    }

    #[test]
    fn record_captures_reevaluated_properties() {
        let mut auditor = Auditor::new(tracked_comment_registry());
        let mut store = MemoryStore::new();
        let row = EntityRow::new("comment").with("text", "a").with("impact", 1_i64);
        let (ty, id) = (row.entity_type.clone(), row.id);
        let _ = store.upsert(row.clone());

        let first = auditor.record(&store, &ty, id).map(|s| s.values.clone()).ok();
        assert_eq!(
            first.as_ref().and_then(|v| v.get("impact_next")).cloned(),
            Some(FieldValue::Integer(2))
        );

        // Mutate the underlying field; the property must be re-read, not
        // served from any cache.
        let _ = store.upsert(row.with("impact", 7_i64));
        let second = auditor.record(&store, &ty, id).map(|s| s.values.clone()).ok();
        assert_eq!(
            second.as_ref().and_then(|v| v.get("impact_next")).cloned(),
            Some(FieldValue::Integer(8))
        );
    }

    #[test]
    fn detector_short_circuits_but_sees_all_fields() {
        let mut auditor = Auditor::new(tracked_comment_registry());
        let mut store = MemoryStore::new();
        let row = EntityRow::new("comment").with("text", "a").with("impact", 1_i64);
        let (ty, id) = (row.entity_type.clone(), row.id);
        let _ = store.upsert(row.clone());
        let _ = auditor.record(&store, &ty, id);

        // Unchanged row: every field equal, detector settles on false.
        assert_eq!(auditor.has_changed(&store, &ty, id).ok(), Some(false));

        // Change only the property's input: the last compared field
        // differs, so detection still reports true.
        let _ = store.upsert(row.with("impact", 2_i64));
        assert_eq!(auditor.has_changed(&store, &ty, id).ok(), Some(true));
    }

    #[test]
    fn property_failure_propagates() {
        let mut registry = AuditRegistry::new();
        let _ = registry.declare(EntityDescriptor::new("comment").field("text", ColumnType::Text));
        let _ = registry.track(TrackedSpec::new("comment").property(
            "broken",
            ColumnType::Text,
            |_, _| Err(PropertyError::new("boom")),
        ));
        let mut auditor = Auditor::new(registry);
        let mut store = MemoryStore::new();
        let row = EntityRow::new("comment").with("text", "a");
        let (ty, id) = (row.entity_type.clone(), row.id);
        let event = store.upsert(row);

        let result = auditor.on_saved(&store, &event);
        assert!(matches!(result, Err(AuditError::Property { .. })));
        // Nothing partial was recorded.
        assert!(auditor.history(&ty, id).is_empty());
    }
}
