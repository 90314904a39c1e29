//! The generic data-access surface and the in-memory store.
//!
//! The engine reads entity state exclusively through [`EntitySource`]:
//! one point lookup, plus the reverse-accessor query the relation
//! resolver needs. Any host storage that can answer those two questions
//! can sit underneath the auditor; [`MemoryStore`] is the bundled
//! implementation used by tests and embedders.

use std::collections::BTreeMap;

use annals_types::{EntityId, EntityRow, EntityType, SaveEvent};

/// Read access to persisted entity rows.
pub trait EntitySource {
    /// Read one row by address, `None` when absent.
    fn row(&self, entity_type: &EntityType, id: EntityId) -> Option<&EntityRow>;

    /// Ids of all rows of `entity_type` whose relation field `relation`
    /// references `target`, in deterministic order.
    fn referencing(
        &self,
        entity_type: &EntityType,
        relation: &str,
        target: EntityId,
    ) -> Vec<EntityId>;
}

/// In-memory entity store.
///
/// Rows are kept per type in id order. [`upsert`](Self::upsert) returns
/// the [`SaveEvent`] the host should dispatch -- the store is the one
/// place that knows whether a write was an insert or an update.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rows: BTreeMap<EntityType, BTreeMap<EntityId, EntityRow>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }

    /// Insert or update a row, returning the save event to dispatch.
    pub fn upsert(&mut self, row: EntityRow) -> SaveEvent {
        let entity_type = row.entity_type.clone();
        let id = row.id;
        let table = self.rows.entry(entity_type.clone()).or_default();
        let created = table.insert(id, row).is_none();

        tracing::debug!(%entity_type, %id, created, "Stored row");
        if created {
            SaveEvent::inserted(entity_type, id)
        } else {
            SaveEvent::updated(entity_type, id)
        }
    }

    /// Remove a row, returning it when it existed.
    pub fn remove(&mut self, entity_type: &EntityType, id: EntityId) -> Option<EntityRow> {
        self.rows.get_mut(entity_type).and_then(|t| t.remove(&id))
    }

    /// Number of rows of one type.
    pub fn count(&self, entity_type: &EntityType) -> usize {
        self.rows.get(entity_type).map_or(0, BTreeMap::len)
    }
}

impl EntitySource for MemoryStore {
    fn row(&self, entity_type: &EntityType, id: EntityId) -> Option<&EntityRow> {
        self.rows.get(entity_type).and_then(|t| t.get(&id))
    }

    fn referencing(
        &self,
        entity_type: &EntityType,
        relation: &str,
        target: EntityId,
    ) -> Vec<EntityId> {
        self.rows.get(entity_type).map_or_else(Vec::new, |table| {
            table
                .values()
                .filter(|row| row.reference(relation) == Some(target))
                .map(|row| row.id)
                .collect()
        })
    }
}
