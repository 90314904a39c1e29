//! Immutable snapshot rows.
//!
//! A [`Snapshot`] captures the values of every monitored field and property
//! of one tracked instance at one point in time. Snapshots are created only
//! by the recorder, never mutated afterwards, and deleted only as a cascade
//! effect of their subject's deletion.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::ids::{EntityId, SnapshotId};
use crate::value::FieldValue;

/// One immutable audit record of a tracked instance.
///
/// The captured column set is exactly the monitored-specifier set of the
/// subject's snapshot schema at derivation time. Ordering within a
/// subject's history is by `(created, seq)`; `seq` is a monotonic sequence
/// number assigned by the snapshot log so that colliding wall-clock
/// timestamps still order deterministically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique snapshot identifier.
    pub id: SnapshotId,
    /// Monotonic sequence number, the timestamp tie-breaker.
    pub seq: u64,
    /// Type of the tracked instance this snapshot belongs to.
    pub subject_type: EntityType,
    /// Identifier of the tracked instance (the back-reference).
    pub subject_id: EntityId,
    /// Creation timestamp, set once at append time.
    pub created: DateTime<Utc>,
    /// Modification timestamp. Present for parity with the row timestamp
    /// convention; equals `created` because snapshots are immutable, and
    /// is never consulted by change detection.
    pub modified: DateTime<Utc>,
    /// Captured values, keyed by normalized monitored name.
    pub values: BTreeMap<String, FieldValue>,
}

impl Snapshot {
    /// Read one captured value by its monitored name.
    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }
}
