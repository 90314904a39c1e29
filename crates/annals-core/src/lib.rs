//! Change detection, snapshot recording, and dispatch for the Annals
//! auditing layer.
//!
//! A tracked entity type gets an immutable
//! [`Snapshot`](annals_types::Snapshot) appended to its history whenever
//! a monitored field or computed property changes --
//! either because the instance itself was saved, or because a related
//! entity's save changed a derived value. Snapshots are never updated and
//! never deduplicated after the fact: the change detector decides before
//! the recorder writes.
//!
//! # Architecture
//!
//! - [`spec`] -- The [`TrackedSpec`] builder declaring what to monitor.
//! - [`schema`] -- Snapshot schema derivation from monitored specifiers.
//! - [`registry`] -- The [`AuditRegistry`]: declared types, trackers,
//!   relation graphs, and the watcher map consulted per save event.
//! - [`store`] -- The [`EntitySource`] data-access trait and the
//!   in-memory [`MemoryStore`].
//! - [`log`] -- The append-only [`SnapshotLog`].
//! - [`engine`] -- The [`Auditor`]: change detector, recorder, relation
//!   resolver, and the save-event dispatcher.
//!
//! # Control flow
//!
//! ```text
//! host save --> SaveEvent --> Auditor::on_saved
//!     |-- type is tracked -------> has_changed? --> record
//!     +-- type is watched -------> affected subjects --> has_changed? --> record
//! ```
//!
//! # Usage
//!
//! ```
//! use annals_core::{AuditRegistry, Auditor, MemoryStore, TrackedSpec};
//! use annals_types::{ColumnType, EntityDescriptor, EntityRow};
//!
//! let mut registry = AuditRegistry::new();
//! registry
//!     .declare(EntityDescriptor::new("comment").field("text", ColumnType::Text))
//!     .ok();
//! registry
//!     .track(TrackedSpec::new("comment").field("text"))
//!     .ok();
//!
//! let mut store = MemoryStore::new();
//! let mut auditor = Auditor::new(registry);
//!
//! let row = EntityRow::new("comment").with("text", "first");
//! let (ty, id) = (row.entity_type.clone(), row.id);
//! let event = store.upsert(row);
//! auditor.on_saved(&store, &event).ok();
//!
//! assert_eq!(auditor.history(&ty, id).len(), 1);
//! ```

pub mod engine;
pub mod log;
pub mod registry;
pub mod schema;
pub mod spec;
pub mod store;

// Re-export primary types at crate root.
pub use engine::Auditor;
pub use log::SnapshotLog;
pub use registry::{AuditRegistry, RelationGraph, Tracker};
pub use schema::SnapshotSchema;
pub use spec::{MonitoredSpec, PropertyError, PropertyFn, TrackedSpec};
pub use store::{EntitySource, MemoryStore};

use annals_types::{EntityId, EntityType};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Configuration errors raised at registration time.
///
/// Every variant is a programming error in the declaration surface; all
/// of them surface when a descriptor is declared or a tracked spec is
/// registered, never on the write path.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A spec or relation referenced an entity type that was never
    /// declared to the registry.
    #[error("entity type not declared: {0}")]
    UnknownEntityType(EntityType),

    /// The same entity type was declared twice.
    #[error("entity type already declared: {0}")]
    AlreadyDeclared(EntityType),

    /// The same entity type was tracked twice.
    #[error("entity type already tracked: {0}")]
    AlreadyTracked(EntityType),

    /// A monitored name resolves to neither a declared field nor a
    /// declared relation of the tracked type.
    #[error("monitored name `{name}` resolves to nothing on {subject}")]
    UnknownMonitored {
        /// The tracked type.
        subject: EntityType,
        /// The unresolvable monitored name.
        name: String,
    },

    /// A related specifier resolves to no concrete relation: it names
    /// neither a relation field on the tracked type nor a declared type
    /// holding a relation back to it.
    #[error("related specifier `{name}` resolves to no relation of {subject}")]
    UnknownRelation {
        /// The tracked type.
        subject: EntityType,
        /// The unresolvable related specifier.
        name: String,
    },

    /// Two monitored specifiers normalize to the same snapshot column.
    #[error("duplicate monitored name `{name}` on {subject}")]
    DuplicateMonitored {
        /// The tracked type.
        subject: EntityType,
        /// The duplicated monitored name.
        name: String,
    },

    /// A monitored name collides with a column every snapshot already
    /// carries (`id`, `seq`, `subject_id`, `subject_type`, `created`,
    /// `modified`).
    #[error("monitored name `{name}` on {subject} is a reserved snapshot column")]
    ReservedColumn {
        /// The tracked type.
        subject: EntityType,
        /// The reserved name.
        name: String,
    },

    /// A tracked spec declares no monitored specifiers at all.
    #[error("tracked spec for {0} monitors nothing")]
    EmptySpec(EntityType),
}

/// Errors raised on the write path while detecting, resolving, or
/// recording.
///
/// These propagate to the caller of the triggering save: a lost audit
/// record is a correctness defect, so no variant is swallowed into a
/// partial or default snapshot.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// A detector or recorder call addressed a type with no tracker.
    #[error("entity type not tracked: {0}")]
    NotTracked(EntityType),

    /// A row addressed by an event or a relation value was not present
    /// in the entity source.
    #[error("row not found: {entity_type} {entity_id}")]
    RowMissing {
        /// The missing row's type.
        entity_type: EntityType,
        /// The missing row's identifier.
        entity_id: EntityId,
    },

    /// A computed property failed while being evaluated during detection
    /// or recording.
    #[error("property `{property}` on {entity_type} {entity_id}: {source}")]
    Property {
        /// The subject's type.
        entity_type: EntityType,
        /// The subject's identifier.
        entity_id: EntityId,
        /// The failing property's name.
        property: String,
        /// The underlying evaluation error.
        source: PropertyError,
    },

    /// An internal error that should not occur in normal operation.
    #[error("internal audit error: {0}")]
    Internal(&'static str),
}
