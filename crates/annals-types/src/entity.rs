//! Entity type names, declared metadata, and generic row views.
//!
//! The auditing engine never links against host domain structs. Instead,
//! each participating type publishes an [`EntityDescriptor`] -- its scalar
//! fields and to-one relations -- and its instances are read through the
//! generic [`EntityRow`] view. This is the declared reflection surface the
//! schema builder and relation resolver work from; it is built once at
//! startup and never inspected per save.
//!
//! Collection-valued relations have no column of their own in a relational
//! store: the many side is always the reverse of some other type's to-one
//! relation, and is resolved by querying referencing rows.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::EntityId;
use crate::value::{ColumnType, FieldValue};

// ---------------------------------------------------------------------------
// EntityType
// ---------------------------------------------------------------------------

/// Name key identifying one registered entity type.
///
/// Registration code typically uses static names (`EntityType::from`
/// on a `&'static str`); deserialized values own their string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityType(Cow<'static, str>);

impl EntityType {
    /// Create a type name from a static string, usable in `const` context.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Return the type name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for EntityType {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl core::fmt::Display for EntityType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Declared metadata
// ---------------------------------------------------------------------------

/// Declared definition of one scalar field on an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name, unique within its descriptor.
    pub name: String,
    /// Storage type of the field.
    pub column: ColumnType,
}

/// Declared definition of one to-one relation on an entity type.
///
/// The relation's value lives in the row as a [`FieldValue::Uuid`] (or
/// `Null` when unset) under the relation's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Relation field name, unique within its descriptor.
    pub name: String,
    /// Target entity type the relation points at.
    pub target: EntityType,
}

/// Declared metadata for one entity type: its name, scalar fields, and
/// to-one relations.
///
/// Descriptors are declared once at startup and handed to the audit
/// registry; they are the only type information the engine ever sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// The type this descriptor describes.
    pub name: EntityType,
    /// Scalar fields, in declaration order.
    pub fields: Vec<FieldDef>,
    /// To-one relations, in declaration order.
    pub relations: Vec<RelationDef>,
}

impl EntityDescriptor {
    /// Create an empty descriptor for the given type name.
    pub fn new(name: impl Into<EntityType>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Declare a scalar field.
    #[must_use]
    pub fn field(mut self, name: &str, column: ColumnType) -> Self {
        self.fields.push(FieldDef {
            name: name.to_owned(),
            column,
        });
        self
    }

    /// Declare a to-one relation to another entity type.
    #[must_use]
    pub fn relation(mut self, name: &str, target: impl Into<EntityType>) -> Self {
        self.relations.push(RelationDef {
            name: name.to_owned(),
            target: target.into(),
        });
        self
    }

    /// Look up a declared scalar field by name.
    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a declared relation by name.
    pub fn relation_def(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Return all declared relations pointing at `target`.
    pub fn relations_to(&self, target: &EntityType) -> Vec<&RelationDef> {
        self.relations.iter().filter(|r| &r.target == target).collect()
    }
}

// ---------------------------------------------------------------------------
// EntityRow
// ---------------------------------------------------------------------------

/// Generic view of one persisted entity instance.
///
/// Scalar fields and to-one relation values live in the same map, keyed by
/// their declared names; relation values are [`FieldValue::Uuid`] (or
/// `Null`). Hosts build rows with the [`with`](Self::with) builder or
/// mutate them with [`set`](Self::set) before saving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
    /// The row's entity type.
    pub entity_type: EntityType,
    /// The row's identifier.
    pub id: EntityId,
    /// Field and relation values, keyed by declared name.
    pub values: BTreeMap<String, FieldValue>,
}

impl EntityRow {
    /// Create an empty row of the given type with a fresh identifier.
    pub fn new(entity_type: impl Into<EntityType>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: EntityId::new(),
            values: BTreeMap::new(),
        }
    }

    /// Set a field or relation value, builder style.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.values.insert(name.to_owned(), value.into());
        self
    }

    /// Set a field or relation value in place.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.values.insert(name.to_owned(), value.into());
    }

    /// Read a field or relation value.
    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Read a to-one relation value as an [`EntityId`], `None` when the
    /// relation is unset, null, or not a UUID.
    pub fn reference(&self, relation: &str) -> Option<EntityId> {
        self.values
            .get(relation)
            .and_then(FieldValue::as_uuid)
            .map(EntityId::from)
    }
}

// ---------------------------------------------------------------------------
// SaveEvent
// ---------------------------------------------------------------------------

/// Post-persist notification for one entity row.
///
/// Fired by the host after a row is durably written, once the
/// insert-versus-update distinction is known. The row itself is read back
/// through the entity source; the event only carries its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveEvent {
    /// Type of the written row.
    pub entity_type: EntityType,
    /// Identifier of the written row.
    pub entity_id: EntityId,
    /// Whether the write was an insert (`true`) or an update (`false`).
    pub created: bool,
}

impl SaveEvent {
    /// Event for a freshly inserted row.
    pub fn inserted(entity_type: impl Into<EntityType>, entity_id: EntityId) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id,
            created: true,
        }
    }

    /// Event for an updated row.
    pub fn updated(entity_type: impl Into<EntityType>, entity_id: EntityId) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id,
            created: false,
        }
    }
}
