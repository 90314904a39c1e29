//! Tracked-type specifications: what to monitor, what to watch.
//!
//! A [`TrackedSpec`] names the entity type to audit, the fields and
//! computed properties whose values every snapshot captures, and the
//! related specifiers whose saves should re-evaluate the subject.
//! Specs are plain data until handed to
//! [`AuditRegistry::track`](crate::AuditRegistry::track), which validates
//! them against the declared descriptors and fails fast on anything
//! unresolvable.

use std::collections::BTreeMap;
use std::sync::Arc;

use annals_types::{ColumnType, EntityRow, EntityType, FieldValue};

use crate::store::EntitySource;

// ---------------------------------------------------------------------------
// Computed properties
// ---------------------------------------------------------------------------

/// Error returned by a computed property that could not be evaluated.
///
/// Property failures propagate to the caller of the triggering save; the
/// engine never records a partial snapshot around them.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct PropertyError {
    /// Human-readable description of the failure.
    pub message: String,
}

impl PropertyError {
    /// Create a property error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A computed property over a tracked row.
///
/// Properties are re-evaluated at every detection and recording call --
/// never cached -- and may follow relations through the entity source
/// (for example, summing a value over referencing rows).
pub type PropertyFn =
    Arc<dyn Fn(&EntityRow, &dyn EntitySource) -> Result<FieldValue, PropertyError> + Send + Sync>;

// ---------------------------------------------------------------------------
// Monitored specifiers
// ---------------------------------------------------------------------------

/// One monitored specifier: a plain field name, or a computed property
/// paired with the storage type its values are captured as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitoredSpec {
    /// A declared field (or to-one relation) of the tracked type; the
    /// snapshot column duplicates its definition.
    Field(String),
    /// A computed property; the snapshot column uses the caller-supplied
    /// storage type verbatim.
    Property {
        /// Property name, also the snapshot column name.
        name: String,
        /// Storage type of the captured value.
        column: ColumnType,
    },
}

impl MonitoredSpec {
    /// The normalized (pure) name of this specifier.
    pub fn name(&self) -> &str {
        match self {
            Self::Field(name) | Self::Property { name, .. } => name,
        }
    }
}

// ---------------------------------------------------------------------------
// TrackedSpec
// ---------------------------------------------------------------------------

/// Declaration of one tracked entity type.
///
/// # Examples
///
/// ```
/// use annals_core::TrackedSpec;
/// use annals_types::{ColumnType, FieldValue};
///
/// let spec = TrackedSpec::new("comment")
///     .field("point")
///     .field("text")
///     .property("shouted", ColumnType::Text, |row, _source| {
///         match row.value("text") {
///             Some(FieldValue::Text(t)) => Ok(FieldValue::Text(t.to_uppercase())),
///             _ => Ok(FieldValue::Null),
///         }
///     })
///     .related("article");
///
/// assert_eq!(spec.subject.as_str(), "comment");
/// ```
pub struct TrackedSpec {
    /// The entity type to audit.
    pub subject: EntityType,
    /// Monitored specifiers, in declaration order.
    pub monitored: Vec<MonitoredSpec>,
    /// Related specifiers, in declaration order.
    pub related: Vec<String>,
    /// When set, the related list is replaced with every relation
    /// discovered from the registry metadata at registration time.
    pub audit_all_relations: bool,
    properties: BTreeMap<String, PropertyFn>,
}

impl TrackedSpec {
    /// Start a spec for the given tracked type.
    pub fn new(subject: impl Into<EntityType>) -> Self {
        Self {
            subject: subject.into(),
            monitored: Vec::new(),
            related: Vec::new(),
            audit_all_relations: false,
            properties: BTreeMap::new(),
        }
    }

    /// Monitor a declared field (or to-one relation) by name.
    #[must_use]
    pub fn field(mut self, name: &str) -> Self {
        self.monitored.push(MonitoredSpec::Field(name.to_owned()));
        self
    }

    /// Monitor a computed property, captured under the supplied storage
    /// type. The property's returned values must be representable in
    /// that column; this is the caller's responsibility.
    #[must_use]
    pub fn property<F>(mut self, name: &str, column: ColumnType, f: F) -> Self
    where
        F: Fn(&EntityRow, &dyn EntitySource) -> Result<FieldValue, PropertyError>
            + Send
            + Sync
            + 'static,
    {
        self.monitored.push(MonitoredSpec::Property {
            name: name.to_owned(),
            column,
        });
        self.properties.insert(name.to_owned(), Arc::new(f));
        self
    }

    /// Watch a related specifier: either a relation field declared on the
    /// tracked type, or the name of a declared type holding a relation
    /// back to the tracked type.
    #[must_use]
    pub fn related(mut self, name: &str) -> Self {
        self.related.push(name.to_owned());
        self
    }

    /// Watch every relation discoverable from the registry metadata
    /// instead of an explicit related list.
    #[must_use]
    pub const fn all_relations(mut self) -> Self {
        self.audit_all_relations = true;
        self
    }

    /// Hand the registered property functions over to the tracker being
    /// built. Consumes the spec's property table.
    pub(crate) fn take_properties(&mut self) -> BTreeMap<String, PropertyFn> {
        core::mem::take(&mut self.properties)
    }
}

impl core::fmt::Debug for TrackedSpec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrackedSpec")
            .field("subject", &self.subject)
            .field("monitored", &self.monitored)
            .field("related", &self.related)
            .field("audit_all_relations", &self.audit_all_relations)
            .finish_non_exhaustive()
    }
}
