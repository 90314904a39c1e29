//! The audit registry: declared types, trackers, and the watcher map.
//!
//! The registry replaces runtime type introspection with explicit
//! metadata built once at startup. Hosts first [`declare`] the
//! descriptors of every participating entity type, then [`track`] the
//! types to audit. Registration resolves monitored and related
//! specifiers immediately and fails fast on anything unresolvable --
//! configuration errors never wait for the first write.
//!
//! Dispatch consults two lookups built here: the tracker table
//! (entity type -> [`Tracker`]) and the watcher map
//! (related type -> tracked types that care about its writes). There is
//! no broadcast bus; a save event touches exactly the trackers that
//! registered interest.
//!
//! [`declare`]: AuditRegistry::declare
//! [`track`]: AuditRegistry::track

use std::collections::{BTreeMap, BTreeSet};

use annals_types::{EntityDescriptor, EntityType};

use crate::schema::SnapshotSchema;
use crate::spec::{PropertyFn, TrackedSpec};
use crate::ConfigError;

// ---------------------------------------------------------------------------
// Relation graph
// ---------------------------------------------------------------------------

/// The related-type sets of one tracked type, partitioned by where the
/// linking relation is declared.
///
/// Snapshot rows themselves are not registry entities, so the recorder's
/// own writes can never appear in either partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationGraph {
    /// Forward partition: related type -> names of relation fields
    /// declared **on the tracked type** pointing at it. Affected
    /// subjects are found by querying rows that reference the related
    /// instance.
    pub forward: BTreeMap<EntityType, Vec<String>>,
    /// Reverse partition: related type -> names of relation fields
    /// declared **on the related type** pointing back at the tracked
    /// type. Affected subjects are read off the related row directly.
    pub reverse: BTreeMap<EntityType, Vec<String>>,
}

impl RelationGraph {
    /// All related types, both partitions, deduplicated.
    pub fn related_types(&self) -> BTreeSet<EntityType> {
        self.forward
            .keys()
            .chain(self.reverse.keys())
            .cloned()
            .collect()
    }

    /// Whether the graph watches nothing.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.reverse.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Everything the engine needs about one tracked type, built once at
/// registration: the derived snapshot schema, the property table, and
/// the relation graph.
pub struct Tracker {
    /// The tracked type.
    pub subject: EntityType,
    /// Derived snapshot schema with the normalized monitored-name list.
    pub schema: SnapshotSchema,
    /// Relation graph over the related specifiers.
    pub graph: RelationGraph,
    properties: BTreeMap<String, PropertyFn>,
}

impl Tracker {
    /// Look up a computed property by its monitored name.
    pub fn property(&self, name: &str) -> Option<&PropertyFn> {
        self.properties.get(name)
    }
}

impl core::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracker")
            .field("subject", &self.subject)
            .field("schema", &self.schema)
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// AuditRegistry
// ---------------------------------------------------------------------------

/// Startup-time registry of declared entity types and tracked specs.
#[derive(Debug, Default)]
pub struct AuditRegistry {
    descriptors: BTreeMap<EntityType, EntityDescriptor>,
    trackers: BTreeMap<EntityType, Tracker>,
    watchers: BTreeMap<EntityType, Vec<EntityType>>,
}

impl AuditRegistry {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            descriptors: BTreeMap::new(),
            trackers: BTreeMap::new(),
            watchers: BTreeMap::new(),
        }
    }

    /// Declare one entity type's descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AlreadyDeclared`] if the type name was
    /// declared before.
    pub fn declare(&mut self, descriptor: EntityDescriptor) -> Result<(), ConfigError> {
        let name = descriptor.name.clone();
        if self.descriptors.contains_key(&name) {
            return Err(ConfigError::AlreadyDeclared(name));
        }
        tracing::debug!(entity_type = %name, "Declared entity descriptor");
        self.descriptors.insert(name, descriptor);
        Ok(())
    }

    /// Look up a declared descriptor.
    pub fn descriptor(&self, entity_type: &EntityType) -> Option<&EntityDescriptor> {
        self.descriptors.get(entity_type)
    }

    /// Register a tracked spec: derive its snapshot schema, resolve its
    /// related specifiers into a relation graph, and index it in the
    /// watcher map.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the subject or a related target is
    /// undeclared, when the type is tracked twice, or when schema
    /// derivation rejects the monitored specifiers. All of these surface
    /// here, at registration time.
    pub fn track(&mut self, mut spec: TrackedSpec) -> Result<(), ConfigError> {
        let subject = spec.subject.clone();

        if self.trackers.contains_key(&subject) {
            return Err(ConfigError::AlreadyTracked(subject));
        }
        let descriptor = self
            .descriptors
            .get(&subject)
            .ok_or_else(|| ConfigError::UnknownEntityType(subject.clone()))?;

        let schema = SnapshotSchema::derive(descriptor, &spec.monitored)?;
        let graph = if spec.audit_all_relations {
            self.discover_all_relations(descriptor)
        } else {
            self.resolve_related(descriptor, &spec.related)?
        };

        // Every forward target must itself be declared; an unknown
        // target would otherwise only surface at dispatch time.
        for target in graph.forward.keys() {
            if !self.descriptors.contains_key(target) {
                return Err(ConfigError::UnknownEntityType(target.clone()));
            }
        }

        for related in graph.related_types() {
            let watchers = self.watchers.entry(related).or_default();
            if !watchers.contains(&subject) {
                watchers.push(subject.clone());
            }
        }

        tracing::info!(
            subject = %subject,
            monitored = ?schema.monitored,
            related = ?graph.related_types(),
            "Registered tracker"
        );

        let properties = spec.take_properties();
        self.trackers.insert(
            subject.clone(),
            Tracker {
                subject,
                schema,
                graph,
                properties,
            },
        );
        Ok(())
    }

    /// Look up the tracker of a tracked type.
    pub fn tracker(&self, entity_type: &EntityType) -> Option<&Tracker> {
        self.trackers.get(entity_type)
    }

    /// Whether the type is tracked.
    pub fn is_tracked(&self, entity_type: &EntityType) -> bool {
        self.trackers.contains_key(entity_type)
    }

    /// The tracked types that registered interest in writes of
    /// `entity_type`, in registration order.
    pub fn watchers_of(&self, entity_type: &EntityType) -> &[EntityType] {
        self.watchers
            .get(entity_type)
            .map_or(&[], Vec::as_slice)
    }

    /// Iterate over all registered trackers.
    pub fn trackers(&self) -> impl Iterator<Item = &Tracker> {
        self.trackers.values()
    }

    /// Resolve an explicit related-specifier list into a relation graph.
    fn resolve_related(
        &self,
        descriptor: &EntityDescriptor,
        related: &[String],
    ) -> Result<RelationGraph, ConfigError> {
        let subject = &descriptor.name;
        let mut graph = RelationGraph::default();

        for name in related {
            // A relation field declared on the tracked type itself.
            if let Some(rel) = descriptor.relation_def(name) {
                graph
                    .forward
                    .entry(rel.target.clone())
                    .or_default()
                    .push(rel.name.clone());
                continue;
            }

            // The name of a declared type holding a relation back to the
            // tracked type.
            let foreign = EntityType::from(name.clone());
            if let Some(foreign_descriptor) = self.descriptors.get(&foreign) {
                let back_relations = foreign_descriptor.relations_to(subject);
                if !back_relations.is_empty() {
                    let names = graph.reverse.entry(foreign).or_default();
                    for rel in back_relations {
                        names.push(rel.name.clone());
                    }
                    continue;
                }
            }

            return Err(ConfigError::UnknownRelation {
                subject: subject.clone(),
                name: name.clone(),
            });
        }

        Ok(graph)
    }

    /// Discover every relation touching the tracked type from the
    /// registry metadata: its own relation fields (forward) and every
    /// declared type holding a relation back to it (reverse).
    fn discover_all_relations(&self, descriptor: &EntityDescriptor) -> RelationGraph {
        let subject = &descriptor.name;
        let mut graph = RelationGraph::default();

        for rel in &descriptor.relations {
            graph
                .forward
                .entry(rel.target.clone())
                .or_default()
                .push(rel.name.clone());
        }

        for (name, foreign_descriptor) in &self.descriptors {
            let back_relations = foreign_descriptor.relations_to(subject);
            if !back_relations.is_empty() {
                let names = graph.reverse.entry(name.clone()).or_default();
                for rel in back_relations {
                    names.push(rel.name.clone());
                }
            }
        }

        graph
    }
}
