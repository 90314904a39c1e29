//! Snapshot schema derivation.
//!
//! Deriving a schema is an explicit build step that runs once, at
//! registration time: the monitored-specifier list is resolved against
//! the tracked type's declared descriptor and normalized into a pure-name
//! list plus one concrete column per specifier. The detector and recorder
//! consume the normalized output and never re-resolve specifiers per
//! call.
//!
//! Every snapshot also carries the subject back-reference and the
//! `created`/`modified` timestamp pair; those live on the
//! [`Snapshot`](annals_types::Snapshot) struct itself, so their names are
//! reserved and may not be monitored.

use serde::{Deserialize, Serialize};

use annals_types::{ColumnType, EntityDescriptor, EntityType, FieldDef};

use crate::spec::MonitoredSpec;
use crate::ConfigError;

/// Column names every snapshot carries structurally.
const RESERVED_COLUMNS: [&str; 6] = ["id", "seq", "subject_id", "subject_type", "created", "modified"];

/// The derived snapshot schema of one tracked type.
///
/// `columns` and `monitored` are parallel: one entry per monitored
/// specifier, in declaration order. The column set is fixed at derivation
/// time and does not change without re-registering the tracked type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSchema {
    /// The tracked type this schema captures.
    pub subject: EntityType,
    /// Materialized columns, one per monitored specifier.
    pub columns: Vec<FieldDef>,
    /// Normalized pure-name list, same order as `columns`.
    pub monitored: Vec<String>,
}

impl SnapshotSchema {
    /// Derive the schema for `descriptor` from its monitored specifiers.
    ///
    /// Plain names duplicate the descriptor's field definition (same
    /// storage type, independent identity); names resolving to a to-one
    /// relation capture the reference as a UUID column; property
    /// specifiers use the caller-supplied column type verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptySpec`] when no specifiers are given,
    /// [`ConfigError::ReservedColumn`] or
    /// [`ConfigError::DuplicateMonitored`] on name collisions, and
    /// [`ConfigError::UnknownMonitored`] when a plain name resolves to
    /// neither a field nor a relation.
    pub fn derive(
        descriptor: &EntityDescriptor,
        specifiers: &[MonitoredSpec],
    ) -> Result<Self, ConfigError> {
        let subject = descriptor.name.clone();

        if specifiers.is_empty() {
            return Err(ConfigError::EmptySpec(subject));
        }

        let mut columns: Vec<FieldDef> = Vec::with_capacity(specifiers.len());
        let mut monitored: Vec<String> = Vec::with_capacity(specifiers.len());

        for specifier in specifiers {
            let name = specifier.name();

            if RESERVED_COLUMNS.contains(&name) {
                return Err(ConfigError::ReservedColumn {
                    subject,
                    name: name.to_owned(),
                });
            }
            if monitored.iter().any(|m| m == name) {
                return Err(ConfigError::DuplicateMonitored {
                    subject,
                    name: name.to_owned(),
                });
            }

            let column = match specifier {
                MonitoredSpec::Field(_) => match descriptor.field_def(name) {
                    // Duplicate the declared definition; the copy is
                    // independent of the original.
                    Some(def) => def.clone(),
                    None => match descriptor.relation_def(name) {
                        Some(_) => FieldDef {
                            name: name.to_owned(),
                            column: ColumnType::Uuid,
                        },
                        None => {
                            return Err(ConfigError::UnknownMonitored {
                                subject,
                                name: name.to_owned(),
                            });
                        }
                    },
                },
                MonitoredSpec::Property { column, .. } => FieldDef {
                    name: name.to_owned(),
                    column: *column,
                },
            };

            columns.push(column);
            monitored.push(name.to_owned());
        }

        Ok(Self {
            subject,
            columns,
            monitored,
        })
    }

    /// Look up a derived column by its monitored name.
    pub fn column(&self, name: &str) -> Option<&FieldDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}
