//! Runtime field values and their storage type descriptors.
//!
//! A monitored field or computed property always evaluates to a
//! [`FieldValue`]. Snapshot schemas describe each captured column with a
//! [`ColumnType`], and the two sides meet at record time: the value a
//! property returns must be representable in the column declared for it.
//!
//! Fractional values use [`Decimal`] rather than floats so that the
//! field-by-field equality used by change detection stays exact.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::EntityId;

// ---------------------------------------------------------------------------
// ColumnType
// ---------------------------------------------------------------------------

/// Storage type of one snapshot column.
///
/// For a plain monitored field the column type is duplicated from the
/// tracked type's field definition. For a computed property it is supplied
/// by the caller at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// Boolean flag.
    Bool,
    /// 64-bit signed integer.
    Integer,
    /// Exact decimal number.
    Decimal,
    /// UTF-8 text.
    Text,
    /// UTC timestamp.
    Timestamp,
    /// UUID, including foreign-key references.
    Uuid,
    /// Arbitrary JSON document.
    Json,
}

impl core::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::Uuid => "uuid",
            Self::Json => "json",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// The runtime value of a monitored field, relation or computed property.
///
/// Equality between two values of the same variant is the native equality
/// of the underlying type; this is the comparison the change detector
/// performs per captured column. `Null` is equal only to itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Absent or unset value.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// Exact decimal number.
    Decimal(Decimal),
    /// UTF-8 text.
    Text(String),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// UUID, including foreign-key references.
    Uuid(Uuid),
    /// Arbitrary JSON document.
    Json(serde_json::Value),
}

impl FieldValue {
    /// Return the [`ColumnType`] this value is stored as, or `None` for
    /// `Null` (a null fits any column).
    pub const fn column_type(&self) -> Option<ColumnType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ColumnType::Bool),
            Self::Integer(_) => Some(ColumnType::Integer),
            Self::Decimal(_) => Some(ColumnType::Decimal),
            Self::Text(_) => Some(ColumnType::Text),
            Self::Timestamp(_) => Some(ColumnType::Timestamp),
            Self::Uuid(_) => Some(ColumnType::Uuid),
            Self::Json(_) => Some(ColumnType::Json),
        }
    }

    /// Return whether this value is `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Return the inner UUID for `Uuid` values, `None` otherwise.
    pub const fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<Decimal> for FieldValue {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Uuid> for FieldValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<EntityId> for FieldValue {
    fn from(v: EntityId) -> Self {
        Self::Uuid(v.into_inner())
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl<T> From<Option<T>> for FieldValue
where
    T: Into<Self>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
