//! `PostgreSQL` archival of snapshot histories.
//!
//! The in-memory snapshot log is the hot, transaction-scoped side of the
//! audit layer; this crate is the cold side: a per-tracked-type
//! `PostgreSQL` table whose DDL is generated from the derived
//! [`SnapshotSchema`](annals_core::SnapshotSchema), with parameterized
//! inserts and time-ordered readback for analytics.
//!
//! Uses [`sqlx`] with runtime query construction (not compile-time
//! checked) to avoid requiring a live database at build time. All value
//! positions are parameterized; identifiers are sanitized before they are
//! interpolated into DDL or queries.
//!
//! # Modules
//!
//! - [`postgres`] -- Connection pool and configuration
//! - [`archive`] -- Table creation, inserts, and readback
//! - [`error`] -- Shared error type

pub mod archive;
pub mod error;
pub mod postgres;

// Re-export primary types for convenience.
pub use archive::{ArchivedSnapshot, SnapshotArchive};
pub use error::ArchiveError;
pub use postgres::{PostgresConfig, PostgresPool};
