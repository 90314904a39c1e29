//! Error types for the archival layer.
//!
//! All errors are propagated via [`ArchiveError`], which wraps the
//! underlying [`sqlx`] errors with additional context about which
//! operation failed.

/// Errors that can occur in the archival layer.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
