//! Error types for the ORM engine
//!
//! Three error families matter to callers: a missing row on a strict
//! primary-key lookup, a failed SQL statement, and programmer-level
//! misconfiguration. Hook vetoes are not errors; they surface as a
//! `false` result from the operation that was declined.

/// Result type alias for ORM operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error taxonomy for ORM operations
#[derive(Debug, thiserror::Error)]
pub enum OrmError {
    /// A strict single-row lookup found no row
    #[error("record not found for model '{model}'")]
    NotFound { model: String },

    /// Statement preparation or execution failed; carries the literal SQL
    /// with bind values substituted for diagnostics
    #[error("SQL execution failed: {message} (query: {sql})")]
    Sql { message: String, sql: String },

    /// Programmer-level misuse: unset primary key, unknown association,
    /// missing primary key definition in metadata
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transaction begin/commit/rollback failure
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Row-to-value or value-to-row conversion failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Driver-level failure raised by an adapter before statement context
    /// is available; the engine rewraps this into `Sql` where it can
    #[error("adapter error: {0}")]
    Adapter(#[from] anyhow::Error),
}

impl OrmError {
    /// Configuration error for a missing association, naming both sides.
    pub fn unknown_relation(model: &str, name: &str) -> Self {
        OrmError::Configuration(format!(
            "no association '{}' is defined on model '{}'",
            name, model
        ))
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Serialization(err.to_string())
    }
}
