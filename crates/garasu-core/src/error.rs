//! Error taxonomy shared by every garasu crate.
//!
//! Errors fall into four families that callers treat differently:
//!
//! - **Configuration**: raised while entity types are declared or the schema is
//!   finalized. Always fatal; startup aborts.
//! - **Unserializable**: an entity graph contains a value the serialization
//!   engine cannot introspect. Fatal for the unit of work.
//! - **TransientStorage**: connection loss, lock or serialization conflicts.
//!   The transaction coordinator retries these a bounded number of times.
//! - **Integrity**: constraint violations (duplicate surrogate key, slug
//!   collision). Surfaced to the caller, never retried.

use thiserror::Error;

/// The error type for all garasu operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// Schema declaration or finalization failed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A related value does not implement the serialization capability.
    #[error("value of field '{field}' on {entity} is not serializable: {detail}")]
    Unserializable {
        /// Entity that owns the field.
        entity: String,
        /// Field being serialized.
        field: String,
        /// What was found instead of a serializable entity.
        detail: String,
    },

    /// Retryable storage failure.
    #[error("transient storage error: {0}")]
    TransientStorage(String),

    /// Constraint violation reported by storage.
    #[error("integrity error on {table}: {message}")]
    Integrity {
        /// Table whose constraint was violated.
        table: String,
        /// Constraint description.
        message: String,
    },

    /// Non-retryable storage failure (missing table, engine closed, ...).
    #[error("storage error: {0}")]
    Storage(String),

    /// A row could not be converted into the requested type.
    #[error("type error: {0}")]
    Type(String),
}

impl Error {
    /// Build a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Build an integrity error for `table`.
    pub fn integrity(table: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Integrity {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Build a type conversion error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::Type(message.into())
    }

    /// Whether the transaction coordinator may retry the unit of work.
    ///
    /// Integrity errors are deliberately not retryable: replaying the same
    /// work would reuse the same generated identifiers and fail identically.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientStorage(_))
    }

    /// Whether this error belongs to the startup/configuration phase.
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;
