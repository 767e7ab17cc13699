//! Registry error types

use robofleet_core::TransitionError;
use thiserror::Error;

/// Errors that can occur in registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Conflicting update on {entity} {id}: {reason}")]
    Conflict {
        entity: &'static str,
        id: String,
        reason: String,
    },

    #[error("Corrupt {entity} record {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: String,
        reason: String,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Invalid record: {0}")]
    Validation(String),
}

impl RegistryError {
    pub(crate) fn robot_not_found(id: impl ToString) -> Self {
        RegistryError::NotFound {
            entity: "Robot",
            id: id.to_string(),
        }
    }

    pub(crate) fn mission_not_found(id: impl ToString) -> Self {
        RegistryError::NotFound {
            entity: "Mission",
            id: id.to_string(),
        }
    }

    /// True for unique-constraint violations reported by SQLite
    pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

impl From<robofleet_core::Error> for RegistryError {
    fn from(err: robofleet_core::Error) -> Self {
        match err {
            robofleet_core::Error::NotFound { entity, id } => RegistryError::NotFound { entity, id },
            robofleet_core::Error::InvalidTransition(e) => RegistryError::Transition(e),
            robofleet_core::Error::Io(e) => RegistryError::Io(e),
            robofleet_core::Error::Validation(msg) => RegistryError::Validation(msg),
            other => RegistryError::Validation(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
