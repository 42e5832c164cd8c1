//! Error type for the store layer.
//!
//! Diesel errors are folded into [`StoreError`] so callers can tell a rejected
//! write (a constraint violation, never worth retrying) from a missing row or an
//! infrastructure failure.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use std::fmt;

use crate::models::RecordId;

/// Which integrity rule rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Duplicate key, e.g. a second `DebugResult` for one message.
    Unique,
    /// Reference to a session or message that does not exist.
    ForeignKey,
    /// Required column left empty.
    NotNull,
    /// Length limit or JSON validity check.
    Check,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not null",
            ConstraintKind::Check => "check",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("error connecting to {url}")]
    Connection {
        url: String,
        #[source]
        source: diesel::ConnectionError,
    },

    #[error("migration failed: {0}")]
    Migration(Box<dyn std::error::Error + Send + Sync>),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: RecordId },

    #[error("message {id} has role {role:?}; only assistant messages carry a debug result")]
    RoleMismatch { id: RecordId, role: String },

    #[error("{kind} constraint violated: {message}")]
    Constraint {
        kind: ConstraintKind,
        message: String,
    },

    #[error(transparent)]
    Database(DieselError),
}

impl StoreError {
    /// `true` when the write was rejected by the schema; retrying it will fail
    /// the same way.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::Constraint { .. })
    }

    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            StoreError::Constraint { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(kind, info) => {
                let kind = match kind {
                    DatabaseErrorKind::UniqueViolation => ConstraintKind::Unique,
                    DatabaseErrorKind::ForeignKeyViolation => ConstraintKind::ForeignKey,
                    DatabaseErrorKind::NotNullViolation => ConstraintKind::NotNull,
                    DatabaseErrorKind::CheckViolation => ConstraintKind::Check,
                    other => return StoreError::Database(DieselError::DatabaseError(other, info)),
                };
                StoreError::Constraint {
                    kind,
                    message: info.message().to_string(),
                }
            }
            other => StoreError::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_not_a_constraint() {
        let err = StoreError::from(DieselError::NotFound);
        assert!(matches!(err, StoreError::Database(DieselError::NotFound)));
        assert!(!err.is_constraint_violation());
        assert_eq!(err.constraint_kind(), None);
    }

    #[test]
    fn test_constraint_display() {
        let err = StoreError::Constraint {
            kind: ConstraintKind::ForeignKey,
            message: "FOREIGN KEY constraint failed".to_string(),
        };
        assert!(err.is_constraint_violation());
        assert_eq!(
            err.to_string(),
            "foreign key constraint violated: FOREIGN KEY constraint failed"
        );
    }
}
