//! Platform error type
//!
//! Every service operation reports failures as a [`ServiceError`]. Callers
//! that need to tell failures apart (a duplicate like is harmless, a
//! permission failure is not) match on the variant or on [`ServiceError::code`].

use crate::storage::StorageError;

/// Error types for platform operations
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Invalid input
    #[error("Validation error: {0}")]
    Validation(String),

    /// No valid session
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// The caller does not own the row
    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// The row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected the write
    #[error("Duplicate key: {0}")]
    Conflict(String),

    /// Object storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
}

impl ServiceError {
    /// Stable error code in the style of the hosted platform
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "22023",
            Self::Unauthenticated(_) => "PGRST301",
            Self::Forbidden(_) => "42501",
            Self::NotFound(_) => "PGRST116",
            Self::Conflict(_) => "23505",
            Self::Storage(_) => "STORAGE",
            Self::Internal(_) => "XX000",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        let db_error = err
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error());

        match db_error {
            Some(e) if e.is_unique_violation() => Self::Conflict(e.message().to_string()),
            Some(e) if e.is_foreign_key_violation() => {
                Self::NotFound(format!("Referenced row does not exist: {}", e.message()))
            }
            _ => Self::Internal(err),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AlreadyExists { .. } => Self::Conflict(err.to_string()),
            StorageError::NotFound { .. } => Self::NotFound(err.to_string()),
            StorageError::InvalidType(_)
            | StorageError::TooLarge { .. }
            | StorageError::InvalidKey(_) => Self::Validation(err.to_string()),
            StorageError::Io(_) => Self::Storage(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(ServiceError::Conflict("x".into()).code(), "23505");
        assert_eq!(ServiceError::Forbidden("x".into()).code(), "42501");
        assert_eq!(ServiceError::NotFound("x".into()).code(), "PGRST116");
    }

    #[test]
    fn test_storage_error_mapping() {
        let conflict: ServiceError = StorageError::AlreadyExists {
            bucket: "avatars".into(),
            key: "a.png".into(),
        }
        .into();
        assert!(conflict.is_conflict());

        let invalid: ServiceError = StorageError::InvalidType("text/plain".into()).into();
        assert!(matches!(invalid, ServiceError::Validation(_)));
    }

    #[test]
    fn test_plain_anyhow_is_internal() {
        let err: ServiceError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, ServiceError::Internal(_)));
        assert_eq!(err.code(), "XX000");
    }
}
