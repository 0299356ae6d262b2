use crate::model::Id;
use thiserror::Error;

/// Failure reported by a backing store (document store, ledger, counters)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// Unreachable, timed out, or the pool is exhausted
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected a write or returned something unreadable
    #[error("store rejected operation: {0}")]
    Persist(String),

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23505") => {
                StoreError::UniqueViolation {
                    constraint: db.constraint().unwrap_or_default().to_string(),
                }
            }
            other => StoreError::Persist(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Persist(format!("document (de)serialization failed: {}", err))
    }
}

/// Failure reported by the object storage capability
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("object storage unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

/// Error categories surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    PayloadTooLarge,
    Unauthorized,
    Forbidden,
    StoreUnavailable,
    Persist,
    PartialFailure,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProdhubError {
    // ============================================================================
    // Not found
    // ============================================================================
    #[error("Owner not found: {0}")]
    OwnerNotFound(Id),

    #[error("User not found: {0}")]
    UserNotFound(Id),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(Id),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    // ============================================================================
    // Conflicts and rule violations
    // ============================================================================
    #[error("Branch '{0}' already exists")]
    DuplicateBranchName(String),

    #[error("Branch '{0}' is protected and cannot be deleted")]
    ProtectedBranch(String),

    #[error("User with email '{0}' already exists")]
    DuplicateEmail(String),

    #[error("User with username '{0}' already exists")]
    DuplicateUsername(String),

    #[error("Repository {0} is already liked")]
    AlreadyLiked(Id),

    #[error("Repository {0} is not in the liked list")]
    NotLiked(Id),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Request body exceeds the upload limit")]
    PayloadTooLarge,

    // ============================================================================
    // Identity
    // ============================================================================
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Missing caller identity")]
    Unauthenticated,

    #[error("Access denied: {0}")]
    Forbidden(String),

    // ============================================================================
    // Backing stores
    // ============================================================================
    #[error("Identifier counter unavailable: {0}")]
    CounterUnavailable(String),

    #[error("Store unavailable during {step}: {message}")]
    StoreUnavailable { step: &'static str, message: String },

    #[error("Object storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Store rejected {step}: {message}")]
    Persist { step: &'static str, message: String },

    /// The original failure stands, but undoing earlier steps also failed
    #[error("{source} (compensation failed: {compensation_error})")]
    Partial {
        source: Box<ProdhubError>,
        compensation_error: String,
    },
}

pub type ProdhubResult<T> = Result<T, ProdhubError>;

impl ProdhubError {
    /// Maps a store failure during `step` onto the domain taxonomy
    pub fn from_store(step: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(message) => ProdhubError::StoreUnavailable { step, message },
            StoreError::Persist(message) => ProdhubError::Persist { step, message },
            StoreError::UniqueViolation { constraint } => ProdhubError::Persist {
                step,
                message: format!("unique constraint violated: {}", constraint),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProdhubError::OwnerNotFound(_)
            | ProdhubError::UserNotFound(_)
            | ProdhubError::RepositoryNotFound(_)
            | ProdhubError::BranchNotFound(_) => ErrorKind::NotFound,
            ProdhubError::DuplicateBranchName(_)
            | ProdhubError::DuplicateEmail(_)
            | ProdhubError::DuplicateUsername(_)
            | ProdhubError::AlreadyLiked(_) => ErrorKind::Conflict,
            ProdhubError::ProtectedBranch(_)
            | ProdhubError::NotLiked(_)
            | ProdhubError::Validation(_) => ErrorKind::Validation,
            ProdhubError::PayloadTooLarge => ErrorKind::PayloadTooLarge,
            ProdhubError::InvalidCredentials | ProdhubError::Unauthenticated => {
                ErrorKind::Unauthorized
            }
            ProdhubError::Forbidden(_) => ErrorKind::Forbidden,
            ProdhubError::CounterUnavailable(_)
            | ProdhubError::StoreUnavailable { .. }
            | ProdhubError::StorageUnavailable(_) => ErrorKind::StoreUnavailable,
            ProdhubError::Persist { .. } => ErrorKind::Persist,
            ProdhubError::Partial { .. } => ErrorKind::PartialFailure,
        }
    }

    /// Stable machine-readable code. A partial failure keeps the code of
    /// the failure that started it.
    pub fn code(&self) -> &'static str {
        match self {
            ProdhubError::OwnerNotFound(_) => "OWNER_NOT_FOUND",
            ProdhubError::UserNotFound(_) => "USER_NOT_FOUND",
            ProdhubError::RepositoryNotFound(_) => "REPOSITORY_NOT_FOUND",
            ProdhubError::BranchNotFound(_) => "BRANCH_NOT_FOUND",
            ProdhubError::DuplicateBranchName(_) => "DUPLICATE_BRANCH_NAME",
            ProdhubError::ProtectedBranch(_) => "PROTECTED_BRANCH",
            ProdhubError::DuplicateEmail(_) => "DUPLICATE_EMAIL",
            ProdhubError::DuplicateUsername(_) => "DUPLICATE_USERNAME",
            ProdhubError::AlreadyLiked(_) => "ALREADY_LIKED",
            ProdhubError::NotLiked(_) => "NOT_LIKED",
            ProdhubError::Validation(_) => "VALIDATION_ERROR",
            ProdhubError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ProdhubError::InvalidCredentials => "INVALID_CREDENTIALS",
            ProdhubError::Unauthenticated => "UNAUTHENTICATED",
            ProdhubError::Forbidden(_) => "FORBIDDEN",
            ProdhubError::CounterUnavailable(_) => "COUNTER_UNAVAILABLE",
            ProdhubError::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            ProdhubError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            ProdhubError::Persist { .. } => "PERSIST_ERROR",
            ProdhubError::Partial { source, .. } => source.code(),
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, ProdhubError::Partial { .. })
    }

    /// The failure that started the operation's unwinding
    pub fn root(&self) -> &ProdhubError {
        match self {
            ProdhubError::Partial { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<StorageError> for ProdhubError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(message) => ProdhubError::StorageUnavailable(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_step_annotated_domain_errors() {
        let err = ProdhubError::from_store(
            "ledger update",
            StoreError::Unavailable("connection refused".to_string()),
        );
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert!(err.to_string().contains("ledger update"));

        let err = ProdhubError::from_store(
            "repository insert",
            StoreError::Persist("document too large".to_string()),
        );
        assert_eq!(err.code(), "PERSIST_ERROR");
    }

    #[test]
    fn test_partial_failure_keeps_original_code() {
        let original = ProdhubError::from_store(
            "ledger update",
            StoreError::Unavailable("timeout".to_string()),
        );
        let partial = ProdhubError::Partial {
            source: Box::new(original.clone()),
            compensation_error: "delete repository 4: store unavailable".to_string(),
        };

        assert_eq!(partial.code(), "STORE_UNAVAILABLE");
        assert_eq!(partial.kind(), ErrorKind::PartialFailure);
        assert!(partial.is_partial());
        assert_eq!(partial.root(), &original);
        assert!(partial.to_string().contains("compensation failed"));
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: ProdhubError = StorageError::Unavailable("bucket missing".to_string()).into();
        assert_eq!(err.code(), "STORAGE_UNAVAILABLE");
    }
}
