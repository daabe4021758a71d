//! Error types for Agora storage and configuration

use crate::identity::{PostId, UserId};
use thiserror::Error;

/// Which unique constraint a write violated.
///
/// Stores report this from a structured constraint signal (the constraint
/// name attached to the backend error), never from error message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniqueConstraint {
    /// `users_email_key`
    UserEmail,
    /// `users_username_key`
    UserUsername,
    /// `followers_pkey`: the follow already exists.
    Follow,
    /// Any other unique constraint, by name.
    Other(String),
}

impl UniqueConstraint {
    pub const USER_EMAIL_KEY: &'static str = "users_email_key";
    pub const USER_USERNAME_KEY: &'static str = "users_username_key";
    pub const FOLLOWERS_PKEY: &'static str = "followers_pkey";

    /// Classify a constraint by its schema name.
    pub fn from_name(name: &str) -> Self {
        match name {
            Self::USER_EMAIL_KEY => Self::UserEmail,
            Self::USER_USERNAME_KEY => Self::UserUsername,
            Self::FOLLOWERS_PKEY => Self::Follow,
            other => Self::Other(other.to_string()),
        }
    }

    /// The schema name of this constraint.
    pub fn name(&self) -> &str {
        match self {
            Self::UserEmail => Self::USER_EMAIL_KEY,
            Self::UserUsername => Self::USER_USERNAME_KEY,
            Self::Follow => Self::FOLLOWERS_PKEY,
            Self::Other(name) => name,
        }
    }
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Unique constraint violated: {}", constraint.name())]
    UniqueViolation { constraint: UniqueConstraint },

    #[error("Post {id} is no longer at version {expected}")]
    VersionConflict { id: PostId, expected: i32 },

    #[error("Storage operation '{operation}' timed out")]
    Timeout { operation: String },

    #[error("Storage backend error: {reason}")]
    Backend { reason: String },
}

impl StorageError {
    pub fn user_not_found(id: UserId) -> Self {
        Self::NotFound {
            entity: "User",
            id: id.to_string(),
        }
    }

    pub fn post_not_found(id: PostId) -> Self {
        Self::NotFound {
            entity: "Post",
            id: id.to_string(),
        }
    }

    /// `follower` does not follow `followee`.
    pub fn follow_not_found(follower: UserId, followee: UserId) -> Self {
        Self::NotFound {
            entity: "Follow",
            id: format!("{}->{}", follower, followee),
        }
    }

    /// No live invitation matches the presented token. Wrong and expired
    /// tokens are deliberately reported the same way.
    pub fn invitation_not_found() -> Self {
        Self::NotFound {
            entity: "Invitation",
            id: "<token>".to_string(),
        }
    }

    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_constraint_from_name() {
        assert_eq!(
            UniqueConstraint::from_name("users_email_key"),
            UniqueConstraint::UserEmail
        );
        assert_eq!(
            UniqueConstraint::from_name("users_username_key"),
            UniqueConstraint::UserUsername
        );
        assert_eq!(
            UniqueConstraint::from_name("posts_pkey"),
            UniqueConstraint::Other("posts_pkey".to_string())
        );
    }

    #[test]
    fn test_unique_constraint_name_roundtrip() {
        for name in [
            "users_email_key",
            "users_username_key",
            "followers_pkey",
            "x_key",
        ] {
            assert_eq!(UniqueConstraint::from_name(name).name(), name);
        }
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::user_not_found(42);
        assert_eq!(err.to_string(), "User with id 42 not found");

        let err = StorageError::UniqueViolation {
            constraint: UniqueConstraint::UserEmail,
        };
        assert!(err.to_string().contains("users_email_key"));

        let err = StorageError::VersionConflict { id: 5, expected: 1 };
        assert!(err.to_string().contains("version 1"));
    }

    #[test]
    fn test_invitation_not_found_hides_token() {
        let msg = StorageError::invitation_not_found().to_string();
        assert!(msg.contains("Invitation"));
        assert!(msg.contains("<token>"));
    }
}
