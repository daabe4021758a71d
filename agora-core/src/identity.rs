//! Identity types for Agora entities

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// User identifier (BIGSERIAL in the relational store).
pub type UserId = i64;

/// Post identifier (BIGSERIAL in the relational store).
pub type PostId = i64;

/// Comment identifier (BIGSERIAL in the relational store).
pub type CommentId = i64;

/// Role identifier, see [`crate::Role`].
pub type RoleId = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Compute the lowercase hex SHA-256 digest of a token.
///
/// This is the only form in which activation tokens are ever persisted or
/// compared.
pub fn compute_token_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
