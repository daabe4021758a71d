//! Activation tokens and invitations

use crate::identity::{compute_token_hash, Timestamp, UserId};
use std::fmt;

/// Plaintext activation token.
///
/// Lives only long enough to be embedded in the outbound activation link.
/// Stores receive the [`TokenHash`] instead.
#[derive(Clone, PartialEq, Eq)]
pub struct ActivationToken(String);

impl ActivationToken {
    /// 32 random bytes, hex encoded.
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self(hex::encode(bytes))
    }

    /// Wrap a token presented by a client.
    pub fn from_presented(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn hash(&self) -> TokenHash {
        TokenHash(compute_token_hash(&self.0))
    }

    /// Plaintext, for building the activation URL.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ActivationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActivationToken([REDACTED])")
    }
}

/// Lowercase hex SHA-256 of an activation token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenHash(String);

impl TokenHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Invitation to insert alongside a new user, in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvitation {
    pub token_hash: TokenHash,
    pub expires_at: Timestamp,
}

/// Invitation row created with every new user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub token_hash: TokenHash,
    pub user_id: UserId,
    pub expires_at: Timestamp,
}

impl Invitation {
    pub fn is_live_at(&self, now: Timestamp) -> bool {
        self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_generated_tokens_are_unique_hex() {
        let a = ActivationToken::generate();
        let b = ActivationToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.expose().len(), 64);
        assert!(a.expose().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_differs_from_plaintext() {
        let token = ActivationToken::generate();
        let hash = token.hash();
        assert_ne!(hash.as_str(), token.expose());
        assert_eq!(hash, ActivationToken::from_presented(token.expose()).hash());
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = ActivationToken::from_presented("abc123");
        assert!(!format!("{:?}", token).contains("abc123"));
    }

    #[test]
    fn test_invitation_liveness() {
        let now = Utc::now();
        let invitation = Invitation {
            token_hash: ActivationToken::generate().hash(),
            user_id: 1,
            expires_at: now + Duration::seconds(10),
        };
        assert!(invitation.is_live_at(now));
        assert!(!invitation.is_live_at(now + Duration::seconds(10)));
    }
}
