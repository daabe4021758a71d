//! Password credential value type.
//!
//! A `Password` only ever holds an argon2 PHC string. Plaintext goes in
//! through [`Password::set_from_plaintext`] and is dropped as soon as the
//! hash is derived; the only way to use it afterwards is [`Password::verify`].

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use std::fmt;
use thiserror::Error;

/// Errors from deriving a password hash.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("Failed to encode password salt: {0}")]
    Salt(String),

    #[error("Failed to hash password: {0}")]
    Hash(String),
}

/// Opaque password credential.
///
/// `Default` is the empty credential: it has no hash and verifies nothing.
/// Users rehydrated from the identity cache carry this value, since hashes
/// are never written to the cache.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Password {
    hash: Option<String>,
}

impl Password {
    /// Hash `plaintext` into a new credential.
    pub fn from_plaintext(plaintext: &str) -> Result<Self, PasswordError> {
        let mut password = Self::default();
        password.set_from_plaintext(plaintext)?;
        Ok(password)
    }

    /// Wrap a PHC string loaded from the relational store.
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self {
            hash: Some(hash.into()),
        }
    }

    /// Replace the credential with a fresh salted hash of `plaintext`.
    pub fn set_from_plaintext(&mut self, plaintext: &str) -> Result<(), PasswordError> {
        let salt_bytes: [u8; 16] = rand::random();
        let salt =
            SaltString::encode_b64(&salt_bytes).map_err(|e| PasswordError::Salt(e.to_string()))?;
        let phc = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hash(e.to_string()))?
            .to_string();
        self.hash = Some(phc);
        Ok(())
    }

    /// Check a candidate plaintext against the stored hash.
    pub fn verify(&self, candidate: &str) -> bool {
        let Some(hash) = self.hash.as_deref() else {
            return false;
        };
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(candidate.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// The PHC string, for persistence only.
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    pub fn is_set(&self) -> bool {
        self.hash.is_some()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_set() { "[REDACTED]" } else { "[UNSET]" };
        f.debug_struct("Password").field("hash", &state).finish()
    }
}
