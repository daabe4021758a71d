//! User accounts and roles

use crate::identity::{RoleId, Timestamp, UserId};
use crate::password::Password;
use serde::{Deserialize, Serialize};

/// Account role. Levels are ordered: a higher level may act on content
/// owned by anyone at a lower level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    /// Role assigned on registration.
    pub const DEFAULT: Role = Role::User;

    pub fn from_id(id: RoleId) -> Option<Self> {
        match id {
            1 => Some(Self::User),
            2 => Some(Self::Moderator),
            3 => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn id(self) -> RoleId {
        match self {
            Self::User => 1,
            Self::Moderator => 2,
            Self::Admin => 3,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Self::User => 1,
            Self::Moderator => 2,
            Self::Admin => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }
}

/// A registered account.
///
/// The password hash is never serialized: JSON responses and cache
/// snapshots both go through serde and must not carry it. A user read back
/// from the identity cache therefore has an unset `password` and compares
/// unequal to the same user loaded from the store. Credential checks only
/// use users loaded straight from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub is_active: bool,
    pub role_id: RoleId,
    pub created_at: Timestamp,
}

impl User {
    /// Resolved role, falling back to the least privileged one for unknown ids.
    pub fn role(&self) -> Role {
        Role::from_id(self.role_id).unwrap_or(Role::DEFAULT)
    }
}

/// Insert payload for a new account. Accounts are always created inactive.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: Password,
    pub role_id: RoleId,
}

impl NewUser {
    pub fn new(username: impl Into<String>, email: impl Into<String>, password: Password) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password,
            role_id: Role::DEFAULT.id(),
        }
    }
}
