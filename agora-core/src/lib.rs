//! Agora Core - Domain Types
//!
//! Plain data structures and value types shared by every other crate:
//! users and their credentials, invitations, posts, comments, feed
//! queries, the storage error taxonomy and the outbound mail seam. No I/O
//! happens here.

pub mod comment;
pub mod error;
pub mod feed;
pub mod identity;
pub mod invitation;
pub mod mail;
pub mod password;
pub mod post;
pub mod user;

pub use comment::{Comment, CommentAuthor, NewComment};
pub use error::{ConfigError, StorageError, StorageResult, UniqueConstraint};
pub use feed::{FeedItem, FeedQuery, FeedSort};
pub use identity::{compute_token_hash, CommentId, PostId, RoleId, Timestamp, UserId};
pub use invitation::{ActivationToken, Invitation, NewInvitation, TokenHash};
pub use mail::{MailError, MailTemplate, Mailer, OutboundMail};
pub use password::{Password, PasswordError};
pub use post::{NewPost, Post, PostChanges, INITIAL_POST_VERSION};
pub use user::{NewUser, Role, User};
