//! Comments on posts

use crate::identity::{CommentId, PostId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Public face of a comment's author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub id: UserId,
    pub username: String,
}

/// A comment, newest first when listed for a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub user_id: UserId,
    pub content: String,
    pub created_at: Timestamp,
    pub user: CommentAuthor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub post_id: PostId,
    pub user_id: UserId,
    pub content: String,
}
