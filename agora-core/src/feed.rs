//! Feed queries: the posts of a user and of everyone they follow.

use crate::post::Post;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order of feed entries by creation time. Ties break on post id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSort {
    Asc,
    #[default]
    Desc,
}

impl FeedSort {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for FeedSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => f.write_str("asc"),
            Self::Desc => f.write_str("desc"),
        }
    }
}

impl FromStr for FeedSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

/// One page of a feed. Built and bounds-checked by the API layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub limit: i64,
    pub offset: i64,
    pub sort: FeedSort,
    /// Case-insensitive substring of title or content.
    pub search: Option<String>,
    /// A post matches if it carries any of these tags. Empty matches all.
    pub tags: Vec<String>,
}

impl FeedQuery {
    pub const DEFAULT_LIMIT: i64 = 20;

    /// Whether `post` passes the search and tag filters.
    pub fn matches(&self, post: &Post) -> bool {
        let search_ok = match &self.search {
            Some(needle) => {
                let needle = needle.to_lowercase();
                post.title.to_lowercase().contains(&needle)
                    || post.content.to_lowercase().contains(&needle)
            }
            None => true,
        };
        let tags_ok = self.tags.is_empty() || post.tags.iter().any(|t| self.tags.contains(t));
        search_ok && tags_ok
    }
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
            sort: FeedSort::default(),
            search: None,
            tags: Vec::new(),
        }
    }
}

/// A feed entry: the post, its author's name and how many comments it has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub post: Post,
    pub username: String,
    pub comments_count: i64,
}
