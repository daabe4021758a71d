//! Request and response bodies for the REST surface.

use agora_core::{Comment, FeedQuery, FeedSort, Post, PostChanges, User};
use serde::{Deserialize, Serialize};

use crate::constants::{
    MAX_COMMENT_CONTENT_LEN, MAX_EMAIL_LEN, MAX_FEED_LIMIT, MAX_FEED_SEARCH_LEN, MAX_FEED_TAGS,
    MAX_PASSWORD_LEN, MAX_POST_CONTENT_LEN, MAX_POST_TITLE_LEN, MAX_USERNAME_LEN,
    MIN_PASSWORD_LEN,
};
use crate::error::{ApiError, ApiResult};
use crate::validation::{validate_email, HasUpdates, ValidateLength, ValidateNonEmpty};

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// POST /v1/authentication/user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterUserRequest {
    pub fn validate(&self) -> ApiResult<()> {
        self.username.validate_non_empty("username")?;
        self.username.validate_max_len("username", MAX_USERNAME_LEN)?;
        validate_email(&self.email, MAX_EMAIL_LEN)?;
        self.password
            .validate_len_between("password", MIN_PASSWORD_LEN, MAX_PASSWORD_LEN)
    }
}

/// The new user plus the plaintext activation token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    #[serde(flatten)]
    pub user: User,
    pub token: String,
}

/// POST /v1/authentication/token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTokenRequest {
    pub email: String,
    pub password: String,
}

impl CreateTokenRequest {
    pub fn validate(&self) -> ApiResult<()> {
        validate_email(&self.email, MAX_EMAIL_LEN)?;
        self.password
            .validate_len_between("password", MIN_PASSWORD_LEN, MAX_PASSWORD_LEN)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

// ============================================================================
// POSTS
// ============================================================================

/// POST /v1/posts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreatePostRequest {
    pub fn validate(&self) -> ApiResult<()> {
        self.title.validate_non_empty("title")?;
        self.title.validate_max_len("title", MAX_POST_TITLE_LEN)?;
        self.content.validate_non_empty("content")?;
        self.content.validate_max_len("content", MAX_POST_CONTENT_LEN)
    }
}

/// PATCH /v1/posts/:id
///
/// `version` is the version the client last read; the write only lands if
/// it is still current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePostRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    pub version: i32,
}

impl HasUpdates for UpdatePostRequest {
    fn has_any_updates(&self) -> bool {
        self.title.is_some() || self.content.is_some()
    }
}

impl UpdatePostRequest {
    pub fn validate(&self) -> ApiResult<()> {
        self.validate_has_updates()?;
        if let Some(title) = &self.title {
            title.validate_non_empty("title")?;
            title.validate_max_len("title", MAX_POST_TITLE_LEN)?;
        }
        if let Some(content) = &self.content {
            content.validate_non_empty("content")?;
            content.validate_max_len("content", MAX_POST_CONTENT_LEN)?;
        }
        Ok(())
    }

    pub fn changes(&self) -> PostChanges {
        PostChanges {
            title: self.title.clone(),
            content: self.content.clone(),
        }
    }
}

/// GET /v1/posts/:id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostWithComments {
    #[serde(flatten)]
    pub post: Post,
    pub comments: Vec<Comment>,
}

/// POST /v1/posts/:id/comments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

impl CreateCommentRequest {
    pub fn validate(&self) -> ApiResult<()> {
        self.content.validate_non_empty("content")?;
        self.content.validate_max_len("content", MAX_COMMENT_CONTENT_LEN)
    }
}

// ============================================================================
// FEED
// ============================================================================

/// GET /v1/users/feed query string. `tags` is comma-separated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort: Option<String>,
    pub search: Option<String>,
    pub tags: Option<String>,
}

impl FeedParams {
    /// Bounds-check the raw parameters and fill in defaults.
    pub fn into_query(self) -> ApiResult<FeedQuery> {
        let limit = self.limit.unwrap_or(FeedQuery::DEFAULT_LIMIT);
        if !(1..=MAX_FEED_LIMIT).contains(&limit) {
            return Err(ApiError::validation_failed(format!(
                "Field 'limit' must be between 1 and {}",
                MAX_FEED_LIMIT
            )));
        }
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(ApiError::validation_failed("Field 'offset' must not be negative"));
        }
        let sort = match self.sort.as_deref() {
            Some(raw) => raw.parse::<FeedSort>().map_err(|_| {
                ApiError::validation_failed("Field 'sort' must be 'asc' or 'desc'")
            })?,
            None => FeedSort::default(),
        };

        let search = self
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(search) = &search {
            search.validate_max_len("search", MAX_FEED_SEARCH_LEN)?;
        }

        let tags: Vec<String> = self
            .tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        if tags.len() > MAX_FEED_TAGS {
            return Err(ApiError::validation_failed(format!(
                "At most {} tags may be given",
                MAX_FEED_TAGS
            )));
        }

        Ok(FeedQuery {
            limit,
            offset,
            sort,
            search,
            tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn register(username: &str, email: &str, password: &str) -> RegisterUserRequest {
        RegisterUserRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_register_limits() {
        assert!(register("ada", "ada@example.com", "pw1").validate().is_ok());
        assert!(register(&"u".repeat(100), "ada@example.com", "pw1").validate().is_ok());

        let err = register(&"u".repeat(101), "ada@example.com", "pw1")
            .validate()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);

        assert!(register("ada", "not-an-email", "pw1").validate().is_err());
        assert!(register("ada", "ada@example.com", "pw").validate().is_err());
        assert!(register("ada", "ada@example.com", &"p".repeat(73)).validate().is_err());
        assert!(register("ada", "ada@example.com", &"p".repeat(72)).validate().is_ok());

        let err = register("  ", "ada@example.com", "pw1").validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingField);
    }

    #[test]
    fn test_post_limits() {
        let ok = CreatePostRequest {
            title: "t".repeat(100),
            content: "c".repeat(1000),
            tags: vec![],
        };
        assert!(ok.validate().is_ok());

        let long_content = CreatePostRequest {
            content: "c".repeat(1001),
            ..ok.clone()
        };
        assert!(long_content.validate().is_err());
    }

    #[test]
    fn test_update_requires_a_field() {
        let empty = UpdatePostRequest {
            title: None,
            content: None,
            version: 1,
        };
        assert_eq!(empty.validate().unwrap_err().code, ErrorCode::InvalidInput);

        let title_only = UpdatePostRequest {
            title: Some("new".to_string()),
            content: None,
            version: 1,
        };
        assert!(title_only.validate().is_ok());
        assert_eq!(
            title_only.changes(),
            PostChanges {
                title: Some("new".to_string()),
                content: None,
            }
        );
    }

    #[test]
    fn test_feed_params_defaults() {
        let query = FeedParams::default().into_query().expect("defaults");
        assert_eq!(query, FeedQuery::default());
    }

    #[test]
    fn test_feed_params_parse_and_bounds() {
        let query = FeedParams {
            limit: Some(5),
            offset: Some(10),
            sort: Some("asc".to_string()),
            search: Some("  rust ".to_string()),
            tags: Some("db, rust,,".to_string()),
        }
        .into_query()
        .expect("valid");
        assert_eq!(query.limit, 5);
        assert_eq!(query.offset, 10);
        assert_eq!(query.sort, FeedSort::Asc);
        assert_eq!(query.search.as_deref(), Some("rust"));
        assert_eq!(query.tags, vec!["db".to_string(), "rust".to_string()]);

        for bad in [
            FeedParams { limit: Some(0), ..FeedParams::default() },
            FeedParams { limit: Some(21), ..FeedParams::default() },
            FeedParams { offset: Some(-1), ..FeedParams::default() },
            FeedParams { sort: Some("newest".to_string()), ..FeedParams::default() },
            FeedParams { search: Some("s".repeat(101)), ..FeedParams::default() },
            FeedParams { tags: Some("a,b,c,d,e,f".to_string()), ..FeedParams::default() },
        ] {
            let err = bad.clone().into_query().unwrap_err();
            assert_eq!(err.code, ErrorCode::ValidationFailed, "{:?}", bad);
        }
    }

    #[test]
    fn test_post_with_comments_flattens_post() {
        let now = chrono::Utc::now();
        let body = PostWithComments {
            post: Post {
                id: 3,
                title: "t".to_string(),
                content: "c".to_string(),
                user_id: 1,
                tags: vec![],
                version: 1,
                created_at: now,
                updated_at: now,
            },
            comments: vec![],
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["id"], 3);
        assert_eq!(json["version"], 1);
        assert!(json["comments"].as_array().is_some_and(|c| c.is_empty()));
    }

    #[test]
    fn test_comment_limits() {
        let ok = CreateCommentRequest {
            content: "c".repeat(1000),
        };
        assert!(ok.validate().is_ok());
        let too_long = CreateCommentRequest {
            content: "c".repeat(1001),
        };
        assert!(too_long.validate().is_err());
        let blank = CreateCommentRequest {
            content: " ".to_string(),
        };
        assert_eq!(blank.validate().unwrap_err().code, ErrorCode::MissingField);
    }

    #[test]
    fn test_update_version_is_required() {
        let parsed: Result<UpdatePostRequest, _> = serde_json::from_str(r#"{"title":"x"}"#);
        assert!(parsed.is_err());
    }
}
