//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, and the
//! `UserStore` / `PostStore` implementations over it. Schema lives in
//! `migrations/`, applied in file order.

use agora_core::{
    Comment, CommentAuthor, FeedItem, FeedQuery, NewComment, NewInvitation, NewPost, NewUser,
    Password, Post, PostChanges, PostId, StorageError, StorageResult, Timestamp, TokenHash,
    UniqueConstraint, User, UserId,
};
use agora_storage::{PostStore, UserStore};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

use crate::error::{ApiError, ApiResult};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait and connect timeout for pool checkouts
    pub timeout: Duration,
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("max_size", &self.max_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "agora".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("AGORA_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("AGORA_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("AGORA_DB_NAME").unwrap_or_else(|_| "agora".to_string()),
            user: std::env::var("AGORA_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("AGORA_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("AGORA_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("AGORA_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    ///
    /// Connections are opened lazily on first checkout.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        pool_cfg.timeouts.create = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

/// Classify a driver error. Unique violations are read from the SQLSTATE
/// and constraint name, never from the message text.
fn map_pg_error(operation: &str, err: tokio_postgres::Error) -> StorageError {
    if let Some(db_err) = err.as_db_error() {
        if db_err.code() == &SqlState::UNIQUE_VIOLATION {
            let constraint = UniqueConstraint::from_name(db_err.constraint().unwrap_or_default());
            return StorageError::UniqueViolation { constraint };
        }
    }
    tracing::error!(operation, error = ?err, "Database error");
    StorageError::backend(format!("{} failed", operation))
}

fn is_foreign_key_violation(err: &tokio_postgres::Error) -> bool {
    err.as_db_error()
        .is_some_and(|db_err| db_err.code() == &SqlState::FOREIGN_KEY_VIOLATION)
}

fn map_pool_error(err: deadpool_postgres::PoolError) -> StorageError {
    tracing::error!(error = ?err, "Connection pool error");
    match err {
        deadpool_postgres::PoolError::Timeout(_) => StorageError::Timeout {
            operation: "pool_checkout".to_string(),
        },
        _ => StorageError::backend("failed to acquire database connection"),
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const MIGRATIONS: &[(&str, &str)] = &[
    ("0001_init", include_str!("../migrations/0001_init.sql")),
    ("0002_social", include_str!("../migrations/0002_social.sql")),
];

const USER_COLUMNS: &str = "id, username, email, password_hash, is_active, role_id, created_at";

const POST_COLUMNS: &str = "id, title, content, user_id, tags, version, created_at, updated_at";

/// Wrap a search term for ILIKE, escaping its own wildcards.
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn user_from_row(row: &Row) -> Result<User, tokio_postgres::Error> {
    let hash: String = row.try_get("password_hash")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password: Password::from_hash(hash),
        is_active: row.try_get("is_active")?,
        role_id: row.try_get("role_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn post_from_row(row: &Row) -> Result<Post, tokio_postgres::Error> {
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        user_id: row.try_get("user_id")?,
        tags: row.try_get("tags")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn comment_from_row(row: &Row) -> Result<Comment, tokio_postgres::Error> {
    let user_id: UserId = row.try_get("user_id")?;
    Ok(Comment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        user_id,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        user: CommentAuthor {
            id: user_id,
            username: row.try_get("username")?,
        },
    })
}

fn feed_item_from_row(row: &Row) -> Result<FeedItem, tokio_postgres::Error> {
    Ok(FeedItem {
        post: post_from_row(row)?,
        username: row.try_get("username")?,
        comments_count: row.try_get("comments_count")?,
    })
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Database client wrapping a connection pool.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl std::fmt::Debug for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("DbClient")
            .field("pool_size", &status.size)
            .field("pool_max_size", &status.max_size)
            .finish()
    }
}

impl DbClient {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> StorageResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(map_pool_error)
    }

    /// Apply the bundled schema. Every statement is idempotent.
    pub async fn apply_migrations(&self) -> StorageResult<()> {
        let conn = self.get_conn().await?;
        for &(name, sql) in MIGRATIONS {
            conn.batch_execute(sql)
                .await
                .map_err(|e| map_pg_error("apply_migrations", e))?;
            tracing::debug!(migration = name, "Migration applied");
        }
        Ok(())
    }

    /// Round-trip check used by the health endpoint.
    pub async fn ping(&self) -> StorageResult<()> {
        let conn = self.get_conn().await?;
        conn.execute("SELECT 1", &[])
            .await
            .map_err(|e| map_pg_error("ping", e))?;
        Ok(())
    }
}

// ============================================================================
// USER STORE
// ============================================================================

#[async_trait]
impl UserStore for DbClient {
    async fn user_insert_with_invitation(
        &self,
        user: &NewUser,
        invitation: &NewInvitation,
    ) -> StorageResult<User> {
        let Some(password_hash) = user.password.hash() else {
            return Err(StorageError::backend("refusing to insert user without password hash"));
        };

        let mut conn = self.get_conn().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| map_pg_error("user_insert_with_invitation", e))?;

        let row = tx
            .query_one(
                &format!(
                    "INSERT INTO users (username, email, password_hash, role_id) \
                     VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
                ),
                &[&user.username, &user.email, &password_hash, &user.role_id],
            )
            .await
            .map_err(|e| map_pg_error("user_insert", e))?;
        let created = user_from_row(&row).map_err(|e| map_pg_error("user_insert", e))?;

        tx.execute(
            "INSERT INTO user_invitations (token_hash, user_id, expiry) VALUES ($1, $2, $3)",
            &[&invitation.token_hash.as_str(), &created.id, &invitation.expires_at],
        )
        .await
        .map_err(|e| map_pg_error("invitation_insert", e))?;

        tx.commit()
            .await
            .map_err(|e| map_pg_error("user_insert_with_invitation", e))?;

        Ok(created)
    }

    async fn user_activate(&self, token_hash: &TokenHash, now: Timestamp) -> StorageResult<User> {
        let mut conn = self.get_conn().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| map_pg_error("user_activate", e))?;

        let consumed = tx
            .query_opt(
                "DELETE FROM user_invitations WHERE token_hash = $1 AND expiry > $2 RETURNING user_id",
                &[&token_hash.as_str(), &now],
            )
            .await
            .map_err(|e| map_pg_error("invitation_consume", e))?;

        // Dropping the transaction rolls it back.
        let Some(consumed) = consumed else {
            return Err(StorageError::invitation_not_found());
        };
        let user_id: UserId = consumed
            .try_get("user_id")
            .map_err(|e| map_pg_error("invitation_consume", e))?;

        let row = tx
            .query_opt(
                &format!("UPDATE users SET is_active = TRUE WHERE id = $1 RETURNING {USER_COLUMNS}"),
                &[&user_id],
            )
            .await
            .map_err(|e| map_pg_error("user_activate", e))?
            .ok_or_else(StorageError::invitation_not_found)?;
        let user = user_from_row(&row).map_err(|e| map_pg_error("user_activate", e))?;

        tx.commit()
            .await
            .map_err(|e| map_pg_error("user_activate", e))?;

        Ok(user)
    }

    async fn user_delete(&self, id: UserId) -> StorageResult<()> {
        let mut conn = self.get_conn().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| map_pg_error("user_delete", e))?;

        tx.execute("DELETE FROM user_invitations WHERE user_id = $1", &[&id])
            .await
            .map_err(|e| map_pg_error("invitation_delete", e))?;
        let deleted = tx
            .execute("DELETE FROM users WHERE id = $1", &[&id])
            .await
            .map_err(|e| map_pg_error("user_delete", e))?;

        if deleted == 0 {
            return Err(StorageError::user_not_found(id));
        }

        tx.commit()
            .await
            .map_err(|e| map_pg_error("user_delete", e))
    }

    async fn user_get(&self, id: UserId) -> StorageResult<Option<User>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"), &[&id])
            .await
            .map_err(|e| map_pg_error("user_get", e))?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_pg_error("user_get", e))
    }

    async fn user_get_active_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND is_active = TRUE"),
                &[&email],
            )
            .await
            .map_err(|e| map_pg_error("user_get_active_by_email", e))?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_pg_error("user_get_active_by_email", e))
    }

    async fn user_get_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"), &[&email])
            .await
            .map_err(|e| map_pg_error("user_get_by_email", e))?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_pg_error("user_get_by_email", e))
    }

    async fn user_follow(&self, follower: UserId, followee: UserId) -> StorageResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO followers (user_id, follower_id) VALUES ($1, $2)",
            &[&followee, &follower],
        )
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StorageError::user_not_found(followee)
            } else {
                map_pg_error("user_follow", e)
            }
        })?;
        Ok(())
    }

    async fn user_unfollow(&self, follower: UserId, followee: UserId) -> StorageResult<()> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute(
                "DELETE FROM followers WHERE user_id = $1 AND follower_id = $2",
                &[&followee, &follower],
            )
            .await
            .map_err(|e| map_pg_error("user_unfollow", e))?;
        if deleted == 0 {
            return Err(StorageError::follow_not_found(follower, followee));
        }
        Ok(())
    }
}

// ============================================================================
// POST STORE
// ============================================================================

#[async_trait]
impl PostStore for DbClient {
    async fn post_insert(&self, post: &NewPost) -> StorageResult<Post> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                &format!(
                    "INSERT INTO posts (title, content, user_id, tags) \
                     VALUES ($1, $2, $3, $4) RETURNING {POST_COLUMNS}"
                ),
                &[&post.title, &post.content, &post.user_id, &post.tags],
            )
            .await
            .map_err(|e| map_pg_error("post_insert", e))?;
        post_from_row(&row).map_err(|e| map_pg_error("post_insert", e))
    }

    async fn post_get(&self, id: PostId) -> StorageResult<Option<Post>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"), &[&id])
            .await
            .map_err(|e| map_pg_error("post_get", e))?;
        row.as_ref()
            .map(post_from_row)
            .transpose()
            .map_err(|e| map_pg_error("post_get", e))
    }

    async fn post_update_versioned(
        &self,
        id: PostId,
        changes: &PostChanges,
        expected_version: i32,
    ) -> StorageResult<i32> {
        let conn = self.get_conn().await?;
        // One statement: the conditional update plus an existence check to
        // tell a stale version from a missing row.
        let row = conn
            .query_one(
                "WITH updated AS ( \
                     UPDATE posts \
                     SET title = COALESCE($3, title), \
                         content = COALESCE($4, content), \
                         version = version + 1, \
                         updated_at = now() \
                     WHERE id = $1 AND version = $2 \
                     RETURNING version \
                 ) \
                 SELECT (SELECT version FROM updated) AS new_version, \
                        EXISTS (SELECT 1 FROM posts WHERE id = $1) AS found",
                &[&id, &expected_version, &changes.title, &changes.content],
            )
            .await
            .map_err(|e| map_pg_error("post_update_versioned", e))?;

        let new_version: Option<i32> = row
            .try_get("new_version")
            .map_err(|e| map_pg_error("post_update_versioned", e))?;
        let found: bool = row
            .try_get("found")
            .map_err(|e| map_pg_error("post_update_versioned", e))?;

        match (new_version, found) {
            (Some(version), _) => Ok(version),
            (None, true) => Err(StorageError::VersionConflict {
                id,
                expected: expected_version,
            }),
            (None, false) => Err(StorageError::post_not_found(id)),
        }
    }

    async fn post_delete(&self, id: PostId) -> StorageResult<()> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM posts WHERE id = $1", &[&id])
            .await
            .map_err(|e| map_pg_error("post_delete", e))?;
        if deleted == 0 {
            return Err(StorageError::post_not_found(id));
        }
        Ok(())
    }

    async fn comment_insert(&self, comment: &NewComment) -> StorageResult<Comment> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                "WITH inserted AS ( \
                     INSERT INTO comments (post_id, user_id, content) \
                     VALUES ($1, $2, $3) \
                     RETURNING id, post_id, user_id, content, created_at \
                 ) \
                 SELECT i.id, i.post_id, i.user_id, i.content, i.created_at, u.username \
                 FROM inserted i JOIN users u ON u.id = i.user_id",
                &[&comment.post_id, &comment.user_id, &comment.content],
            )
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StorageError::post_not_found(comment.post_id)
                } else {
                    map_pg_error("comment_insert", e)
                }
            })?;
        comment_from_row(&row).map_err(|e| map_pg_error("comment_insert", e))
    }

    async fn comments_for_post(&self, post_id: PostId) -> StorageResult<Vec<Comment>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT c.id, c.post_id, c.user_id, c.content, c.created_at, u.username \
                 FROM comments c JOIN users u ON u.id = c.user_id \
                 WHERE c.post_id = $1 \
                 ORDER BY c.created_at DESC, c.id DESC",
                &[&post_id],
            )
            .await
            .map_err(|e| map_pg_error("comments_for_post", e))?;
        rows.iter()
            .map(comment_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_pg_error("comments_for_post", e))
    }

    async fn post_feed(&self, viewer: UserId, query: &FeedQuery) -> StorageResult<Vec<FeedItem>> {
        let conn = self.get_conn().await?;
        let search = query.search.as_deref().map(contains_pattern);
        let order = query.sort.as_sql();
        let rows = conn
            .query(
                &format!(
                    "SELECT p.id, p.title, p.content, p.user_id, p.tags, p.version, \
                            p.created_at, p.updated_at, u.username, \
                            COUNT(c.id) AS comments_count \
                     FROM posts p \
                     JOIN users u ON u.id = p.user_id \
                     LEFT JOIN comments c ON c.post_id = p.id \
                     WHERE (p.user_id = $1 \
                            OR p.user_id IN (SELECT user_id FROM followers WHERE follower_id = $1)) \
                       AND ($4::text IS NULL OR p.title ILIKE $4 OR p.content ILIKE $4) \
                       AND (cardinality($5::text[]) = 0 OR p.tags && $5) \
                     GROUP BY p.id, u.username \
                     ORDER BY p.created_at {order}, p.id {order} \
                     LIMIT $2 OFFSET $3"
                ),
                &[&viewer, &query.limit, &query.offset, &search, &query.tags],
            )
            .await
            .map_err(|e| map_pg_error("post_feed", e))?;
        rows.iter()
            .map(feed_item_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_pg_error("post_feed", e))
    }
}
