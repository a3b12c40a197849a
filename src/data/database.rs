//! SQLite database operations
//!
//! All database access goes through this module.
//! Uses SQLx with explicit queries per entity.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Roles
    // =========================================================================

    /// Idempotently ensure the canonical roles exist
    ///
    /// Looks up each role by name; updates the permission mask and
    /// default flag when the name already exists, never duplicates.
    pub async fn seed_roles(&self) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        for (name, permissions, is_default) in CANONICAL_ROLES {
            sqlx::query(
                r#"
                INSERT INTO roles (id, name, permissions, is_default)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(name) DO UPDATE SET
                    permissions = excluded.permissions,
                    is_default = excluded.is_default
                "#,
            )
            .bind(EntityId::new().0)
            .bind(name)
            .bind(permissions)
            .bind(is_default)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Get role by ID
    pub async fn get_role(&self, id: &str) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(role)
    }

    /// Get role by unique name
    pub async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(role)
    }

    /// Get the designated default role
    pub async fn get_default_role(&self) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE is_default = 1 LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(role)
    }

    /// List all roles
    pub async fn list_roles(&self) -> Result<Vec<Role>, AppError> {
        let roles = sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(roles)
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a user together with their self-follow edge
    ///
    /// Both rows are written in one transaction so a user can never
    /// exist without the self-follow invariant.
    pub async fn insert_user_with_self_follow(&self, user: &User) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (
                id, email, username, password_hash, role_id, confirmed,
                name, location, about_me, avatar_hash, created_at, last_seen
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.role_id)
        .bind(user.confirmed)
        .bind(&user.name)
        .bind(&user.location)
        .bind(&user.about_me)
        .bind(&user.avatar_hash)
        .bind(user.created_at)
        .bind(user.last_seen)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO follows (follower_id, followed_id, created_at) VALUES (?, ?, ?)")
            .bind(&user.id)
            .bind(&user.id)
            .bind(user.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Get user by ID
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Get user by unique email
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Get user by unique username
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Mark a user as confirmed
    ///
    /// # Returns
    /// `true` if updated, `false` if no matching user row exists.
    pub async fn set_user_confirmed(&self, user_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET confirmed = 1 WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Replace a user's password hash
    pub async fn update_user_password_hash(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Update email and the derived avatar fingerprint in one statement
    pub async fn update_user_email(
        &self,
        user_id: &str,
        email: &str,
        avatar_hash: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET email = ?, avatar_hash = ? WHERE id = ?")
            .bind(email)
            .bind(avatar_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Update the editable profile fields
    pub async fn update_user_profile(
        &self,
        user_id: &str,
        name: Option<&str>,
        location: Option<&str>,
        about_me: Option<&str>,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE users SET name = ?, location = ?, about_me = ? WHERE id = ?")
                .bind(name)
                .bind(location)
                .bind(about_me)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Administrative update of account identity fields
    pub async fn update_user_admin_fields(
        &self,
        user_id: &str,
        email: &str,
        username: &str,
        confirmed: bool,
        role_id: &str,
        avatar_hash: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = ?, username = ?, confirmed = ?, role_id = ?, avatar_hash = ?
            WHERE id = ?
            "#,
        )
        .bind(email)
        .bind(username)
        .bind(confirmed)
        .bind(role_id)
        .bind(avatar_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Update a user's last-seen timestamp
    pub async fn touch_user_last_seen(
        &self,
        user_id: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_seen = ? WHERE id = ?")
            .bind(last_seen)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Follows
    // =========================================================================

    /// Insert a follow edge unless it already exists
    ///
    /// Relies on the composite primary key, so concurrent callers
    /// resolve to "edge exists" rather than a duplicate.
    ///
    /// # Returns
    /// `true` if a new edge was created.
    pub async fn insert_follow_if_absent(
        &self,
        follower_id: &str,
        followed_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO follows (follower_id, followed_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(follower_id)
        .bind(followed_id)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete a follow edge
    ///
    /// # Returns
    /// `true` if an edge was removed, `false` if it was absent.
    pub async fn delete_follow(
        &self,
        follower_id: &str,
        followed_id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND followed_id = ?")
            .bind(follower_id)
            .bind(followed_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Check whether a follow edge exists
    pub async fn is_following(
        &self,
        follower_id: &str,
        followed_id: &str,
    ) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ? AND followed_id = ?)",
        )
        .bind(follower_id)
        .bind(followed_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists != 0)
    }

    /// Count accounts following this user (excluding the self edge)
    pub async fn count_followers(&self, user_id: &str) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM follows WHERE followed_id = ? AND follower_id != ?",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Count accounts this user follows (excluding the self edge)
    pub async fn count_following(&self, user_id: &str) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ? AND followed_id != ?",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// List users following this user, newest edge first
    pub async fn list_followers(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT users.* FROM users
            JOIN follows ON follows.follower_id = users.id
            WHERE follows.followed_id = ? AND follows.follower_id != ?
            ORDER BY follows.created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// List users this user follows, newest edge first
    pub async fn list_following(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT users.* FROM users
            JOIN follows ON follows.followed_id = users.id
            WHERE follows.follower_id = ? AND follows.followed_id != ?
            ORDER BY follows.created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// Add missing self-follow edges for every user
    ///
    /// Repair pass for data created before the self-follow invariant.
    /// Idempotent, safe to run repeatedly.
    ///
    /// # Returns
    /// Number of edges added.
    pub async fn ensure_self_follows(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO follows (follower_id, followed_id, created_at)
            SELECT id, id, ? FROM users
            "#,
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Posts
    // =========================================================================

    /// Insert a post
    pub async fn insert_post(&self, post: &Post) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO posts (id, author_id, body, body_html, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&post.id)
        .bind(&post.author_id)
        .bind(&post.body)
        .bind(&post.body_html)
        .bind(post.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get post by ID
    pub async fn get_post(&self, id: &str) -> Result<Option<Post>, AppError> {
        let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(post)
    }

    /// Replace a post's raw body and its derived HTML together
    ///
    /// Both columns always change in one statement so the derived HTML
    /// can never drift from the raw body.
    pub async fn update_post_body(
        &self,
        post_id: &str,
        body: &str,
        body_html: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE posts SET body = ?, body_html = ? WHERE id = ?")
            .bind(body)
            .bind(body_html)
            .bind(post_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// List all posts, newest first
    pub async fn list_posts(&self, limit: i64, offset: i64) -> Result<Vec<Post>, AppError> {
        let posts = sqlx::query_as::<_, Post>(
            "SELECT * FROM posts ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    /// Count all posts
    pub async fn count_posts(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// List posts by one author, newest first
    pub async fn list_posts_by_author(
        &self,
        author_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, AppError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM posts
            WHERE author_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(author_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    /// Count posts by one author
    pub async fn count_posts_by_author(&self, author_id: &str) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE author_id = ?")
            .bind(author_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Posts authored by anyone the user follows, newest first
    ///
    /// Joined against the edge set on every call, never materialized.
    /// Includes the user's own posts via the self-follow edge.
    pub async fn list_feed_posts(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, AppError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT posts.* FROM posts
            JOIN follows ON follows.followed_id = posts.author_id
            WHERE follows.follower_id = ?
            ORDER BY posts.created_at DESC, posts.id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    /// Count posts visible in the user's feed
    pub async fn count_feed_posts(&self, user_id: &str) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM posts
            JOIN follows ON follows.followed_id = posts.author_id
            WHERE follows.follower_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    // =========================================================================
    // Comments
    // =========================================================================

    /// Insert a comment
    pub async fn insert_comment(&self, comment: &Comment) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO comments (id, author_id, post_id, body, body_html, disabled, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&comment.id)
        .bind(&comment.author_id)
        .bind(&comment.post_id)
        .bind(&comment.body)
        .bind(&comment.body_html)
        .bind(comment.disabled)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get comment by ID
    pub async fn get_comment(&self, id: &str) -> Result<Option<Comment>, AppError> {
        let comment = sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(comment)
    }

    /// List comments on a post, newest first
    pub async fn list_comments_for_post(
        &self,
        post_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Comment>, AppError> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT * FROM comments
            WHERE post_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(post_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(comments)
    }

    /// Count comments on a post
    pub async fn count_comments_for_post(&self, post_id: &str) -> Result<i64, AppError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE post_id = ?")
                .bind(post_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// List every comment, newest first (moderation queue)
    pub async fn list_comments(&self, limit: i64, offset: i64) -> Result<Vec<Comment>, AppError> {
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT * FROM comments ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(comments)
    }

    /// Count all comments
    pub async fn count_comments(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Set the moderation flag on a comment
    pub async fn set_comment_disabled(
        &self,
        comment_id: &str,
        disabled: bool,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE comments SET disabled = ? WHERE id = ?")
            .bind(disabled)
            .bind(comment_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
