//! Follow graph and feed
//!
//! Every user permanently follows themselves; the edge is created with
//! the account and repaired at startup for pre-existing rows. The feed
//! is a join over the live edge set, so it reflects follow changes
//! immediately with no fan-out state.

use std::sync::Arc;

use chrono::Utc;

use crate::data::{Database, Post, User};
use crate::error::AppError;
use crate::service::{page_offset, Page};

pub struct SocialService {
    db: Arc<Database>,
}

impl SocialService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a follow edge
    ///
    /// # Returns
    /// `true` when a new edge was created, `false` when it already
    /// existed (including the permanent self edge).
    pub async fn follow(&self, follower_id: &str, followed_id: &str) -> Result<bool, AppError> {
        if self.db.get_user(followed_id).await?.is_none() {
            return Err(AppError::NotFound);
        }

        let created = self
            .db
            .insert_follow_if_absent(follower_id, followed_id, Utc::now())
            .await?;

        if created {
            tracing::debug!(follower = follower_id, followed = followed_id, "Follow created");
        }
        Ok(created)
    }

    /// Remove a follow edge
    ///
    /// Callers must keep the self edge intact; the HTTP layer rejects
    /// self-unfollow before reaching here.
    ///
    /// # Returns
    /// `true` when an edge was removed.
    pub async fn unfollow(&self, follower_id: &str, followed_id: &str) -> Result<bool, AppError> {
        let removed = self.db.delete_follow(follower_id, followed_id).await?;

        if removed {
            tracing::debug!(follower = follower_id, followed = followed_id, "Follow removed");
        }
        Ok(removed)
    }

    pub async fn is_following(
        &self,
        follower_id: &str,
        followed_id: &str,
    ) -> Result<bool, AppError> {
        self.db.is_following(follower_id, followed_id).await
    }

    pub async fn is_followed_by(
        &self,
        user_id: &str,
        other_id: &str,
    ) -> Result<bool, AppError> {
        self.db.is_following(other_id, user_id).await
    }

    /// Follower and following counts, self edge excluded
    pub async fn follow_counts(&self, user_id: &str) -> Result<(i64, i64), AppError> {
        let followers = self.db.count_followers(user_id).await?;
        let following = self.db.count_following(user_id).await?;
        Ok((followers, following))
    }

    /// Accounts following this user, newest edge first
    pub async fn followers(
        &self,
        user_id: &str,
        page: i64,
        per_page: i64,
    ) -> Result<Page<User>, AppError> {
        let (page, offset) = page_offset(page, per_page);
        let items = self.db.list_followers(user_id, per_page, offset).await?;
        let total = self.db.count_followers(user_id).await?;

        Ok(Page {
            items,
            page,
            per_page,
            total,
        })
    }

    /// Accounts this user follows, newest edge first
    pub async fn following(
        &self,
        user_id: &str,
        page: i64,
        per_page: i64,
    ) -> Result<Page<User>, AppError> {
        let (page, offset) = page_offset(page, per_page);
        let items = self.db.list_following(user_id, per_page, offset).await?;
        let total = self.db.count_following(user_id).await?;

        Ok(Page {
            items,
            page,
            per_page,
            total,
        })
    }

    /// Posts by everyone the user follows, newest first
    ///
    /// The self edge keeps the user's own posts in their feed.
    pub async fn feed(
        &self,
        user_id: &str,
        page: i64,
        per_page: i64,
    ) -> Result<Page<Post>, AppError> {
        let (page, offset) = page_offset(page, per_page);
        let items = self.db.list_feed_posts(user_id, per_page, offset).await?;
        let total = self.db.count_feed_posts(user_id).await?;

        Ok(Page {
            items,
            page,
            per_page,
            total,
        })
    }

    /// Startup repair: add missing self edges
    pub async fn ensure_self_follows(&self) -> Result<u64, AppError> {
        let added = self.db.ensure_self_follows().await?;
        if added > 0 {
            tracing::info!(added, "Repaired missing self-follow edges");
        }
        Ok(added)
    }
}
