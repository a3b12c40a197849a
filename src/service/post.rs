//! Posts and comments
//!
//! Raw Markdown is the source of truth; sanitized HTML is derived at
//! write time and stored alongside it. The two columns only ever
//! change together.

use std::sync::Arc;

use chrono::Utc;

use crate::auth::AuthedUser;
use crate::data::{Comment, Database, EntityId, Permission, Post};
use crate::error::AppError;
use crate::render;
use crate::service::{page_offset, Page};
use crate::validate;

pub struct PostService {
    db: Arc<Database>,
}

impl PostService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    // =========================================================================
    // Posts
    // =========================================================================

    /// Create a post from raw Markdown
    pub async fn create_post(&self, author_id: &str, body: &str) -> Result<Post, AppError> {
        let errors = validate::body(body);
        if !errors.is_empty() {
            return Err(validate::into_app_error(errors));
        }

        let post = Post {
            id: EntityId::new().0,
            author_id: author_id.to_string(),
            body: body.to_string(),
            body_html: render::post_html(body),
            created_at: Utc::now(),
        };

        self.db.insert_post(&post).await?;
        crate::metrics::POSTS_CREATED_TOTAL.inc();
        tracing::debug!(post_id = %post.id, "Post created");

        Ok(post)
    }

    /// Edit a post's body, regenerating the derived HTML
    ///
    /// Only the author or a holder of ADMINISTER may edit.
    pub async fn edit_post(
        &self,
        post_id: &str,
        editor: &AuthedUser,
        body: &str,
    ) -> Result<Post, AppError> {
        let errors = validate::body(body);
        if !errors.is_empty() {
            return Err(validate::into_app_error(errors));
        }

        let mut post = self.db.get_post(post_id).await?.ok_or(AppError::NotFound)?;

        if post.author_id != editor.user.id && !editor.can(Permission::ADMINISTER) {
            return Err(AppError::Forbidden);
        }

        let body_html = render::post_html(body);
        if !self.db.update_post_body(post_id, body, &body_html).await? {
            return Err(AppError::NotFound);
        }

        post.body = body.to_string();
        post.body_html = body_html;
        Ok(post)
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Post, AppError> {
        self.db.get_post(post_id).await?.ok_or(AppError::NotFound)
    }

    /// All posts, newest first
    pub async fn list_posts(&self, page: i64, per_page: i64) -> Result<Page<Post>, AppError> {
        let (page, offset) = page_offset(page, per_page);
        let items = self.db.list_posts(per_page, offset).await?;
        let total = self.db.count_posts().await?;

        Ok(Page {
            items,
            page,
            per_page,
            total,
        })
    }

    /// One author's posts, newest first
    pub async fn posts_by_author(
        &self,
        author_id: &str,
        page: i64,
        per_page: i64,
    ) -> Result<Page<Post>, AppError> {
        let (page, offset) = page_offset(page, per_page);
        let items = self.db.list_posts_by_author(author_id, per_page, offset).await?;
        let total = self.db.count_posts_by_author(author_id).await?;

        Ok(Page {
            items,
            page,
            per_page,
            total,
        })
    }

    // =========================================================================
    // Comments
    // =========================================================================

    /// Attach a comment to an existing post
    ///
    /// Comments render through the stricter tag whitelist.
    pub async fn add_comment(
        &self,
        post_id: &str,
        author_id: &str,
        body: &str,
    ) -> Result<Comment, AppError> {
        let errors = validate::body(body);
        if !errors.is_empty() {
            return Err(validate::into_app_error(errors));
        }

        if self.db.get_post(post_id).await?.is_none() {
            return Err(AppError::NotFound);
        }

        let comment = Comment {
            id: EntityId::new().0,
            author_id: author_id.to_string(),
            post_id: post_id.to_string(),
            body: body.to_string(),
            body_html: render::comment_html(body),
            disabled: false,
            created_at: Utc::now(),
        };

        self.db.insert_comment(&comment).await?;
        tracing::debug!(comment_id = %comment.id, post_id, "Comment created");

        Ok(comment)
    }

    /// Comments on a post, newest first
    ///
    /// Disabled comments stay in the listing; presentation layers
    /// decide whether to show the body or a placeholder.
    pub async fn comments_for_post(
        &self,
        post_id: &str,
        page: i64,
        per_page: i64,
    ) -> Result<Page<Comment>, AppError> {
        if self.db.get_post(post_id).await?.is_none() {
            return Err(AppError::NotFound);
        }

        let (page, offset) = page_offset(page, per_page);
        let items = self.db.list_comments_for_post(post_id, per_page, offset).await?;
        let total = self.db.count_comments_for_post(post_id).await?;

        Ok(Page {
            items,
            page,
            per_page,
            total,
        })
    }

    /// Every comment across all posts, newest first
    pub async fn moderation_queue(
        &self,
        page: i64,
        per_page: i64,
    ) -> Result<Page<Comment>, AppError> {
        let (page, offset) = page_offset(page, per_page);
        let items = self.db.list_comments(per_page, offset).await?;
        let total = self.db.count_comments().await?;

        Ok(Page {
            items,
            page,
            per_page,
            total,
        })
    }

    /// Set or clear the moderation flag on a comment
    pub async fn set_comment_disabled(
        &self,
        comment_id: &str,
        disabled: bool,
    ) -> Result<Comment, AppError> {
        if !self.db.set_comment_disabled(comment_id, disabled).await? {
            return Err(AppError::NotFound);
        }

        tracing::info!(comment_id, disabled, "Comment moderation flag changed");
        self.db
            .get_comment(comment_id)
            .await?
            .ok_or(AppError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{avatar_hash_for_email, Role, User};
    use tempfile::TempDir;

    async fn setup() -> (PostService, Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            Database::connect(&temp_dir.path().join("post.db"))
                .await
                .unwrap(),
        );
        db.seed_roles().await.unwrap();
        (PostService::new(db.clone()), db, temp_dir)
    }

    async fn create_user(db: &Database, username: &str, role_name: &str) -> AuthedUser {
        let role = db.get_role_by_name(role_name).await.unwrap().unwrap();
        let email = format!("{username}@example.com");
        let now = Utc::now();
        let user = User {
            id: EntityId::new().0,
            email: email.clone(),
            username: username.to_string(),
            password_hash: "not-a-real-hash".to_string(),
            role_id: role.id.clone(),
            confirmed: true,
            name: None,
            location: None,
            about_me: None,
            avatar_hash: avatar_hash_for_email(&email),
            created_at: now,
            last_seen: now,
        };
        db.insert_user_with_self_follow(&user).await.unwrap();
        AuthedUser { user, role }
    }

    #[tokio::test]
    async fn create_post_stores_raw_and_sanitized_html() {
        let (service, db, _tmp) = setup().await;
        let author = create_user(&db, "alice", "User").await;

        let post = service
            .create_post(&author.user.id, "# Hello\n\n<script>alert(1)</script>*world*")
            .await
            .unwrap();

        assert!(post.body.contains("<script>"));
        assert!(!post.body_html.contains("<script>"));
        assert!(post.body_html.contains("<h1>"));
        assert!(post.body_html.contains("<em>world</em>"));

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.body_html, post.body_html);
    }

    #[tokio::test]
    async fn create_post_rejects_empty_body() {
        let (service, db, _tmp) = setup().await;
        let author = create_user(&db, "alice", "User").await;

        let error = service.create_post(&author.user.id, "  \n ").await.unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn edit_post_regenerates_html_and_checks_authorship() {
        let (service, db, _tmp) = setup().await;
        let author = create_user(&db, "alice", "User").await;
        let other = create_user(&db, "bob", "User").await;
        let admin = create_user(&db, "root", "Administrator").await;

        let post = service
            .create_post(&author.user.id, "original")
            .await
            .unwrap();

        // A stranger may not edit.
        let error = service
            .edit_post(&post.id, &other, "hijacked")
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Forbidden));

        // The author may, and the HTML tracks the new body.
        let edited = service
            .edit_post(&post.id, &author, "**bold** now")
            .await
            .unwrap();
        assert!(edited.body_html.contains("<strong>bold</strong>"));

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.body, "**bold** now");
        assert_eq!(stored.body_html, edited.body_html);

        // So may an administrator.
        service
            .edit_post(&post.id, &admin, "moderated")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn comments_use_the_stricter_whitelist() {
        let (service, db, _tmp) = setup().await;
        let author = create_user(&db, "alice", "User").await;

        let post = service.create_post(&author.user.id, "a post").await.unwrap();
        let comment = service
            .add_comment(&post.id, &author.user.id, "# heading\n\n*fine*")
            .await
            .unwrap();

        // h1 is allowed in posts but not comments.
        assert!(!comment.body_html.contains("<h1>"));
        assert!(comment.body_html.contains("<em>fine</em>"));
        assert!(!comment.disabled);
    }

    #[tokio::test]
    async fn comment_on_missing_post_is_not_found() {
        let (service, db, _tmp) = setup().await;
        let author = create_user(&db, "alice", "User").await;

        let error = service
            .add_comment("no-such-post", &author.user.id, "hello")
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::NotFound));
    }

    #[tokio::test]
    async fn moderation_flag_toggles_and_keeps_comment_listed() {
        let (service, db, _tmp) = setup().await;
        let author = create_user(&db, "alice", "User").await;

        let post = service.create_post(&author.user.id, "a post").await.unwrap();
        let comment = service
            .add_comment(&post.id, &author.user.id, "rude remark")
            .await
            .unwrap();

        let disabled = service.set_comment_disabled(&comment.id, true).await.unwrap();
        assert!(disabled.disabled);

        // Still present in the per-post listing.
        let listing = service.comments_for_post(&post.id, 1, 10).await.unwrap();
        assert_eq!(listing.total, 1);
        assert!(listing.items[0].disabled);

        let restored = service.set_comment_disabled(&comment.id, false).await.unwrap();
        assert!(!restored.disabled);

        let missing = service.set_comment_disabled("no-such-comment", true).await;
        assert!(matches!(missing, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn listings_paginate_newest_first() {
        let (service, db, _tmp) = setup().await;
        let alice = create_user(&db, "alice", "User").await;
        let bob = create_user(&db, "bob", "User").await;

        for i in 0..3 {
            service
                .create_post(&alice.user.id, &format!("alice {i}"))
                .await
                .unwrap();
        }
        service.create_post(&bob.user.id, "bob 0").await.unwrap();

        let all = service.list_posts(1, 10).await.unwrap();
        assert_eq!(all.total, 4);
        assert_eq!(all.items[0].body, "bob 0");

        let hers = service.posts_by_author(&alice.user.id, 1, 2).await.unwrap();
        assert_eq!(hers.total, 3);
        assert_eq!(hers.items.len(), 2);
        assert_eq!(hers.items[0].body, "alice 2");
        assert_eq!(hers.total_pages(), 2);
    }
}
