//! Posts, comments, and moderation endpoints
//!
//! The JSON post API under /api. Reading is public; writing requires
//! a confirmed account holding the matching capability bit.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use super::dto::{CommentDto, PageDto, PostDto};
use crate::auth::{AuthedUser, CurrentUser, MaybeUser};
use crate::data::Permission;
use crate::error::AppError;
use crate::AppState;

/// Create posts router
///
/// Routes:
/// - GET   /api/posts - All posts, newest first (?page, ?author)
/// - POST  /api/posts - Create a post
/// - GET   /api/posts/:id - One post
/// - PATCH /api/posts/:id - Edit a post (author or administrator)
/// - GET   /api/feed - Posts by followed users
/// - GET   /api/posts/:id/comments - Comments on a post
/// - POST  /api/posts/:id/comments - Comment on a post
/// - GET   /api/comments - Moderation queue
/// - POST  /api/comments/:id/disable - Hide a comment
/// - POST  /api/comments/:id/enable - Restore a comment
pub fn posts_router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/:id", get(get_post).patch(update_post))
        .route("/feed", get(feed))
        .route("/posts/:id/comments", get(list_comments).post(create_comment))
        .route("/comments", get(moderation_queue))
        .route("/comments/:id/disable", post(disable_comment))
        .route("/comments/:id/enable", post(enable_comment))
}

/// Resolve author usernames for a batch of rows, one lookup per author
async fn author_names<'a>(
    state: &AppState,
    author_ids: impl Iterator<Item = &'a str>,
) -> Result<HashMap<String, String>, AppError> {
    let mut names = HashMap::new();
    for id in author_ids {
        if names.contains_key(id) {
            continue;
        }
        let username = match state.db.get_user(id).await? {
            Some(user) => user.username,
            None => "unknown".to_string(),
        };
        names.insert(id.to_string(), username);
    }
    Ok(names)
}

fn name_for(names: &HashMap<String, String>, id: &str) -> String {
    names.get(id).cloned().unwrap_or_else(|| "unknown".to_string())
}

// =============================================================================
// Posts
// =============================================================================

#[derive(Debug, Deserialize)]
struct PostListQuery {
    #[serde(default = "default_page")]
    page: i64,
    /// Restrict to one author's posts
    author: Option<String>,
}

fn default_page() -> i64 {
    1
}

/// GET /api/posts
async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> Result<Json<PageDto<PostDto>>, AppError> {
    let _timer = crate::metrics::HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/api/posts"])
        .start_timer();

    let per_page = state.config.pagination.posts_per_page as i64;

    let page = match &query.author {
        Some(username) => {
            let author = state
                .db
                .get_user_by_username(username)
                .await?
                .ok_or(AppError::NotFound)?;
            state.posts.posts_by_author(&author.id, query.page, per_page).await?
        }
        None => state.posts.list_posts(query.page, per_page).await?,
    };

    let names = author_names(&state, page.items.iter().map(|p| p.author_id.as_str())).await?;
    let items = page
        .items
        .iter()
        .map(|p| PostDto::from_post(p, name_for(&names, &p.author_id)))
        .collect();

    crate::metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/posts", "200"])
        .inc();
    Ok(Json(PageDto::from_items(items, &page)))
}

#[derive(Debug, Deserialize)]
struct PostBodyRequest {
    body: String,
}

/// POST /api/posts
async fn create_post(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
    Json(req): Json<PostBodyRequest>,
) -> Result<(StatusCode, Json<PostDto>), AppError> {
    let _timer = crate::metrics::HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/api/posts"])
        .start_timer();

    authed.require_confirmed()?;
    authed.require(Permission::WRITE_ARTICLES)?;

    let post = state.posts.create_post(&authed.user.id, &req.body).await?;
    let dto = PostDto::from_post(&post, authed.user.username.clone());

    crate::metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/api/posts", "201"])
        .inc();
    Ok((StatusCode::CREATED, Json(dto)))
}

/// GET /api/posts/:id
async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Json<PostDto>, AppError> {
    let post = state.posts.get_post(&post_id).await?;
    let names = author_names(&state, std::iter::once(post.author_id.as_str())).await?;

    Ok(Json(PostDto::from_post(&post, name_for(&names, &post.author_id))))
}

/// PATCH /api/posts/:id
async fn update_post(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
    Path(post_id): Path<String>,
    Json(req): Json<PostBodyRequest>,
) -> Result<Json<PostDto>, AppError> {
    authed.require_confirmed()?;

    let post = state.posts.edit_post(&post_id, &authed, &req.body).await?;
    let names = author_names(&state, std::iter::once(post.author_id.as_str())).await?;

    Ok(Json(PostDto::from_post(&post, name_for(&names, &post.author_id))))
}

/// GET /api/feed
///
/// Posts by everyone the user follows, including their own.
async fn feed(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
    Query(query): Query<PostListQuery>,
) -> Result<Json<PageDto<PostDto>>, AppError> {
    let _timer = crate::metrics::HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/api/feed"])
        .start_timer();

    let per_page = state.config.pagination.posts_per_page as i64;
    let page = state.social.feed(&authed.user.id, query.page, per_page).await?;

    let names = author_names(&state, page.items.iter().map(|p| p.author_id.as_str())).await?;
    let items = page
        .items
        .iter()
        .map(|p| PostDto::from_post(p, name_for(&names, &p.author_id)))
        .collect();

    Ok(Json(PageDto::from_items(items, &page)))
}

// =============================================================================
// Comments
// =============================================================================

#[derive(Debug, Deserialize)]
struct CommentListQuery {
    #[serde(default = "default_page")]
    page: i64,
}

/// GET /api/posts/:id/comments
///
/// Disabled comment bodies are withheld from viewers who cannot
/// moderate; the flag itself is always visible.
async fn list_comments(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    Path(post_id): Path<String>,
    Query(query): Query<CommentListQuery>,
) -> Result<Json<PageDto<CommentDto>>, AppError> {
    let per_page = state.config.pagination.comments_per_page as i64;
    let page = state
        .posts
        .comments_for_post(&post_id, query.page, per_page)
        .await?;

    let can_moderate = principal.can(Permission::MODERATE_COMMENTS);
    let names = author_names(&state, page.items.iter().map(|c| c.author_id.as_str())).await?;
    let items = page
        .items
        .iter()
        .map(|c| CommentDto::for_viewer(c, name_for(&names, &c.author_id), can_moderate))
        .collect();

    Ok(Json(PageDto::from_items(items, &page)))
}

/// POST /api/posts/:id/comments
async fn create_comment(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
    Path(post_id): Path<String>,
    Json(req): Json<PostBodyRequest>,
) -> Result<(StatusCode, Json<CommentDto>), AppError> {
    authed.require_confirmed()?;
    authed.require(Permission::COMMENT)?;

    let comment = state
        .posts
        .add_comment(&post_id, &authed.user.id, &req.body)
        .await?;
    let dto = CommentDto::for_viewer(&comment, authed.user.username.clone(), true);

    Ok((StatusCode::CREATED, Json(dto)))
}

// =============================================================================
// Moderation
// =============================================================================

/// GET /api/comments
async fn moderation_queue(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
    Query(query): Query<CommentListQuery>,
) -> Result<Json<PageDto<CommentDto>>, AppError> {
    authed.require(Permission::MODERATE_COMMENTS)?;

    let per_page = state.config.pagination.comments_per_page as i64;
    let page = state.posts.moderation_queue(query.page, per_page).await?;

    let names = author_names(&state, page.items.iter().map(|c| c.author_id.as_str())).await?;
    let items = page
        .items
        .iter()
        .map(|c| CommentDto::for_viewer(c, name_for(&names, &c.author_id), true))
        .collect();

    Ok(Json(PageDto::from_items(items, &page)))
}

async fn set_comment_disabled(
    state: &AppState,
    authed: &AuthedUser,
    comment_id: &str,
    disabled: bool,
) -> Result<Json<CommentDto>, AppError> {
    authed.require(Permission::MODERATE_COMMENTS)?;

    let comment = state.posts.set_comment_disabled(comment_id, disabled).await?;
    let names = author_names(state, std::iter::once(comment.author_id.as_str())).await?;

    Ok(Json(CommentDto::for_viewer(
        &comment,
        name_for(&names, &comment.author_id),
        true,
    )))
}

/// POST /api/comments/:id/disable
async fn disable_comment(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
    Path(comment_id): Path<String>,
) -> Result<Json<CommentDto>, AppError> {
    set_comment_disabled(&state, &authed, &comment_id, true).await
}

/// POST /api/comments/:id/enable
async fn enable_comment(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
    Path(comment_id): Path<String>,
) -> Result<Json<CommentDto>, AppError> {
    set_comment_disabled(&state, &authed, &comment_id, false).await
}
