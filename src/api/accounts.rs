//! User profiles, the follow graph, and administration
//!
//! Profile pages are public; follow mutations require the FOLLOW
//! capability and a confirmed account. Administrative edits are gated
//! on ADMINISTER.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get, patch, post},
    Router,
};
use serde::Deserialize;

use super::dto::{MessageDto, PageDto, ProfileDto, UserDto};
use crate::auth::{CurrentUser, MaybeUser};
use crate::data::{Permission, Role, User};
use crate::error::AppError;
use crate::AppState;

/// Create user router
///
/// Routes:
/// - GET    /users/:username - Public profile with social counts
/// - GET    /users/:username/followers - Who follows them
/// - GET    /users/:username/following - Who they follow
/// - POST   /users/:username/follow - Follow
/// - DELETE /users/:username/follow - Unfollow
/// - PATCH  /users/me - Edit own profile
pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/me", patch(update_profile))
        .route("/:username", get(profile))
        .route("/:username/followers", get(followers))
        .route("/:username/following", get(following))
        .route("/:username/follow", post(follow))
        .route("/:username/follow", delete(unfollow))
}

/// Create admin router
///
/// Routes:
/// - GET   /admin/roles - List assignable roles
/// - PATCH /admin/users/:id - Edit any account's identity fields
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles))
        .route("/users/:id", patch(admin_update_user))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default = "default_page")]
    page: i64,
}

fn default_page() -> i64 {
    1
}

async fn user_by_username(state: &AppState, username: &str) -> Result<User, AppError> {
    state
        .db
        .get_user_by_username(username)
        .await?
        .ok_or(AppError::NotFound)
}

// =============================================================================
// Profiles
// =============================================================================

/// GET /users/:username
async fn profile(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    Path(username): Path<String>,
) -> Result<Json<ProfileDto>, AppError> {
    let user = user_by_username(&state, &username).await?;

    let (followers, following) = state.social.follow_counts(&user.id).await?;
    let posts = state.db.count_posts_by_author(&user.id).await?;

    let (followed_by_me, follows_me) = match principal.authed() {
        Some(authed) => (
            Some(state.social.is_following(&authed.user.id, &user.id).await?),
            Some(state.social.is_followed_by(&authed.user.id, &user.id).await?),
        ),
        None => (None, None),
    };

    Ok(Json(ProfileDto {
        user: UserDto::from_user(&user),
        followers,
        following,
        posts,
        followed_by_me,
        follows_me,
    }))
}

#[derive(Debug, Deserialize)]
struct UpdateProfileRequest {
    name: Option<String>,
    location: Option<String>,
    about_me: Option<String>,
}

/// PATCH /users/me
async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserDto>, AppError> {
    let updated = state
        .accounts
        .update_profile(&authed.user, req.name, req.location, req.about_me)
        .await?;

    Ok(Json(UserDto::from_user(&updated)))
}

// =============================================================================
// Follow graph
// =============================================================================

/// POST /users/:username/follow
async fn follow(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
    Path(username): Path<String>,
) -> Result<Json<MessageDto>, AppError> {
    authed.require_confirmed()?;
    authed.require(Permission::FOLLOW)?;

    let target = user_by_username(&state, &username).await?;
    let created = state.social.follow(&authed.user.id, &target.id).await?;

    let message = if created {
        format!("now following {username}")
    } else {
        format!("already following {username}")
    };
    Ok(Json(MessageDto::new(message)))
}

/// DELETE /users/:username/follow
///
/// The permanent self edge cannot be removed through the API.
async fn unfollow(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
    Path(username): Path<String>,
) -> Result<Json<MessageDto>, AppError> {
    authed.require_confirmed()?;
    authed.require(Permission::FOLLOW)?;

    let target = user_by_username(&state, &username).await?;
    if target.id == authed.user.id {
        return Err(AppError::Validation(
            "cannot unfollow yourself".to_string(),
        ));
    }

    let removed = state.social.unfollow(&authed.user.id, &target.id).await?;

    let message = if removed {
        format!("no longer following {username}")
    } else {
        format!("was not following {username}")
    };
    Ok(Json(MessageDto::new(message)))
}

/// GET /users/:username/followers
async fn followers(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageDto<UserDto>>, AppError> {
    let user = user_by_username(&state, &username).await?;
    let per_page = state.config.pagination.followers_per_page as i64;

    let page = state.social.followers(&user.id, query.page, per_page).await?;
    Ok(Json(PageDto::from_page(page, |u| UserDto::from_user(&u))))
}

/// GET /users/:username/following
async fn following(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageDto<UserDto>>, AppError> {
    let user = user_by_username(&state, &username).await?;
    let per_page = state.config.pagination.followers_per_page as i64;

    let page = state.social.following(&user.id, query.page, per_page).await?;
    Ok(Json(PageDto::from_page(page, |u| UserDto::from_user(&u))))
}

// =============================================================================
// Administration
// =============================================================================

/// GET /admin/roles
async fn list_roles(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
) -> Result<Json<Vec<Role>>, AppError> {
    authed.require(Permission::ADMINISTER)?;
    Ok(Json(state.db.list_roles().await?))
}

#[derive(Debug, Deserialize)]
struct AdminUpdateUserRequest {
    email: String,
    username: String,
    confirmed: bool,
    role_id: String,
}

/// PATCH /admin/users/:id
async fn admin_update_user(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
    Path(user_id): Path<String>,
    Json(req): Json<AdminUpdateUserRequest>,
) -> Result<Json<UserDto>, AppError> {
    authed.require(Permission::ADMINISTER)?;

    let updated = state
        .accounts
        .admin_update(&user_id, &req.email, &req.username, req.confirmed, &req.role_id)
        .await?;

    Ok(Json(UserDto::from_user(&updated)))
}
