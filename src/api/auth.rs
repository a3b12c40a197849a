//! Authentication endpoints
//!
//! Registration, login, and every token-gated account transition.
//! Sessions live in a signed, http-only cookie; no server-side
//! session storage.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;

use super::dto::{AccountDto, MessageDto, UserDto};
use crate::auth::{create_session_token, CurrentUser, Session, SESSION_COOKIE};
use crate::data::User;
use crate::error::AppError;
use crate::AppState;

/// Create authentication router
///
/// Routes:
/// - POST /auth/register - Create an account
/// - POST /auth/login - Start a session
/// - POST /auth/logout - End the session
/// - GET  /auth/confirm/:token - Confirm the account email
/// - POST /auth/confirm/resend - Re-send the confirmation mail
/// - POST /auth/password - Change password (logged in)
/// - POST /auth/reset - Request a password reset mail
/// - POST /auth/reset/:token - Reset the password with a token
/// - POST /auth/email - Request an email change
/// - GET  /auth/email/:token - Apply the email change
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/confirm/:token", get(confirm))
        .route("/confirm/resend", post(resend_confirmation))
        .route("/password", post(change_password))
        .route("/reset", post(request_password_reset))
        .route("/reset/:token", post(reset_password))
        .route("/email", post(request_email_change))
        .route("/email/:token", get(change_email))
}

async fn account_dto(state: &AppState, user: &User) -> Result<AccountDto, AppError> {
    let role = state
        .db
        .get_role(&user.role_id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("user references missing role")))?;

    Ok(AccountDto {
        user: UserDto::from_user(user),
        email: user.email.clone(),
        confirmed: user.confirmed,
        role: role.name,
    })
}

fn session_cookie(state: &AppState, user: &User) -> Result<Cookie<'static>, AppError> {
    let session = Session::new(user.id.clone(), state.config.auth.session_max_age);
    let token = create_session_token(&session, &state.config.auth.secret_key)?;

    Ok(Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(state.config.should_use_secure_cookies())
        .same_site(SameSite::Lax)
        .build())
}

// =============================================================================
// Registration and sessions
// =============================================================================

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    username: String,
    password: String,
}

/// POST /auth/register
async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AccountDto>), AppError> {
    let _timer = crate::metrics::HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/auth/register"])
        .start_timer();

    let user = state
        .accounts
        .register(&req.email, &req.username, &req.password)
        .await?;

    crate::metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/auth/register", "201"])
        .inc();
    Ok((StatusCode::CREATED, Json(account_dto(&state, &user).await?)))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

/// POST /auth/login
///
/// Sets the session cookie on success.
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AccountDto>), AppError> {
    let _timer = crate::metrics::HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/auth/login"])
        .start_timer();

    let user = state.accounts.login(&req.email, &req.password).await?;

    let jar = jar.add(session_cookie(&state, &user)?);
    Ok((jar, Json(account_dto(&state, &user).await?)))
}

/// POST /auth/logout
async fn logout(jar: CookieJar) -> (CookieJar, Json<MessageDto>) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Json(MessageDto::new("logged out")))
}

// =============================================================================
// Email confirmation
// =============================================================================

/// GET /auth/confirm/:token
async fn confirm(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
    Path(token): Path<String>,
) -> Result<Json<MessageDto>, AppError> {
    state.accounts.confirm(&authed.user, &token).await?;
    Ok(Json(MessageDto::new("account confirmed")))
}

/// POST /auth/confirm/resend
async fn resend_confirmation(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
) -> Result<Json<MessageDto>, AppError> {
    if authed.user.confirmed {
        return Ok(Json(MessageDto::new("account already confirmed")));
    }

    state.accounts.request_confirmation(&authed.user).await?;
    Ok(Json(MessageDto::new("confirmation mail sent")))
}

// =============================================================================
// Passwords
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

/// POST /auth/password
async fn change_password(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<MessageDto>, AppError> {
    state
        .accounts
        .change_password(&authed.user, &req.current_password, &req.new_password)
        .await?;
    Ok(Json(MessageDto::new("password changed")))
}

#[derive(Debug, Deserialize)]
struct ResetRequest {
    email: String,
}

/// POST /auth/reset
///
/// Responds identically whether or not the email is registered.
async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<ResetRequest>,
) -> Result<Json<MessageDto>, AppError> {
    state.accounts.request_password_reset(&req.email).await?;
    Ok(Json(MessageDto::new(
        "if that address is registered, a reset mail is on its way",
    )))
}

#[derive(Debug, Deserialize)]
struct ResetPasswordRequest {
    email: String,
    new_password: String,
}

/// POST /auth/reset/:token
async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageDto>, AppError> {
    state
        .accounts
        .reset_password(&req.email, &token, &req.new_password)
        .await?;
    Ok(Json(MessageDto::new("password reset")))
}

// =============================================================================
// Email change
// =============================================================================

#[derive(Debug, Deserialize)]
struct EmailChangeRequest {
    new_email: String,
    password: String,
}

/// POST /auth/email
async fn request_email_change(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
    Json(req): Json<EmailChangeRequest>,
) -> Result<Json<MessageDto>, AppError> {
    state
        .accounts
        .request_email_change(&authed.user, &req.new_email, &req.password)
        .await?;
    Ok(Json(MessageDto::new(
        "a confirmation mail was sent to the new address",
    )))
}

/// GET /auth/email/:token
async fn change_email(
    State(state): State<AppState>,
    CurrentUser(authed): CurrentUser,
    Path(token): Path<String>,
) -> Result<Json<AccountDto>, AppError> {
    let updated = state.accounts.change_email(&authed.user, &token).await?;
    Ok(Json(account_dto(&state, &updated).await?))
}
