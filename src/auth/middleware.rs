//! Authentication extractors
//!
//! Resolves the acting principal for each request from the session
//! cookie or a bearer token, loading the user and their role so
//! handlers can run capability checks without touching the database.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;

use super::session::verify_session_token;
use crate::data::{Role, User};
use crate::error::AppError;
use crate::AppState;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

/// An authenticated user together with their resolved role
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user: User,
    pub role: Role,
}

impl AuthedUser {
    /// Capability check against the role's permission mask
    pub fn can(&self, permissions: i64) -> bool {
        self.role.grants(permissions)
    }

    pub fn is_administrator(&self) -> bool {
        self.can(crate::data::Permission::ADMINISTER)
    }

    /// Fail with `Forbidden` unless every requested bit is granted
    pub fn require(&self, permissions: i64) -> Result<(), AppError> {
        if self.can(permissions) {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    /// Fail with `Forbidden` until the account email is confirmed
    pub fn require_confirmed(&self) -> Result<(), AppError> {
        if self.user.confirmed {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

/// The acting principal for a request
///
/// Anonymous principals answer the same capability questions as
/// authenticated ones, so callers never special-case missing logins.
#[derive(Debug, Clone)]
pub enum Principal {
    Anonymous,
    Authenticated(AuthedUser),
}

impl Principal {
    pub fn can(&self, permissions: i64) -> bool {
        match self {
            Self::Anonymous => false,
            Self::Authenticated(authed) => authed.can(permissions),
        }
    }

    pub fn is_administrator(&self) -> bool {
        match self {
            Self::Anonymous => false,
            Self::Authenticated(authed) => authed.is_administrator(),
        }
    }

    pub fn authed(&self) -> Option<&AuthedUser> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(authed) => Some(authed),
        }
    }
}

fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
        .or_else(|| {
            let jar = CookieJar::from_headers(headers);
            jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_owned())
        })
}

async fn authenticate_token(token: &str, state: &AppState) -> Result<AuthedUser, AppError> {
    let session = verify_session_token(token, &state.config.auth.secret_key)?;

    let user = state
        .db
        .get_user(&session.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    let role = state
        .db
        .get_role(&user.role_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    // Session touch, mirrors the classic "last seen" ping.
    state.db.touch_user_last_seen(&user.id, Utc::now()).await?;

    Ok(AuthedUser { user, role })
}

/// Extractor for the current authenticated user
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentUser(authed): CurrentUser) -> impl IntoResponse {
///     format!("Hello, {}", authed.user.username)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthedUser);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(authed) = parts.extensions.get::<AuthedUser>().cloned() {
            return Ok(CurrentUser(authed));
        }

        let state = AppState::from_ref(state);
        let token = extract_token_from_headers(&parts.headers).ok_or(AppError::Unauthorized)?;
        let authed = authenticate_token(&token, &state).await?;
        parts.extensions.insert(authed.clone());

        Ok(CurrentUser(authed))
    }
}

/// Optional principal extractor
///
/// Resolves to `Principal::Anonymous` instead of an error when the
/// request carries no valid credentials.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(authed) = parts.extensions.get::<AuthedUser>().cloned() {
            return Ok(MaybeUser(Principal::Authenticated(authed)));
        }

        let app_state = AppState::from_ref(state);
        let authed = match extract_token_from_headers(&parts.headers) {
            Some(token) => authenticate_token(&token, &app_state).await.ok(),
            None => None,
        };

        let principal = match authed {
            Some(authed) => {
                parts.extensions.insert(authed.clone());
                Principal::Authenticated(authed)
            }
            None => Principal::Anonymous,
        };

        Ok(MaybeUser(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{EntityId, Permission};

    fn authed(permissions: i64) -> AuthedUser {
        let now = Utc::now();
        AuthedUser {
            user: User {
                id: EntityId::new().0,
                email: "a@example.com".to_string(),
                username: "a".to_string(),
                password_hash: "hash".to_string(),
                role_id: "role".to_string(),
                confirmed: true,
                name: None,
                location: None,
                about_me: None,
                avatar_hash: crate::data::avatar_hash_for_email("a@example.com"),
                created_at: now,
                last_seen: now,
            },
            role: Role {
                id: "role".to_string(),
                name: "test".to_string(),
                permissions,
                is_default: false,
            },
        }
    }

    #[test]
    fn anonymous_principal_has_no_permissions() {
        let anon = Principal::Anonymous;
        assert!(!anon.can(Permission::FOLLOW));
        assert!(!anon.can(0));
        assert!(!anon.is_administrator());
        assert!(anon.authed().is_none());
    }

    #[test]
    fn authenticated_principal_delegates_to_role() {
        let principal =
            Principal::Authenticated(authed(Permission::FOLLOW | Permission::COMMENT));
        assert!(principal.can(Permission::FOLLOW));
        assert!(!principal.can(Permission::ADMINISTER));
        assert!(!principal.is_administrator());
    }

    #[test]
    fn require_maps_missing_bits_to_forbidden() {
        let user = authed(Permission::FOLLOW);
        assert!(user.require(Permission::FOLLOW).is_ok());
        assert!(matches!(
            user.require(Permission::WRITE_ARTICLES),
            Err(AppError::Forbidden)
        ));
    }
}
