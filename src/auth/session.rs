//! Session management
//!
//! Uses HMAC-signed tokens stored in cookies.
//! No server-side session storage needed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::signing;
use crate::error::AppError;

/// User session data
///
/// Stored in a signed cookie; holds only the user id and lifetime,
/// everything else is loaded from the database per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Authenticated user ID
    pub user_id: String,
    /// When session was created
    pub created_at: DateTime<Utc>,
    /// When session expires
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Start a new session for a user
    pub fn new(user_id: String, max_age_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            created_at: now,
            expires_at: now + Duration::seconds(max_age_seconds),
        }
    }

    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Create a signed session token
///
/// # Arguments
/// * `session` - Session data to encode
/// * `secret` - HMAC secret key
pub fn create_session_token(session: &Session, secret: &str) -> Result<String, AppError> {
    let payload = serde_json::to_vec(session).map_err(|e| AppError::Internal(e.into()))?;
    signing::sign(secret, &payload)
}

/// Verify and decode a session token
///
/// # Errors
/// Returns `Unauthorized` if the token is malformed, tampered with,
/// or expired.
pub fn verify_session_token(token: &str, secret: &str) -> Result<Session, AppError> {
    let payload = signing::verify(secret, token).map_err(|_| AppError::Unauthorized)?;

    let session: Session =
        serde_json::from_slice(&payload).map_err(|_| AppError::Unauthorized)?;

    if session.is_expired() {
        return Err(AppError::Unauthorized);
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret-key-32-bytes-ok";

    #[test]
    fn session_token_roundtrips() {
        let session = Session::new("user-1".to_string(), 3600);
        let token = create_session_token(&session, SECRET).unwrap();

        let decoded = verify_session_token(&token, SECRET).unwrap();
        assert_eq!(decoded.user_id, "user-1");
    }

    #[test]
    fn expired_session_is_rejected() {
        let session = Session::new("user-1".to_string(), -1);
        let token = create_session_token(&session, SECRET).unwrap();

        let error = verify_session_token(&token, SECRET).unwrap_err();
        assert!(matches!(error, AppError::Unauthorized));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let session = Session::new("user-1".to_string(), 3600);
        let token = create_session_token(&session, SECRET).unwrap();

        let error =
            verify_session_token(&token, "some-other-secret-key-32-bytes-x").unwrap_err();
        assert!(matches!(error, AppError::Unauthorized));
    }
}
