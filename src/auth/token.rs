//! Account action tokens
//!
//! Signed, time-limited tokens authorizing one account-state
//! transition: confirm, password reset, or email change. Verification
//! is stateless; there is no consumed-token tracking, so a token stays
//! valid for any number of uses until its expiry. That tradeoff avoids
//! a token-storage table and is kept deliberately.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::signing;
use crate::error::AppError;

/// Account-state transition a token authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAction {
    /// Activate a freshly registered account
    Confirm,
    /// Replace a forgotten password
    Reset,
    /// Move the account to a new email address
    ChangeEmail,
}

impl TokenAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Reset => "reset",
            Self::ChangeEmail => "change_email",
        }
    }
}

/// Signed token payload
///
/// `new_email` is present only for `change_email` tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActionClaims {
    action: String,
    user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    new_email: Option<String>,
    expires_at: DateTime<Utc>,
}

/// Verified action-token payload returned to the caller
#[derive(Debug, Clone)]
pub struct ActionPayload {
    pub user_id: String,
    /// Proposed address for `change_email` tokens
    pub new_email: Option<String>,
}

/// Issue an action token for a user
///
/// # Arguments
/// * `secret` - Process-wide signing key
/// * `user_id` - User the token is bound to
/// * `action` - State transition being authorized
/// * `new_email` - Proposed address, `change_email` only
/// * `ttl` - Token lifetime (callers default this to 3600 s)
pub fn issue_action_token(
    secret: &str,
    user_id: &str,
    action: TokenAction,
    new_email: Option<String>,
    ttl: Duration,
) -> Result<String, AppError> {
    let claims = ActionClaims {
        action: action.as_str().to_string(),
        user: user_id.to_string(),
        new_email,
        expires_at: Utc::now() + ttl,
    };

    let payload = serde_json::to_vec(&claims).map_err(|e| AppError::Internal(e.into()))?;
    let token = signing::sign(secret, &payload)?;

    crate::metrics::observe_action_token(action.as_str(), "issued");
    Ok(token)
}

/// Verify an action token against an expected action and user
///
/// Every failure cause (malformed, tampered, expired, action mismatch,
/// user mismatch) maps to the same `InvalidToken` error so callers
/// cannot distinguish which check failed.
pub fn verify_action_token(
    secret: &str,
    token: &str,
    expected_action: TokenAction,
    expected_user_id: &str,
) -> Result<ActionPayload, AppError> {
    let rejected = || {
        crate::metrics::observe_action_token(expected_action.as_str(), "rejected");
        AppError::InvalidToken
    };

    let payload = signing::verify(secret, token).map_err(|_| rejected())?;
    let claims: ActionClaims = serde_json::from_slice(&payload).map_err(|_| rejected())?;

    if claims.expires_at < Utc::now() {
        return Err(rejected());
    }
    if claims.action != expected_action.as_str() {
        return Err(rejected());
    }
    if claims.user != expected_user_id {
        return Err(rejected());
    }

    crate::metrics::observe_action_token(expected_action.as_str(), "verified");
    Ok(ActionPayload {
        user_id: claims.user,
        new_email: claims.new_email,
    })
}
