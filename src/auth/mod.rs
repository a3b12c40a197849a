//! Authentication and credentials
//!
//! Handles:
//! - Password hashing (argon2)
//! - Signed session cookies
//! - Account action tokens (confirm / reset / change-email)
//! - Request extractors resolving the acting principal

mod middleware;
pub mod password;
pub mod session;
mod signing;
pub mod token;

pub use middleware::{AuthedUser, CurrentUser, MaybeUser, Principal, SESSION_COOKIE};
pub use session::{create_session_token, verify_session_token, Session};
pub use token::{issue_action_token, verify_action_token, ActionPayload, TokenAction};
