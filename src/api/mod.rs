//! API layer
//!
//! HTTP handlers for:
//! - Authentication and account flows
//! - User profiles and the follow graph
//! - Posts, comments, and moderation

mod accounts;
mod auth;
mod dto;
mod posts;

pub use dto::*;

pub use accounts::{admin_router, users_router};
pub use auth::auth_router;
pub use posts::posts_router;
