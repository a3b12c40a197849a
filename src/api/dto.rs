//! API response DTOs
//!
//! Wire representations for the JSON API. Internal fields (password
//! hashes, email addresses of other users) never appear here.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data::{Comment, Post, User};
use crate::service::Page;

/// Public view of a user
#[derive(Debug, Clone, Serialize)]
pub struct UserDto {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub avatar_url: String,
    pub member_since: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl UserDto {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            name: user.name.clone(),
            location: user.location.clone(),
            about_me: user.about_me.clone(),
            avatar_url: user.gravatar_url(256),
            member_since: user.created_at,
            last_seen: user.last_seen,
        }
    }
}

/// The authenticated user's own view, including private fields
#[derive(Debug, Clone, Serialize)]
pub struct AccountDto {
    #[serde(flatten)]
    pub user: UserDto,
    pub email: String,
    pub confirmed: bool,
    pub role: String,
}

/// A profile page: the user plus their social counts
#[derive(Debug, Clone, Serialize)]
pub struct ProfileDto {
    #[serde(flatten)]
    pub user: UserDto,
    pub followers: i64,
    pub following: i64,
    pub posts: i64,
    /// Whether the requesting user follows this profile, absent for
    /// anonymous requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followed_by_me: Option<bool>,
    /// Whether this profile follows the requesting user, absent for
    /// anonymous requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follows_me: Option<bool>,
}

/// A post with its resolved author name
#[derive(Debug, Clone, Serialize)]
pub struct PostDto {
    pub id: String,
    pub author_id: String,
    pub author_username: String,
    pub body: String,
    pub body_html: String,
    pub created_at: DateTime<Utc>,
}

impl PostDto {
    pub fn from_post(post: &Post, author_username: String) -> Self {
        Self {
            id: post.id.clone(),
            author_id: post.author_id.clone(),
            author_username,
            body: post.body.clone(),
            body_html: post.body_html.clone(),
            created_at: post.created_at,
        }
    }
}

/// A comment as shown to a given viewer
///
/// For disabled comments the body is withheld unless the viewer can
/// moderate; the `disabled` flag itself is always visible.
#[derive(Debug, Clone, Serialize)]
pub struct CommentDto {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_username: String,
    pub body_html: Option<String>,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
}

impl CommentDto {
    pub fn for_viewer(comment: &Comment, author_username: String, can_moderate: bool) -> Self {
        let body_html = if comment.disabled && !can_moderate {
            None
        } else {
            Some(comment.body_html.clone())
        };

        Self {
            id: comment.id.clone(),
            post_id: comment.post_id.clone(),
            author_id: comment.author_id.clone(),
            author_username,
            body_html,
            disabled: comment.disabled,
            created_at: comment.created_at,
        }
    }
}

/// One page of a listing, with derived page count
#[derive(Debug, Clone, Serialize)]
pub struct PageDto<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> PageDto<T> {
    /// Wrap already-mapped items with the paging data of their source
    pub fn from_items<U>(items: Vec<T>, page: &Page<U>) -> Self {
        Self {
            items,
            page: page.page,
            per_page: page.per_page,
            total: page.total,
            total_pages: page.total_pages(),
        }
    }

    /// Map a service page into its wire form
    pub fn from_page<U>(page: Page<U>, map: impl FnMut(U) -> T) -> Self {
        let total_pages = page.total_pages();
        Self {
            items: page.items.into_iter().map(map).collect(),
            page: page.page,
            per_page: page.per_page,
            total: page.total,
            total_pages,
        }
    }
}

/// Plain confirmation message
#[derive(Debug, Clone, Serialize)]
pub struct MessageDto {
    pub message: String,
}

impl MessageDto {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
