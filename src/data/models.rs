//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Permissions and roles
// =============================================================================

/// Permission bit flags
///
/// Each bit represents one grantable capability. Flags are independent
/// so they can be OR-combined into a role mask.
pub struct Permission;

impl Permission {
    pub const FOLLOW: i64 = 0x01;
    pub const COMMENT: i64 = 0x02;
    pub const WRITE_ARTICLES: i64 = 0x04;
    pub const MODERATE_COMMENTS: i64 = 0x08;
    pub const ADMINISTER: i64 = 0x80;
}

/// A named permission mask assignable to users
///
/// Exactly one role carries `is_default = true`; new registrations
/// fall back to it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub permissions: i64,
    pub is_default: bool,
}

impl Role {
    /// Exact-subset permission test
    ///
    /// True iff every bit of `required` is set in this role's mask.
    /// A role missing even one requested bit fails.
    pub fn grants(&self, required: i64) -> bool {
        (self.permissions & required) == required
    }
}

/// Canonical role definitions seeded at startup
///
/// Order: (name, permission mask, is_default).
pub const CANONICAL_ROLES: [(&str, i64, bool); 3] = [
    (
        "User",
        Permission::FOLLOW | Permission::COMMENT | Permission::WRITE_ARTICLES,
        true,
    ),
    (
        "Moderator",
        Permission::FOLLOW
            | Permission::COMMENT
            | Permission::WRITE_ARTICLES
            | Permission::MODERATE_COMMENTS,
        false,
    ),
    ("Administrator", 0xFF, false),
];

// =============================================================================
// User
// =============================================================================

/// A registered user
///
/// The password credential is stored only as an argon2 hash; the
/// plaintext form is never persisted or retrievable.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role_id: String,
    pub confirmed: bool,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    /// Hex digest of the lowercase email, used for gravatar-style URLs
    pub avatar_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl User {
    /// Gravatar-style avatar URL for this user
    pub fn gravatar_url(&self, size: u32) -> String {
        format!(
            "https://secure.gravatar.com/avatar/{}?s={}&d=identicon&r=g",
            self.avatar_hash, size
        )
    }
}

/// Derive the avatar fingerprint for an email address
///
/// Deterministic hex SHA-256 of the trimmed, lowercased email.
/// Recomputed whenever the email changes.
pub fn avatar_hash_for_email(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_ascii_lowercase().as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

// =============================================================================
// Follow relationships
// =============================================================================

/// Directed follow edge
///
/// Every user has a self-follow edge created at registration time so
/// that "posts from people I follow" naturally includes their own.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Follow {
    pub follower_id: String,
    pub followed_id: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Posts and comments
// =============================================================================

/// A blog post
///
/// `body_html` is a pure function of `body` (markdown render + sanitize)
/// and is recomputed on every body write, never hand-edited.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub body: String,
    pub body_html: String,
    pub created_at: DateTime<Utc>,
}

/// A comment on a post
///
/// Same body/body_html derivation rule as posts, with a smaller tag
/// allow-list. `disabled` is settable only through moderation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: String,
    pub author_id: String,
    pub post_id: String,
    pub body: String,
    pub body_html: String,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
}
