//! Inkstream - a small multi-user blogging platform with a social feed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Auth, profile, follow, post, comment, admin endpoints    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Account flows (tokens, mail, credentials)                │
//! │  - Follow graph and feed                                    │
//! │  - Posts, comments, moderation                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers and DTOs
//! - `service`: Business logic layer
//! - `data`: Database and entity models
//! - `auth`: Passwords, sessions, action tokens, extractors
//! - `render`: Markdown rendering and HTML sanitization
//! - `mail`: Outbound mail collaborator
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus metrics
//! - `validate`: Input validation

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod mail;
pub mod metrics;
pub mod render;
pub mod service;
pub mod validate;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned per request; every field is an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Outbound mail collaborator
    pub mailer: Arc<dyn mail::Mailer>,

    /// Account flows (registration, tokens, credentials)
    pub accounts: Arc<service::AccountService>,

    /// Posts, comments, moderation
    pub posts: Arc<service::PostService>,

    /// Follow graph and feed
    pub social: Arc<service::SocialService>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database (runs migrations)
    /// 2. Seed the canonical roles
    /// 3. Repair missing self-follow edges
    /// 4. Wire up the mailer and services
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!("Database connected");

        db.seed_roles().await?;
        tracing::info!("Roles seeded");

        let mailer: Arc<dyn mail::Mailer> = Arc::new(mail::TracingMailer::new(
            config.mail.sender.clone(),
            config.mail.subject_prefix.clone(),
        ));

        let config = Arc::new(config);
        let accounts = Arc::new(service::AccountService::new(
            db.clone(),
            mailer.clone(),
            config.clone(),
        ));
        let posts = Arc::new(service::PostService::new(db.clone()));
        let social = Arc::new(service::SocialService::new(db.clone()));

        // Rows created before the self-follow invariant get their edge here.
        social.ensure_self_follows().await?;

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config,
            db,
            mailer,
            accounts,
            posts,
            social,
        })
    }
}

/// Build the Axum router with all routes.
///
/// Shared by the binary and the end-to-end tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/auth", api::auth_router())
        .nest("/users", api::users_router())
        .nest("/admin", api::admin_router())
        .nest("/api", api::posts_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .route("/metrics", axum::routing::get(serve_metrics))
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}

/// GET /metrics in the Prometheus text exposition format
async fn serve_metrics() -> Result<impl axum::response::IntoResponse, error::AppError> {
    let body = metrics::render_text()
        .map_err(|e| error::AppError::Internal(anyhow::anyhow!("metrics encoding failed: {e}")))?;

    Ok((
        [(axum::http::header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        body,
    ))
}
