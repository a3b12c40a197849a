//! Common test utilities for E2E tests

use inkstream::{config, AppState};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            auth: config::AuthConfig {
                secret_key: "test-secret-key-32-bytes-long!!!".to_string(),
                session_max_age: 604_800,
                token_ttl_seconds: 3600,
            },
            admin: config::AdminConfig {
                email: Some("admin@test.example.com".to_string()),
            },
            mail: config::MailConfig {
                sender: "Inkstream Test <no-reply@test.example.com>".to_string(),
                subject_prefix: "[Inkstream Test]".to_string(),
            },
            pagination: config::PaginationConfig {
                posts_per_page: 10,
                comments_per_page: 10,
                followers_per_page: 20,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        // Build router
        let app = inkstream::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client: new_client(),
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// A fresh client with its own cookie jar, for a second user
    pub fn new_session(&self) -> reqwest::Client {
        new_client()
    }

    /// Register a user through the API and return their id
    pub async fn register_user(&self, client: &reqwest::Client, username: &str) -> String {
        let response = client
            .post(self.url("/auth/register"))
            .json(&serde_json::json!({
                "email": format!("{username}@test.example.com"),
                "username": username,
                "password": "long-enough-pw",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "registration failed");

        let body: serde_json::Value = response.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    /// Log a user in; the session cookie lands in the client's jar
    pub async fn login_user(&self, client: &reqwest::Client, username: &str) {
        let response = client
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({
                "email": format!("{username}@test.example.com"),
                "password": "long-enough-pw",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "login failed");
    }

    /// Mark a user confirmed directly in the database
    pub async fn confirm_user(&self, user_id: &str) {
        assert!(self.state.db.set_user_confirmed(user_id).await.unwrap());
    }

    /// Register, confirm, and log in a user in one step
    pub async fn active_user(&self, client: &reqwest::Client, username: &str) -> String {
        let user_id = self.register_user(client, username).await;
        self.confirm_user(&user_id).await;
        self.login_user(client, username).await;
        user_id
    }

    /// Assign a named role to a user
    pub async fn assign_role(&self, user_id: &str, role_name: &str) {
        let role = self
            .state
            .db
            .get_role_by_name(role_name)
            .await
            .unwrap()
            .unwrap();
        let user = self.state.db.get_user(user_id).await.unwrap().unwrap();
        assert!(self
            .state
            .db
            .update_user_admin_fields(
                user_id,
                &user.email,
                &user.username,
                user.confirmed,
                &role.id,
                &user.avatar_hash,
            )
            .await
            .unwrap());
    }

    /// Issue a signed action token the way outbound mail would carry it
    pub fn action_token(
        &self,
        user_id: &str,
        action: inkstream::auth::TokenAction,
        new_email: Option<String>,
    ) -> String {
        inkstream::auth::issue_action_token(
            &self.state.config.auth.secret_key,
            user_id,
            action,
            new_email,
            chrono::Duration::seconds(self.state.config.auth.token_ttl_seconds),
        )
        .unwrap()
    }
}

fn new_client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap()
}
