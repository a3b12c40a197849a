//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub admin: AdminConfig,
    pub mail: MailConfig,
    pub pagination: PaginationConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "blog.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://blog.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret key for session and action-token signing (32+ bytes)
    pub secret_key: String,
    /// Session max age in seconds (default: 604800 = 7 days)
    pub session_max_age: i64,
    /// Action token lifetime in seconds (default: 3600 = 1 hour)
    pub token_ttl_seconds: i64,
}

/// Admin bootstrap configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Registrations with this email receive the Administrator role
    pub email: Option<String>,
}

/// Outbound mail configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// From address shown in outbound mail
    pub sender: String,
    /// Prefix prepended to every subject line
    pub subject_prefix: String,
}

/// Page sizes for listings
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    pub posts_per_page: u32,
    pub comments_per_page: u32,
    pub followers_per_page: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (INKSTREAM_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/inkstream.db")?
            .set_default("auth.session_max_age", 604_800)?
            .set_default("auth.token_ttl_seconds", 3600)?
            .set_default("admin.email", None::<String>)?
            .set_default("mail.sender", "Inkstream <no-reply@localhost>")?
            .set_default("mail.subject_prefix", "[Inkstream]")?
            .set_default("pagination.posts_per_page", 10)?
            .set_default("pagination.comments_per_page", 10)?
            .set_default("pagination.followers_per_page", 20)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (INKSTREAM_*)
            .add_source(
                Environment::with_prefix("INKSTREAM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SECRET_KEY_BYTES: usize = 32;

        if self.auth.secret_key.as_bytes().len() < MIN_SECRET_KEY_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.secret_key must be at least {} bytes",
                MIN_SECRET_KEY_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if self.auth.token_ttl_seconds <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.token_ttl_seconds must be greater than 0".to_string(),
            ));
        }

        if self.pagination.posts_per_page == 0
            || self.pagination.comments_per_page == 0
            || self.pagination.followers_per_page == 0
        {
            return Err(crate::error::AppError::Config(
                "pagination page sizes must be greater than 0".to_string(),
            ));
        }

        if !self.should_use_secure_cookies() {
            tracing::warn!(
                domain = %self.server.domain,
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    // Strip an explicit port, careful with bracketed IPv6 literals.
    let host = if let Some(rest) = trimmed.strip_prefix('[') {
        rest.split_once(']')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| trimmed.to_string())
    } else {
        match trimmed.rsplit_once(':') {
            Some((host, port))
                if !host.contains(':') && port.chars().all(|c| c.is_ascii_digit()) =>
            {
                host.to_string()
            }
            _ => trimmed.to_string(),
        }
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;

    /// A fully-populated configuration for service and handler tests.
    pub(crate) fn test_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/inkstream-test.db"),
            },
            auth: AuthConfig {
                secret_key: "x".repeat(32),
                session_max_age: 604_800,
                token_ttl_seconds: 3600,
            },
            admin: AdminConfig {
                email: Some("admin@example.com".to_string()),
            },
            mail: MailConfig {
                sender: "Inkstream <no-reply@example.com>".to_string(),
                subject_prefix: "[Inkstream]".to_string(),
            },
            pagination: PaginationConfig {
                posts_per_page: 10,
                comments_per_page: 10,
                followers_per_page: 20,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tests_support::test_config;

    #[test]
    fn validate_accepts_http_on_localhost() {
        let config = test_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
    }

    #[test]
    fn validate_rejects_short_secret_key() {
        let mut config = test_config();
        config.auth.secret_key = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("secret key shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("auth.secret_key")
        ));
    }

    #[test]
    fn validate_rejects_http_for_non_local_domain() {
        let mut config = test_config();
        config.server.domain = "blog.example.com".to_string();
        config.server.protocol = "http".to_string();

        let error = config
            .validate()
            .expect_err("public domains must require https");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("server.protocol must be https")
        ));
    }

    #[test]
    fn validate_rejects_non_positive_token_ttl() {
        let mut config = test_config();
        config.auth.token_ttl_seconds = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn local_domain_detection_handles_ports_and_ips() {
        assert!(is_local_server_domain("localhost:8080"));
        assert!(is_local_server_domain("127.0.0.1"));
        assert!(is_local_server_domain("[::1]:3000"));
        assert!(!is_local_server_domain("blog.example.com"));
    }
}
