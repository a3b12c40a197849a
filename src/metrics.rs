//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("inkstream_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "inkstream_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("inkstream_errors_total", "Total number of application errors"),
        &["error_type"]
    ).expect("metric can be created");

    // Domain Metrics
    pub static ref USERS_REGISTERED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("inkstream_users_registered_total", "Total number of user registrations"),
        &["role"]
    ).expect("metric can be created");
    pub static ref ACTION_TOKENS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("inkstream_action_tokens_total", "Action tokens issued and verified"),
        &["action", "outcome"]
    ).expect("metric can be created");
    pub static ref POSTS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "inkstream_posts_created_total",
        "Posts created since startup"
    ).expect("metric can be created");
    pub static ref MAIL_SENT_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("inkstream_mail_sent_total", "Outbound mail handed to the mailer"),
        &["template"]
    ).expect("metric can be created");
}

/// Register all metrics with the global registry
///
/// Must be called once at startup. Registration failures are logged
/// and skipped so a duplicate registration never aborts the server.
pub fn init_metrics() {
    let metrics: Vec<(&str, Box<dyn prometheus::core::Collector>)> = vec![
        ("http_requests_total", Box::new(HTTP_REQUESTS_TOTAL.clone())),
        (
            "http_request_duration_seconds",
            Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        ),
        ("errors_total", Box::new(ERRORS_TOTAL.clone())),
        (
            "users_registered_total",
            Box::new(USERS_REGISTERED_TOTAL.clone()),
        ),
        ("action_tokens_total", Box::new(ACTION_TOKENS_TOTAL.clone())),
        ("posts_created_total", Box::new(POSTS_CREATED_TOTAL.clone())),
        ("mail_sent_total", Box::new(MAIL_SENT_TOTAL.clone())),
    ];

    for (name, metric) in metrics {
        if let Err(e) = REGISTRY.register(metric) {
            tracing::warn!(metric = name, error = %e, "Failed to register metric");
        }
    }

    tracing::info!("Metrics initialized");
}

/// Record an action token event
pub fn observe_action_token(action: &str, outcome: &str) {
    ACTION_TOKENS_TOTAL.with_label_values(&[action, outcome]).inc();
}

/// Encode every registered metric in the Prometheus text exposition format
pub fn render_text() -> Result<String, prometheus::Error> {
    TextEncoder::new().encode_to_string(&REGISTRY.gather())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_text_includes_registered_metrics() {
        init_metrics();
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .inc();

        let text = render_text().unwrap();
        assert!(text.contains("inkstream_http_requests_total"));
    }
}
