//! Outbound mail collaborator
//!
//! The core treats mail as fire-and-forget: messages are handed to a
//! [`Mailer`] and failures are logged, never retried here. Delivery
//! transport lives behind the trait; the default implementation only
//! records the message through tracing, which is also what local
//! development wants.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::AppError;

/// A rendered outbound message
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    /// Template identifier, e.g. "auth/confirm"
    pub template: String,
    /// Template context (token, username, ...)
    pub context: HashMap<String, String>,
}

/// Mail delivery collaborator
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), AppError>;
}

/// Mailer that logs messages instead of delivering them
///
/// Token-bearing context values are not logged at info level.
pub struct TracingMailer {
    sender: String,
    subject_prefix: String,
}

impl TracingMailer {
    pub fn new(sender: String, subject_prefix: String) -> Self {
        Self {
            sender,
            subject_prefix,
        }
    }
}

#[async_trait]
impl Mailer for TracingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), AppError> {
        crate::metrics::MAIL_SENT_TOTAL
            .with_label_values(&[mail.template.as_str()])
            .inc();

        tracing::info!(
            from = %self.sender,
            to = %mail.to,
            subject = %format!("{} {}", self.subject_prefix, mail.subject),
            template = %mail.template,
            "Outbound mail"
        );
        tracing::debug!(context = ?mail.context, "Outbound mail context");

        Ok(())
    }
}

/// Test mailer that records every message
#[cfg(test)]
pub struct RecordingMailer {
    pub sent: std::sync::Mutex<Vec<OutgoingMail>>,
}

#[cfg(test)]
impl RecordingMailer {
    pub fn new() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn sent_to(&self, address: &str) -> Vec<OutgoingMail> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|mail| mail.to == address)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}
