//! Input validation
//!
//! Explicit validation functions per input shape, decoupled from the
//! entities they feed. Each returns the ordered list of field-level
//! problems so callers can surface all of them at once.

use crate::auth::password::MIN_PASSWORD_LENGTH;
use crate::error::AppError;

const MAX_EMAIL_LENGTH: usize = 64;
const MAX_USERNAME_LENGTH: usize = 64;
const MAX_PROFILE_FIELD_LENGTH: usize = 64;

/// A single field-level validation problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Collapse field errors into one `Validation` error
pub fn into_app_error(errors: Vec<FieldError>) -> AppError {
    let joined = errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ");
    AppError::Validation(joined)
}

fn check_email(errors: &mut Vec<FieldError>, email: &str) {
    if email.is_empty() {
        errors.push(FieldError::new("email", "must not be empty"));
    } else if email.len() > MAX_EMAIL_LENGTH {
        errors.push(FieldError::new("email", "too long"));
    } else if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        errors.push(FieldError::new("email", "not a valid email address"));
    }
}

fn check_password(errors: &mut Vec<FieldError>, field: &'static str, password: &str) {
    if password.len() < MIN_PASSWORD_LENGTH {
        errors.push(FieldError::new(
            field,
            format!("must be at least {} characters", MIN_PASSWORD_LENGTH),
        ));
    }
}

fn check_username(errors: &mut Vec<FieldError>, username: &str) {
    if username.is_empty() {
        errors.push(FieldError::new("username", "must not be empty"));
        return;
    }
    if username.len() > MAX_USERNAME_LENGTH {
        errors.push(FieldError::new("username", "too long"));
    }
    if !username.starts_with(|c: char| c.is_ascii_alphabetic()) {
        errors.push(FieldError::new("username", "must start with a letter"));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        errors.push(FieldError::new(
            "username",
            "may only contain letters, digits, dots and underscores",
        ));
    }
}

/// Validate a registration request
pub fn registration(email: &str, username: &str, password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    check_email(&mut errors, email);
    check_username(&mut errors, username);
    check_password(&mut errors, "password", password);
    errors
}

/// Validate a new password (change and reset flows)
pub fn new_password(password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    check_password(&mut errors, "password", password);
    errors
}

/// Validate an administrative account edit
pub fn admin_account(email: &str, username: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    check_email(&mut errors, email);
    check_username(&mut errors, username);
    errors
}

/// Validate a proposed new email address
pub fn email_change(new_email: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    check_email(&mut errors, new_email);
    errors
}

/// Validate profile edits
pub fn profile(name: Option<&str>, location: Option<&str>) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if let Some(name) = name {
        if name.len() > MAX_PROFILE_FIELD_LENGTH {
            errors.push(FieldError::new("name", "too long"));
        }
    }
    if let Some(location) = location {
        if location.len() > MAX_PROFILE_FIELD_LENGTH {
            errors.push(FieldError::new("location", "too long"));
        }
    }
    errors
}

/// Validate a post or comment body
pub fn body(body: &str) -> Vec<FieldError> {
    if body.trim().is_empty() {
        vec![FieldError::new("body", "must not be empty")]
    } else {
        Vec::new()
    }
}
