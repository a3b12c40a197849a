//! Password credential hashing
//!
//! Argon2id with per-credential random salt. The plaintext form is
//! accepted transiently, hashed off the async executor, and never
//! stored or returned. Hashing and verification run on the blocking
//! pool since argon2 is deliberately CPU-expensive.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};

use crate::error::AppError;

/// Minimum accepted password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a plaintext password
pub async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
    })
    .await
    .map_err(|e| AppError::Internal(e.into()))?
}

/// Verify a plaintext password against a stored hash
///
/// A mismatch is a normal `false`, not an error; only malformed
/// stored hashes surface as errors.
pub async fn verify_password(password: String, stored_hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored_hash)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("malformed password hash: {e}")))?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Internal(anyhow::anyhow!(
                "password verification failed: {e}"
            ))),
        }
    })
    .await
    .map_err(|e| AppError::Internal(e.into()))?
}
