use crate::types::{normalize_email, AppError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::sync::OnceLock;

/// Hashes a password using Argon2id.
///
/// Returns a PHC-formatted hash string with the salt embedded.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Shortest password a user may choose for themselves.
pub const MIN_PASSWORD_LEN: usize = 8;

pub fn check_new_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Verifies a password against a stored PHC hash.
///
/// A stored hash that cannot be parsed is an internal error rather than a
/// failed match.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Initial password for accounts created by an admin or HOD, and the value a
/// password reset falls back to.
pub fn default_password(email: &str) -> String {
    normalize_email(email)
}

/// Hashes the default password for `email`.
pub fn default_password_hash(email: &str) -> Result<String> {
    tracing::warn!(email = %normalize_email(email), "assigning default password");
    hash_password(&default_password(email))
}

/// Runs a verification against a fixed hash so that a lookup miss costs the
/// same as a wrong password.
pub fn verify_dummy(password: &str) {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

    let hash = DUMMY_HASH.get_or_init(|| hash_password("registrar-dummy-password").ok());
    if let Some(hash) = hash {
        let _ = verify_password(password, hash);
    }
}
