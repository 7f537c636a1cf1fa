//! Password hashing.

use crate::error::AuthError;

/// Default bcrypt cost factor
pub const BCRYPT_COST: u32 = 12;

/// Hash a password with bcrypt
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

/// Verify a password against a bcrypt hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    bcrypt::verify(password, hash)
}

/// Hash on the blocking pool; bcrypt is deliberately slow.
pub async fn hash_password_blocking(password: String, cost: u32) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Verify on the blocking pool. A malformed stored hash counts as a mismatch.
pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool, AuthError> {
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?;
    match verified {
        Ok(ok) => Ok(ok),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash could not be verified");
            Ok(false)
        }
    }
}
