//! Client secret and password hashing.
//!
//! Secrets are hashed with Argon2id (default parameters, random `OsRng` salt)
//! and stored in PHC string format.
//!
//! # Example
//!
//! ```
//! use octoauth_core::secret::{generate_client_secret, hash_secret, verify_secret};
//!
//! let secret = generate_client_secret();
//! let hash = hash_secret(&secret).unwrap();
//!
//! assert!(verify_secret(&secret, &hash).unwrap());
//! assert!(!verify_secret("wrong", &hash).unwrap());
//! ```

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::Rng;

use crate::error::AuthError;

/// Generate a new client secret: 32 random bytes, hex encoded.
#[must_use]
pub fn generate_client_secret() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    hex::encode(bytes)
}

/// Hash a secret for storage.
///
/// # Errors
///
/// Returns `AuthError::Internal` if hashing fails.
pub fn hash_secret(secret: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::internal(format!("secret hashing failed: {e}")))
}

/// Verify a secret against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch.
///
/// # Errors
///
/// Returns `AuthError::Internal` only if the stored hash is malformed.
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::internal(format!("stored secret hash is malformed: {e}")))?;
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_client_secret() {
        let secret = generate_client_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, generate_client_secret());
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_secret("s3cret").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_secret("s3cret", &hash).unwrap());
        assert!(!verify_secret("s3cret ", &hash).unwrap());
    }

    #[test]
    fn test_malformed_hash() {
        assert!(matches!(
            verify_secret("s3cret", "plaintext"),
            Err(AuthError::Internal { .. })
        ));
    }
}
