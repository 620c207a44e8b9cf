//! Resource owner credential verification.
//!
//! The password grant and the consent endpoint both delegate user
//! authentication to a [`CredentialVerifier`] supplied when the server is
//! assembled.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::AuthResult;
use crate::secret;

/// Verifies resource owner credentials.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Returns the owner identifier when the credentials are valid, `None`
    /// when they are not.
    ///
    /// # Errors
    ///
    /// Returns an error only when verification itself failed (e.g. the user
    /// directory is unreachable).
    async fn verify(&self, username: &str, password: &str) -> AuthResult<Option<String>>;
}

#[derive(Debug, Clone)]
struct StaticUser {
    owner_id: String,
    password_hash: String,
}

/// Verifier over a fixed set of users with Argon2-hashed passwords.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialVerifier {
    users: HashMap<String, StaticUser>,
}

impl StaticCredentialVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user whose password is already hashed.
    #[must_use]
    pub fn with_user(
        mut self,
        username: impl Into<String>,
        owner_id: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        self.users.insert(
            username.into(),
            StaticUser {
                owner_id: owner_id.into(),
                password_hash: password_hash.into(),
            },
        );
        self
    }

    /// Hashes `password` and adds the user.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if hashing fails.
    pub fn add_user(
        &mut self,
        username: impl Into<String>,
        owner_id: impl Into<String>,
        password: &str,
    ) -> AuthResult<()> {
        let password_hash = secret::hash_secret(password)?;
        self.users.insert(
            username.into(),
            StaticUser {
                owner_id: owner_id.into(),
                password_hash,
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentialVerifier {
    async fn verify(&self, username: &str, password: &str) -> AuthResult<Option<String>> {
        let Some(user) = self.users.get(username) else {
            return Ok(None);
        };
        if secret::verify_secret(password, &user.password_hash)? {
            Ok(Some(user.owner_id.clone()))
        } else {
            Ok(None)
        }
    }
}
