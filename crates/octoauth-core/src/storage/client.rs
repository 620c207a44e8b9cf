//! Client storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Client;

// =============================================================================
// Client Storage Trait
// =============================================================================

/// Storage operations for OAuth 2.0 client registrations.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Find a client by its OAuth client_id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>>;

    /// Register a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The client validation fails
    /// - A client with the same client_id already exists
    /// - The storage operation fails
    async fn create(&self, client: &Client) -> AuthResult<Client>;

    /// Administrative update of an existing client.
    ///
    /// # Errors
    ///
    /// Returns an error if the client doesn't exist, fails validation, or the
    /// storage operation fails.
    async fn update(&self, client_id: &str, client: &Client) -> AuthResult<Client>;

    /// Delete a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the client doesn't exist or the storage operation fails.
    async fn delete(&self, client_id: &str) -> AuthResult<()>;

    /// List clients ordered by client_id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list(&self, limit: usize, offset: usize) -> AuthResult<Vec<Client>>;

    /// Verify a client secret against the stored hash.
    ///
    /// Returns `Ok(false)` if the secret doesn't match or the client has no secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the client doesn't exist or the storage operation fails.
    async fn verify_secret(&self, client_id: &str, secret: &str) -> AuthResult<bool>;
}
