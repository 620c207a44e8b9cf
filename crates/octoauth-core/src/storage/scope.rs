//! Scope storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Scope;

/// Storage operations for scope registrations.
#[async_trait]
pub trait ScopeStorage: Send + Sync {
    /// Find a scope by identifier.
    async fn find(&self, id: &str) -> AuthResult<Option<Scope>>;

    /// Register a scope, replacing any existing one with the same identifier.
    async fn create(&self, scope: &Scope) -> AuthResult<Scope>;

    /// List all scopes ordered by identifier.
    async fn list(&self) -> AuthResult<Vec<Scope>>;
}
