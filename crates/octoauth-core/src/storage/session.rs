//! Session storage trait.
//!
//! Sessions own their authorization code, access token and refresh token.
//! Grant processors mutate sessions only through [`SessionStorage::exchange`],
//! which redeems a code or refresh token and installs the replacement tokens
//! as one atomic step.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::{IssuedToken, Session, TokenKind};

/// What happens to the presented token during an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retirement {
    /// Remove the presented token.
    Consume,
    /// Move the presented refresh token to the grace slot, where it can be
    /// redeemed exactly once more.
    Grace,
    /// Leave the presented token in place (refresh without rotation).
    Keep,
}

/// An atomic redemption of an authorization code or refresh token.
#[derive(Debug, Clone)]
pub struct TokenExchange {
    /// `AuthorizationCode` or `RefreshToken`.
    pub kind: TokenKind,

    /// Hash of the presented code or refresh token.
    pub token_hash: String,

    /// Client redeeming the token; must own the session.
    pub client_id: String,

    /// Replaces the session's access token.
    pub access_token: IssuedToken,

    /// Replaces the session's refresh token when present.
    pub refresh_token: Option<IssuedToken>,

    pub retire: Retirement,

    pub now: OffsetDateTime,
}

/// Storage operations for authorization sessions.
///
/// # Example
///
/// ```ignore
/// use octoauth_core::storage::SessionStorage;
///
/// async fn lookup(storage: &dyn SessionStorage, hash: &str) -> AuthResult<()> {
///     if let Some(session) = storage.find_by_token(TokenKind::AccessToken, hash).await? {
///         println!("token belongs to {}", session.client_id);
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Persists a new session together with the tokens it already holds.
    ///
    /// # Errors
    ///
    /// Returns an error if a session with the same id exists or the storage
    /// operation fails.
    async fn create(&self, session: &Session) -> AuthResult<()>;

    /// Finds a session by id.
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Session>>;

    /// Finds the session holding a token of `kind` with the given hash.
    ///
    /// Expired tokens are still returned; callers check expiry.
    async fn find_by_token(&self, kind: TokenKind, token_hash: &str)
    -> AuthResult<Option<Session>>;

    /// Redeems a code or refresh token and installs the new tokens.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGrant` without changing anything if the presented
    /// token is unknown, already redeemed, expired, owned by another client,
    /// or its session no longer exists.
    ///
    /// # Atomicity
    ///
    /// Implementations must perform the check and the write as one unit, so
    /// that two concurrent redemptions of the same token cannot both succeed.
    /// With SQL this is a conditional update inside one transaction:
    ///
    /// ```sql
    /// UPDATE sessions SET ... WHERE refresh_token_hash = $1 AND refresh_expires_at > NOW()
    /// RETURNING *
    /// ```
    async fn exchange(&self, exchange: TokenExchange) -> AuthResult<Session>;

    /// Deletes a session and all its tokens.
    ///
    /// Returns `false` if the session did not exist.
    async fn revoke(&self, id: Uuid) -> AuthResult<bool>;

    /// Deletes every session of a client. Returns the number removed.
    async fn revoke_by_client(&self, client_id: &str) -> AuthResult<u64>;

    /// Deletes sessions whose every token expired at or before `now`.
    /// Returns the number removed.
    async fn delete_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;

    /// Number of stored sessions.
    async fn count(&self) -> AuthResult<usize>;
}
