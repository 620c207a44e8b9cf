//! Refresh token grant.
//!
//! With rotation enabled, every refresh returns a new refresh token. The
//! presented token is either removed at once or parked in the session's
//! grace slot, from which it can be redeemed one more time. Without
//! rotation the presented token stays valid and no new one is returned.
//!
//! Two concurrent refreshes with the same token race on
//! [`SessionStorage::exchange`]; exactly one wins when the token is
//! consumed.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, info};

use super::IssuedTokens;
use crate::AuthResult;
use crate::config::RefreshTokenGrantConfig;
use crate::error::AuthError;
use crate::storage::{Retirement, SessionStorage, TokenExchange};
use crate::types::{Client, IssuedToken, TokenKind, hash_token};

pub struct RefreshTokenGrant {
    sessions: Arc<dyn SessionStorage>,
    config: RefreshTokenGrantConfig,
    access_token_ttl: Duration,
}

impl RefreshTokenGrant {
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionStorage>,
        config: RefreshTokenGrantConfig,
        access_token_ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            config,
            access_token_ttl,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RefreshTokenGrantConfig {
        &self.config
    }

    fn retirement(&self) -> Retirement {
        match (
            self.config.rotate_refresh_tokens,
            self.config.revoke_rotated_immediately,
        ) {
            (false, _) => Retirement::Keep,
            (true, true) => Retirement::Consume,
            (true, false) => Retirement::Grace,
        }
    }

    /// Redeems a refresh token for a new access token.
    ///
    /// `requested` narrows the new access token's scopes; it must be a subset
    /// of the scopes the refresh token carries. `None` keeps them all.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if `refresh_token` is missing
    /// - `InvalidGrant` if the token is unknown, revoked, expired, or issued
    ///   to another client
    /// - `InvalidScope` if `requested` widens the original scopes
    pub async fn refresh(
        &self,
        client: &Client,
        refresh_token: Option<&str>,
        requested: Option<BTreeSet<String>>,
    ) -> AuthResult<IssuedTokens> {
        let refresh_token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::invalid_request("The refresh_token parameter is required"))?;
        let token_hash = hash_token(refresh_token);
        let now = OffsetDateTime::now_utc();

        let session = self
            .sessions
            .find_by_token(TokenKind::RefreshToken, &token_hash)
            .await?
            .ok_or_else(|| {
                AuthError::invalid_grant("The refresh token is invalid or was revoked")
            })?;
        let presented = session
            .find_token(TokenKind::RefreshToken, &token_hash)
            .ok_or_else(|| AuthError::invalid_grant("The refresh token is invalid"))?;

        if session.client_id != client.client_id {
            return Err(AuthError::invalid_grant(
                "The refresh token was issued to another client",
            ));
        }
        if presented.is_expired_at(now) {
            return Err(AuthError::invalid_grant("The refresh token has expired"));
        }

        let original = presented.scopes.clone();
        let scopes = match requested {
            Some(requested) => {
                if let Some(extra) = requested.iter().find(|s| !original.contains(*s)) {
                    return Err(AuthError::invalid_scope(format!(
                        "Scope '{extra}' was not granted to the refresh token"
                    )));
                }
                requested
            }
            None => original.clone(),
        };

        let (access_value, access) = IssuedToken::mint(self.access_token_ttl, scopes.clone(), now);
        let expires_in = access.expires_in(now);
        let retire = self.retirement();
        let (refresh_value, refresh_record) = if self.config.rotate_refresh_tokens {
            let (value, record) = IssuedToken::mint(self.config.refresh_token_ttl, original, now);
            (Some(value), Some(record))
        } else {
            (None, None)
        };

        let session = self
            .sessions
            .exchange(TokenExchange {
                kind: TokenKind::RefreshToken,
                token_hash,
                client_id: client.client_id.clone(),
                access_token: access,
                refresh_token: refresh_record,
                retire,
                now,
            })
            .await?;

        debug!(session_id = %session.id, retire = ?retire, "Refresh token redeemed");
        info!(
            client_id = %client.client_id,
            session_id = %session.id,
            rotated = refresh_value.is_some(),
            "Access token refreshed"
        );

        Ok(IssuedTokens {
            session_id: session.id,
            access_token: access_value,
            expires_in,
            refresh_token: refresh_value,
            scopes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use crate::types::Session;

    fn scopes(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    async fn seed(storage: &InMemoryStorage, client_id: &str) -> String {
        let now = OffsetDateTime::now_utc();
        let (value, record) =
            IssuedToken::mint(Duration::from_secs(3600), scopes(&["read", "write"]), now);
        let session = Session::new(client_id, Some("alice".into()), scopes(&["read", "write"]), now)
            .with_refresh_token(record);
        SessionStorage::create(storage, &session).await.unwrap();
        value
    }

    fn grant(storage: Arc<InMemoryStorage>, rotate: bool, strict: bool) -> RefreshTokenGrant {
        let config = RefreshTokenGrantConfig {
            rotate_refresh_tokens: rotate,
            revoke_rotated_immediately: strict,
            ..Default::default()
        };
        RefreshTokenGrant::new(storage, config, Duration::from_secs(600))
    }

    fn client() -> Client {
        Client::new("app", "App")
    }

    #[tokio::test]
    async fn test_strict_rotation_consumes_old_token() {
        let storage = Arc::new(InMemoryStorage::new());
        let old = seed(&storage, "app").await;
        let grant = grant(storage, true, true);

        let tokens = grant.refresh(&client(), Some(&old), None).await.unwrap();
        let new = tokens.refresh_token.clone().unwrap();
        assert_ne!(new, old);
        assert_eq!(tokens.expires_in, 600);

        let err = grant.refresh(&client(), Some(&old), None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));

        assert!(grant.refresh(&client(), Some(&new), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_lazy_rotation_allows_one_more_use() {
        let storage = Arc::new(InMemoryStorage::new());
        let old = seed(&storage, "app").await;
        let grant = grant(storage, true, false);

        grant.refresh(&client(), Some(&old), None).await.unwrap();
        grant.refresh(&client(), Some(&old), None).await.unwrap();
        let err = grant.refresh(&client(), Some(&old), None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_without_rotation_token_stays_valid() {
        let storage = Arc::new(InMemoryStorage::new());
        let old = seed(&storage, "app").await;
        let grant = grant(storage, false, true);

        for _ in 0..3 {
            let tokens = grant.refresh(&client(), Some(&old), None).await.unwrap();
            assert!(tokens.refresh_token.is_none());
        }
    }

    #[tokio::test]
    async fn test_scope_narrowing() {
        let storage = Arc::new(InMemoryStorage::new());
        let old = seed(&storage, "app").await;
        let grant = grant(storage, false, true);

        let tokens = grant
            .refresh(&client(), Some(&old), Some(scopes(&["read"])))
            .await
            .unwrap();
        assert_eq!(tokens.scopes, scopes(&["read"]));

        let err = grant
            .refresh(&client(), Some(&old), Some(scopes(&["read", "admin"])))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidScope { .. }));
    }

    #[tokio::test]
    async fn test_other_client_rejected() {
        let storage = Arc::new(InMemoryStorage::new());
        let old = seed(&storage, "app").await;
        let grant = grant(storage, true, true);

        let err = grant
            .refresh(&Client::new("intruder", "Intruder"), Some(&old), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_single_winner() {
        let storage = Arc::new(InMemoryStorage::new());
        let old = seed(&storage, "app").await;
        let grant = Arc::new(grant(storage, true, true));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let grant = grant.clone();
                let old = old.clone();
                tokio::spawn(async move { grant.refresh(&client(), Some(&old), None).await })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }
}
