//! Client credentials grant.
//!
//! Single step: the authenticated client is its own resource owner. The
//! token never carries a scope the client registration does not list, and
//! no refresh token is issued.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::info;

use super::IssuedTokens;
use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::SessionStorage;
use crate::types::{Client, IssuedToken, Session};

pub struct ClientCredentialsGrant {
    sessions: Arc<dyn SessionStorage>,
    access_token_ttl: Duration,
}

impl ClientCredentialsGrant {
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStorage>, access_token_ttl: Duration) -> Self {
        Self {
            sessions,
            access_token_ttl,
        }
    }

    /// Issues an access token to an authenticated confidential client.
    ///
    /// # Errors
    ///
    /// - `InvalidClient` if the client is public
    /// - `InvalidScope` if a scope is not listed on the client registration
    pub async fn issue(
        &self,
        client: &Client,
        scopes: BTreeSet<String>,
    ) -> AuthResult<IssuedTokens> {
        if !client.is_confidential() {
            return Err(AuthError::invalid_client(
                "The client_credentials grant requires a confidential client",
            ));
        }
        if let Some(scope) = scopes.iter().find(|s| !client.is_scope_allowed(s)) {
            return Err(AuthError::invalid_scope(format!(
                "Scope '{scope}' is not owned by this client"
            )));
        }

        let now = OffsetDateTime::now_utc();
        let (value, access) = IssuedToken::mint(self.access_token_ttl, scopes.clone(), now);
        let expires_in = access.expires_in(now);

        let session =
            Session::new(&client.client_id, None, scopes.clone(), now).with_access_token(access);
        self.sessions.create(&session).await?;

        info!(
            client_id = %client.client_id,
            session_id = %session.id,
            "Client credentials token issued"
        );

        Ok(IssuedTokens {
            session_id: session.id,
            access_token: value,
            expires_in,
            refresh_token: None,
            scopes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    fn grant() -> ClientCredentialsGrant {
        ClientCredentialsGrant::new(Arc::new(InMemoryStorage::new()), Duration::from_secs(600))
    }

    fn service() -> Client {
        Client::new("svc", "Service")
            .with_secret_hash("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA")
            .with_scope("read")
    }

    #[tokio::test]
    async fn test_issue_without_refresh_token() {
        let tokens = grant()
            .issue(&service(), BTreeSet::from(["read".to_string()]))
            .await
            .unwrap();
        assert_eq!(tokens.expires_in, 600);
        assert!(tokens.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_scope_outside_client_rejected() {
        let err = grant()
            .issue(&service(), BTreeSet::from(["write".to_string()]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidScope { .. }));
    }

    #[tokio::test]
    async fn test_public_client_rejected() {
        let err = grant()
            .issue(&Client::new("spa", "SPA"), BTreeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidClient { .. }));
    }
}
