//! Authorization code grant.
//!
//! `code_issued -> exchanged -> access_token_issued`. The code is one-time:
//! the exchange removes it in the same storage step that installs the access
//! token, so a replayed code finds nothing and fails with `InvalidGrant`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, info};

use super::{IssuedTokens, RefreshIssuance};
use crate::AuthResult;
use crate::config::AuthorizationCodeGrantConfig;
use crate::error::AuthError;
use crate::registry::ResolvedRedirect;
use crate::storage::{Retirement, SessionStorage, TokenExchange};
use crate::types::{Client, IssuedToken, Session, TokenKind, hash_token};

pub struct AuthorizationCodeGrant {
    sessions: Arc<dyn SessionStorage>,
    config: AuthorizationCodeGrantConfig,
    access_token_ttl: Duration,
}

impl AuthorizationCodeGrant {
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionStorage>,
        config: AuthorizationCodeGrantConfig,
        access_token_ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            config,
            access_token_ttl,
        }
    }

    /// Starts a session for an approved request and returns the code.
    pub async fn issue_code(
        &self,
        client: &Client,
        owner_id: &str,
        scopes: BTreeSet<String>,
        redirect: &ResolvedRedirect,
    ) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc();
        let (code, record) = IssuedToken::mint(self.config.auth_token_ttl, scopes.clone(), now);
        let record = record.with_redirect_uri(redirect.explicit.then(|| redirect.uri.clone()));

        let session = Session::new(&client.client_id, Some(owner_id.to_string()), scopes, now)
            .with_authorization_code(record);
        self.sessions.create(&session).await?;

        debug!(
            client_id = %client.client_id,
            session_id = %session.id,
            "Authorization code issued"
        );
        Ok(code)
    }

    /// Exchanges a code for an access token (and optionally a refresh token).
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if `code` is missing
    /// - `InvalidGrant` if the code is unknown, already exchanged, expired,
    ///   issued to another client, or `redirect_uri` does not match
    pub async fn exchange(
        &self,
        client: &Client,
        code: Option<&str>,
        redirect_uri: Option<&str>,
        refresh: RefreshIssuance,
    ) -> AuthResult<IssuedTokens> {
        let code = code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::invalid_request("The code parameter is required"))?;
        let code_hash = hash_token(code);
        let now = OffsetDateTime::now_utc();

        let session = self
            .sessions
            .find_by_token(TokenKind::AuthorizationCode, &code_hash)
            .await?
            .ok_or_else(|| {
                AuthError::invalid_grant("The authorization code is invalid or was already used")
            })?;
        let issued = session
            .find_token(TokenKind::AuthorizationCode, &code_hash)
            .ok_or_else(|| AuthError::invalid_grant("The authorization code is invalid"))?;

        if session.client_id != client.client_id {
            return Err(AuthError::invalid_grant(
                "The authorization code was issued to another client",
            ));
        }
        if issued.is_expired_at(now) {
            return Err(AuthError::invalid_grant("The authorization code has expired"));
        }
        check_redirect(issued.redirect_uri.as_deref(), redirect_uri, client)?;

        let scopes = issued.scopes.clone();
        let (access_value, access) = IssuedToken::mint(self.access_token_ttl, scopes.clone(), now);
        let expires_in = access.expires_in(now);
        let (refresh_value, refresh_record) = match refresh {
            RefreshIssuance::Issue => {
                let (value, record) =
                    IssuedToken::mint(self.config.refresh_token_ttl, scopes.clone(), now);
                (Some(value), Some(record))
            }
            RefreshIssuance::Skip => (None, None),
        };

        let session = self
            .sessions
            .exchange(TokenExchange {
                kind: TokenKind::AuthorizationCode,
                token_hash: code_hash,
                client_id: client.client_id.clone(),
                access_token: access,
                refresh_token: refresh_record,
                retire: Retirement::Consume,
                now,
            })
            .await?;

        info!(
            client_id = %client.client_id,
            session_id = %session.id,
            refresh = refresh_value.is_some(),
            "Authorization code exchanged"
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

/// A redirect URI named on the authorization request must be repeated
/// verbatim; otherwise any URI sent must be the registered one.
fn check_redirect(expected: Option<&str>, given: Option<&str>, client: &Client) -> AuthResult<()> {
    let matches = match (expected, given) {
        (Some(expected), Some(given)) => expected == given,
        (Some(_), None) => false,
        (None, Some(given)) => client.is_redirect_uri_allowed(given),
        (None, None) => true,
    };
    if matches {
        Ok(())
    } else {
        Err(AuthError::invalid_grant(
            "redirect_uri does not match the authorization request",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use crate::types::GrantType;

    const CALLBACK: &str = "https://app.example.com/cb";

    fn setup() -> (Arc<InMemoryStorage>, AuthorizationCodeGrant, Client) {
        let storage = Arc::new(InMemoryStorage::new());
        let grant = AuthorizationCodeGrant::new(
            storage.clone(),
            AuthorizationCodeGrantConfig::default(),
            Duration::from_secs(3600),
        );
        let client = Client::new("web", "Web App")
            .with_redirect_uri(CALLBACK)
            .with_grant(GrantType::AuthorizationCode);
        (storage, grant, client)
    }

    fn redirect(explicit: bool) -> ResolvedRedirect {
        ResolvedRedirect {
            uri: CALLBACK.to_string(),
            explicit,
        }
    }

    fn scopes() -> BTreeSet<String> {
        BTreeSet::from(["read".to_string()])
    }

    #[tokio::test]
    async fn test_code_exchanged_exactly_once() {
        let (_, grant, client) = setup();
        let code = grant
            .issue_code(&client, "alice", scopes(), &redirect(true))
            .await
            .unwrap();

        let tokens = grant
            .exchange(&client, Some(&code), Some(CALLBACK), RefreshIssuance::Skip)
            .await
            .unwrap();
        assert_eq!(tokens.scopes, scopes());
        assert_eq!(tokens.expires_in, 3600);
        assert!(tokens.refresh_token.is_none());

        let err = grant
            .exchange(&client, Some(&code), Some(CALLBACK), RefreshIssuance::Skip)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_refresh_token_attached_on_request() {
        let (_, grant, client) = setup();
        let code = grant
            .issue_code(&client, "alice", scopes(), &redirect(false))
            .await
            .unwrap();
        let tokens = grant
            .exchange(&client, Some(&code), None, RefreshIssuance::Issue)
            .await
            .unwrap();
        assert!(tokens.refresh_token.is_some());
    }

    #[tokio::test]
    async fn test_redirect_mismatch_keeps_code_usable() {
        let (_, grant, client) = setup();
        let code = grant
            .issue_code(&client, "alice", scopes(), &redirect(true))
            .await
            .unwrap();

        for wrong in [None, Some("https://app.example.com/other")] {
            let err = grant
                .exchange(&client, Some(&code), wrong, RefreshIssuance::Skip)
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidGrant { .. }));
        }

        assert!(grant
            .exchange(&client, Some(&code), Some(CALLBACK), RefreshIssuance::Skip)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_code_bound_to_client() {
        let (_, grant, client) = setup();
        let code = grant
            .issue_code(&client, "alice", scopes(), &redirect(false))
            .await
            .unwrap();
        let other = Client::new("other", "Other").with_redirect_uri(CALLBACK);

        let err = grant
            .exchange(&other, Some(&code), None, RefreshIssuance::Skip)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_expired_code() {
        let (storage, grant, client) = setup();
        let issued_at = OffsetDateTime::now_utc() - Duration::from_secs(3600);
        let (code, record) = IssuedToken::mint(Duration::from_secs(60), scopes(), issued_at);
        let session = Session::new("web", Some("alice".into()), scopes(), issued_at)
            .with_authorization_code(record);
        SessionStorage::create(storage.as_ref(), &session).await.unwrap();

        let err = grant
            .exchange(&client, Some(&code), None, RefreshIssuance::Skip)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[tokio::test]
    async fn test_missing_code() {
        let (_, grant, client) = setup();
        let err = grant
            .exchange(&client, None, None, RefreshIssuance::Skip)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));
    }
}
