//! Resource owner password credentials grant.
//!
//! User authentication is delegated to the injected [`CredentialVerifier`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{info, warn};

use super::{CredentialVerifier, IssuedTokens, RefreshIssuance};
use crate::AuthResult;
use crate::config::PasswordGrantConfig;
use crate::error::AuthError;
use crate::storage::SessionStorage;
use crate::types::{Client, IssuedToken, Session};

pub struct PasswordGrant {
    sessions: Arc<dyn SessionStorage>,
    verifier: Arc<dyn CredentialVerifier>,
    config: PasswordGrantConfig,
    access_token_ttl: Duration,
}

impl PasswordGrant {
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionStorage>,
        verifier: Arc<dyn CredentialVerifier>,
        config: PasswordGrantConfig,
        access_token_ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            verifier,
            config,
            access_token_ttl,
        }
    }

    /// Verifies the user and issues tokens.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if `username` or `password` is missing
    /// - `InvalidGrant` if the verifier rejects the credentials
    pub async fn issue(
        &self,
        client: &Client,
        username: Option<&str>,
        password: Option<&str>,
        scopes: BTreeSet<String>,
        refresh: RefreshIssuance,
    ) -> AuthResult<IssuedTokens> {
        let username = username
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AuthError::invalid_request("The username parameter is required"))?;
        let password = password
            .ok_or_else(|| AuthError::invalid_request("The password parameter is required"))?;

        let Some(owner_id) = self.verifier.verify(username, password).await? else {
            warn!(client_id = %client.client_id, "Password grant rejected user credentials");
            return Err(AuthError::invalid_grant("The user credentials were incorrect"));
        };

        let now = OffsetDateTime::now_utc();
        let (access_value, access) = IssuedToken::mint(self.access_token_ttl, scopes.clone(), now);
        let expires_in = access.expires_in(now);

        let mut session = Session::new(&client.client_id, Some(owner_id), scopes.clone(), now)
            .with_access_token(access);
        let refresh_value = match refresh {
            RefreshIssuance::Issue => {
                let (value, record) =
                    IssuedToken::mint(self.config.refresh_token_ttl, scopes.clone(), now);
                session = session.with_refresh_token(record);
                Some(value)
            }
            RefreshIssuance::Skip => None,
        };
        self.sessions.create(&session).await?;

        info!(
            client_id = %client.client_id,
            session_id = %session.id,
            refresh = refresh_value.is_some(),
            "Password grant tokens issued"
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
