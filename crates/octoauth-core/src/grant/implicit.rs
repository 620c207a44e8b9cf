//! Implicit grant: an access token straight from the authorization
//! endpoint, with no code and no refresh token.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::info;

use super::IssuedTokens;
use crate::AuthResult;
use crate::storage::SessionStorage;
use crate::types::{Client, IssuedToken, Session};

pub struct ImplicitGrant {
    sessions: Arc<dyn SessionStorage>,
    access_token_ttl: Duration,
}

impl ImplicitGrant {
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStorage>, access_token_ttl: Duration) -> Self {
        Self {
            sessions,
            access_token_ttl,
        }
    }

    /// Issues an access token for an approved request.
    pub async fn issue(
        &self,
        client: &Client,
        owner_id: &str,
        scopes: BTreeSet<String>,
    ) -> AuthResult<IssuedTokens> {
        let now = OffsetDateTime::now_utc();
        let (value, access) = IssuedToken::mint(self.access_token_ttl, scopes.clone(), now);
        let expires_in = access.expires_in(now);

        let session = Session::new(
            &client.client_id,
            Some(owner_id.to_string()),
            scopes.clone(),
            now,
        )
        .with_access_token(access);
        self.sessions.create(&session).await?;

        info!(
            client_id = %client.client_id,
            session_id = %session.id,
            "Implicit access token issued"
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
