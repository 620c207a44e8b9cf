//! Client validation for the token and authorization endpoints.

use std::sync::Arc;

use tracing::debug;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::ClientStorage;
use crate::types::{Client, GrantType};

/// Redirect URI chosen for a front-channel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRedirect {
    pub uri: String,
    /// The request named the URI itself rather than relying on the registration.
    pub explicit: bool,
}

/// Validates client identifiers, secrets and allowed grants.
#[derive(Clone)]
pub struct ClientRegistry {
    storage: Arc<dyn ClientStorage>,
    limit_clients_to_grants: bool,
}

impl ClientRegistry {
    #[must_use]
    pub fn new(storage: Arc<dyn ClientStorage>, limit_clients_to_grants: bool) -> Self {
        Self {
            storage,
            limit_clients_to_grants,
        }
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn ClientStorage> {
        &self.storage
    }

    /// Returns `true` if `client` may use `grant` under the current restriction flag.
    #[must_use]
    pub fn permits_grant(&self, client: &Client, grant: GrantType) -> bool {
        !self.limit_clients_to_grants || client.is_grant_type_allowed(grant)
    }

    /// Authenticates a client for the token endpoint.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` if the client is unknown or inactive, a
    /// confidential client's secret is missing or wrong, or the grant is not
    /// allowed for the client while grant restriction is enabled.
    pub async fn validate_client(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
        grant_type: GrantType,
    ) -> AuthResult<Client> {
        let client = self.find_active(client_id).await?;

        if client.is_confidential() {
            let secret = client_secret.ok_or_else(|| {
                AuthError::invalid_client("Client secret required for confidential client")
            })?;
            if !self.storage.verify_secret(client_id, secret).await? {
                return Err(AuthError::invalid_client("Invalid client secret"));
            }
        }

        self.check_grant(&client, grant_type)?;
        Ok(client)
    }

    /// Validates a client on the authorization endpoint, where no secret is
    /// presented, and resolves the redirect URI.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` if the client is unknown, inactive, not allowed
    /// the grant, or the redirect URI does not match the registration.
    pub async fn authorize_client(
        &self,
        client_id: &str,
        redirect_uri: Option<&str>,
        grant_type: GrantType,
    ) -> AuthResult<(Client, ResolvedRedirect)> {
        let client = self.find_active(client_id).await?;
        self.check_grant(&client, grant_type)?;

        let redirect = match redirect_uri {
            Some(uri) if client.is_redirect_uri_allowed(uri) => ResolvedRedirect {
                uri: uri.to_string(),
                explicit: true,
            },
            Some(_) => {
                return Err(AuthError::invalid_client(
                    "redirect_uri does not match the registered redirect URI",
                ));
            }
            None => ResolvedRedirect {
                uri: client.redirect_uri.clone().ok_or_else(|| {
                    AuthError::invalid_client("Client has no registered redirect URI")
                })?,
                explicit: false,
            },
        };

        Ok((client, redirect))
    }

    async fn find_active(&self, client_id: &str) -> AuthResult<Client> {
        let client = self
            .storage
            .find_by_client_id(client_id)
            .await?
            .ok_or_else(|| AuthError::invalid_client("Unknown client"))?;

        if !client.active {
            return Err(AuthError::invalid_client("Client is inactive"));
        }
        Ok(client)
    }

    fn check_grant(&self, client: &Client, grant_type: GrantType) -> AuthResult<()> {
        if self.permits_grant(client, grant_type) {
            return Ok(());
        }
        debug!(
            client_id = %client.client_id,
            grant_type = %grant_type,
            "Grant not allowed for client"
        );
        Err(AuthError::invalid_client(format!(
            "Client is not allowed to use the {grant_type} grant"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::hash_secret;
    use crate::storage::InMemoryStorage;

    async fn registry(limit: bool) -> ClientRegistry {
        let storage = Arc::new(InMemoryStorage::new());
        let confidential = Client::new("svc", "Service")
            .with_secret_hash(hash_secret("s3cret").unwrap())
            .with_grant(GrantType::ClientCredentials);
        let public = Client::new("spa", "SPA")
            .with_redirect_uri("https://spa.example.com/cb")
            .with_grant(GrantType::Implicit);
        let mut inactive = Client::new("old", "Retired");
        inactive.active = false;
        for client in [confidential, public, inactive] {
            ClientStorage::create(storage.as_ref(), &client).await.unwrap();
        }
        ClientRegistry::new(storage, limit)
    }

    #[tokio::test]
    async fn test_validate_client_success() {
        let registry = registry(true).await;
        let client = registry
            .validate_client("svc", Some("s3cret"), GrantType::ClientCredentials)
            .await
            .unwrap();
        assert_eq!(client.client_id, "svc");
    }

    #[tokio::test]
    async fn test_validate_client_each_mismatch_fails() {
        let registry = registry(true).await;
        let cases = [
            ("ghost", Some("s3cret"), GrantType::ClientCredentials),
            ("svc", Some("wrong"), GrantType::ClientCredentials),
            ("svc", None, GrantType::ClientCredentials),
            ("svc", Some("s3cret"), GrantType::Password),
            ("old", None, GrantType::Password),
        ];
        for (id, secret, grant) in cases {
            let err = registry.validate_client(id, secret, grant).await.unwrap_err();
            assert!(
                matches!(err, AuthError::InvalidClient { .. }),
                "{id}/{secret:?}/{grant}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn test_grant_restriction_flag() {
        let registry = registry(false).await;
        assert!(registry
            .validate_client("svc", Some("s3cret"), GrantType::Password)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_public_client_needs_no_secret() {
        let registry = registry(true).await;
        assert!(registry
            .validate_client("spa", None, GrantType::Implicit)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_authorize_client_redirect_resolution() {
        let registry = registry(true).await;

        let (_, redirect) = registry
            .authorize_client("spa", None, GrantType::Implicit)
            .await
            .unwrap();
        assert_eq!(redirect.uri, "https://spa.example.com/cb");
        assert!(!redirect.explicit);

        let (_, redirect) = registry
            .authorize_client("spa", Some("https://spa.example.com/cb"), GrantType::Implicit)
            .await
            .unwrap();
        assert!(redirect.explicit);

        let err = registry
            .authorize_client("spa", Some("https://evil.example.com/cb"), GrantType::Implicit)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidClient { .. }));
    }
}
