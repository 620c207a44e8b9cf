//! Authorization server facade.
//!
//! [`AuthorizationServer`] owns the registries and one processor per enabled
//! grant. Everything it needs is passed in through
//! [`AuthorizationServerBuilder`]; nothing is resolved from globals.
//!
//! # Usage
//!
//! ```ignore
//! let storage = Arc::new(InMemoryStorage::new());
//! let server = AuthorizationServer::builder(config)
//!     .in_memory(storage)
//!     .credential_verifier(Arc::new(verifier))
//!     .build()?;
//!
//! let response = server
//!     .issue_access_token(&request, ClientCredentials::new("svc", Some("secret")))
//!     .await?;
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::AuthResult;
use crate::config::OAuthServerConfig;
use crate::error::AuthError;
use crate::grant::{
    AuthorizationCodeGrant, AuthorizationRequestDetails, AuthorizeRejection, AuthorizeRequest,
    ClientCredentials, ClientCredentialsGrant, CredentialVerifier, ImplicitGrant, PasswordGrant,
    RefreshIssuance, RefreshTokenGrant, ResponseType, TokenRequest, TokenResponse,
};
use crate::registry::{ClientRegistry, ScopeRegistry, ScopeSettings};
use crate::storage::{ClientStorage, InMemoryStorage, ScopeStorage, SessionStorage};
use crate::sweeper::ExpirySweeper;
use crate::types::{Client, GrantType};
use crate::validator::TokenValidator;

// =============================================================================
// Builder
// =============================================================================

/// Assembles an [`AuthorizationServer`] from explicit dependencies.
pub struct AuthorizationServerBuilder {
    config: OAuthServerConfig,
    client_storage: Option<Arc<dyn ClientStorage>>,
    scope_storage: Option<Arc<dyn ScopeStorage>>,
    session_storage: Option<Arc<dyn SessionStorage>>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
}

impl AuthorizationServerBuilder {
    #[must_use]
    pub fn new(config: OAuthServerConfig) -> Self {
        Self {
            config,
            client_storage: None,
            scope_storage: None,
            session_storage: None,
            verifier: None,
        }
    }

    #[must_use]
    pub fn client_storage(mut self, storage: Arc<dyn ClientStorage>) -> Self {
        self.client_storage = Some(storage);
        self
    }

    #[must_use]
    pub fn scope_storage(mut self, storage: Arc<dyn ScopeStorage>) -> Self {
        self.scope_storage = Some(storage);
        self
    }

    #[must_use]
    pub fn session_storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.session_storage = Some(storage);
        self
    }

    /// Uses one in-memory store for clients, scopes and sessions.
    #[must_use]
    pub fn in_memory(self, storage: Arc<InMemoryStorage>) -> Self {
        self.client_storage(storage.clone())
            .scope_storage(storage.clone())
            .session_storage(storage)
    }

    #[must_use]
    pub fn credential_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Validates the configuration and wires the grant processors.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the configuration is invalid, a storage is
    /// missing, or the password grant is enabled without a credential
    /// verifier.
    pub fn build(self) -> AuthResult<AuthorizationServer> {
        let config = self.config;
        config
            .validate()
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        let client_storage = self
            .client_storage
            .ok_or_else(|| AuthError::configuration("client storage is required"))?;
        let scope_storage = self
            .scope_storage
            .ok_or_else(|| AuthError::configuration("scope storage is required"))?;
        let sessions = self
            .session_storage
            .ok_or_else(|| AuthError::configuration("session storage is required"))?;

        let grants = &config.grants;
        let password = match (&grants.password, &self.verifier) {
            (Some(password), Some(verifier)) => Some(PasswordGrant::new(
                sessions.clone(),
                verifier.clone(),
                password.clone(),
                config.access_token_ttl_for(GrantType::Password),
            )),
            (Some(_), None) => {
                return Err(AuthError::configuration(
                    "the password grant requires a credential verifier",
                ));
            }
            (None, _) => None,
        };

        let server = AuthorizationServer {
            clients: ClientRegistry::new(client_storage, config.limit_clients_to_grants),
            scopes: ScopeRegistry::new(scope_storage, ScopeSettings::from_config(&config)),
            authorization_code: grants.authorization_code.as_ref().map(|code| {
                AuthorizationCodeGrant::new(
                    sessions.clone(),
                    code.clone(),
                    config.access_token_ttl_for(GrantType::AuthorizationCode),
                )
            }),
            implicit: grants.implicit.as_ref().map(|_| {
                ImplicitGrant::new(
                    sessions.clone(),
                    config.access_token_ttl_for(GrantType::Implicit),
                )
            }),
            client_credentials: grants.client_credentials.as_ref().map(|_| {
                ClientCredentialsGrant::new(
                    sessions.clone(),
                    config.access_token_ttl_for(GrantType::ClientCredentials),
                )
            }),
            password,
            refresh_token: grants.refresh_token.as_ref().map(|refresh| {
                RefreshTokenGrant::new(
                    sessions.clone(),
                    refresh.clone(),
                    config.access_token_ttl_for(GrantType::RefreshToken),
                )
            }),
            sessions,
            verifier: self.verifier,
            config,
        };

        info!(
            grants = ?server.config.enabled_grants(),
            limit_clients_to_grants = server.config.limit_clients_to_grants,
            limit_clients_to_scopes = server.config.limit_clients_to_scopes,
            limit_scopes_to_grants = server.config.limit_scopes_to_grants,
            "Authorization server assembled"
        );
        Ok(server)
    }
}

// =============================================================================
// Server
// =============================================================================

pub struct AuthorizationServer {
    config: OAuthServerConfig,
    clients: ClientRegistry,
    scopes: ScopeRegistry,
    sessions: Arc<dyn SessionStorage>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
    authorization_code: Option<AuthorizationCodeGrant>,
    implicit: Option<ImplicitGrant>,
    client_credentials: Option<ClientCredentialsGrant>,
    password: Option<PasswordGrant>,
    refresh_token: Option<RefreshTokenGrant>,
}

impl AuthorizationServer {
    #[must_use]
    pub fn builder(config: OAuthServerConfig) -> AuthorizationServerBuilder {
        AuthorizationServerBuilder::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &OAuthServerConfig {
        &self.config
    }

    #[must_use]
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    #[must_use]
    pub fn scopes(&self) -> &ScopeRegistry {
        &self.scopes
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<dyn SessionStorage> {
        &self.sessions
    }

    /// A validator over this server's sessions.
    #[must_use]
    pub fn token_validator(&self) -> TokenValidator {
        TokenValidator::new(self.sessions.clone())
            .with_http_headers_only(self.config.http_headers_only)
    }

    /// A sweeper over this server's sessions.
    #[must_use]
    pub fn expiry_sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(self.sessions.clone(), self.config.sweeper.interval)
    }

    /// Handles a token endpoint request.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if `grant_type` is missing
    /// - `UnsupportedGrantType` if the grant is unknown, disabled, or only
    ///   reachable through the authorization endpoint
    /// - `InvalidClient` if client authentication fails
    /// - Any error of the grant processor
    pub async fn issue_access_token(
        &self,
        request: &TokenRequest,
        credentials: ClientCredentials,
    ) -> AuthResult<TokenResponse> {
        if request.grant_type.is_empty() {
            return Err(AuthError::invalid_request("The grant_type parameter is required"));
        }
        let grant: GrantType = request
            .grant_type
            .parse()
            .map_err(|_| AuthError::unsupported_grant_type(&request.grant_type))?;
        if grant == GrantType::Implicit || !self.config.is_grant_enabled(grant) {
            return Err(AuthError::unsupported_grant_type(grant.as_str()));
        }

        let client = self
            .clients
            .validate_client(
                &credentials.client_id,
                credentials.client_secret.as_deref(),
                grant,
            )
            .await?;
        let refresh = self.refresh_issuance(&client);

        debug!(client_id = %client.client_id, grant_type = %grant, "Token request accepted");

        let issued = match grant {
            GrantType::AuthorizationCode => {
                enabled(&self.authorization_code, grant)?
                    .exchange(
                        &client,
                        request.code.as_deref(),
                        request.redirect_uri.as_deref(),
                        refresh,
                    )
                    .await?
            }
            GrantType::ClientCredentials => {
                let scopes = self
                    .scopes
                    .resolve_scopes(request.scope.as_deref(), &client, grant)
                    .await?;
                enabled(&self.client_credentials, grant)?
                    .issue(&client, scopes)
                    .await?
            }
            GrantType::Password => {
                let scopes = self
                    .scopes
                    .resolve_scopes(request.scope.as_deref(), &client, grant)
                    .await?;
                enabled(&self.password, grant)?
                    .issue(
                        &client,
                        request.username.as_deref(),
                        request.password.as_deref(),
                        scopes,
                        refresh,
                    )
                    .await?
            }
            GrantType::RefreshToken => {
                let requested = request
                    .scope
                    .as_deref()
                    .map(|scope| self.scopes.parse(scope))
                    .filter(|ids| !ids.is_empty())
                    .map(|ids| ids.into_iter().collect::<BTreeSet<_>>());
                enabled(&self.refresh_token, grant)?
                    .refresh(&client, request.refresh_token.as_deref(), requested)
                    .await?
            }
            GrantType::Implicit => return Err(AuthError::unsupported_grant_type(grant.as_str())),
        };

        let mut response = TokenResponse::new(
            issued.access_token,
            issued.expires_in,
            self.scopes.format(&issued.scopes),
        );
        if let Some(refresh_token) = issued.refresh_token {
            response = response.with_refresh_token(refresh_token);
        }
        Ok(response)
    }

    /// Validates an authorization endpoint request.
    ///
    /// Failures before the client and redirect URI are known come back
    /// without a redirect; later ones carry the client redirect to send the
    /// error to.
    pub async fn check_authorize_params(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<AuthorizationRequestDetails, AuthorizeRejection> {
        let client_id = request
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::invalid_request("The client_id parameter is required"))?;
        let response_type = request
            .response_type
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("The response_type parameter is required"))
            .and_then(ResponseType::parse)?;
        let grant = response_type.grant_type();
        if !self.config.is_grant_enabled(grant) {
            return Err(AuthError::unsupported_response_type(
                request.response_type.as_deref().unwrap_or_default(),
            )
            .into());
        }

        let (client, redirect) = self
            .clients
            .authorize_client(client_id, request.redirect_uri.as_deref(), grant)
            .await?;

        let state = request.state.clone().filter(|s| !s.is_empty());
        let mut details = AuthorizationRequestDetails {
            client,
            response_type,
            redirect,
            scopes: BTreeSet::new(),
            state,
        };

        let checked = if self.config.state_param && details.state.is_none() {
            Err(AuthError::invalid_request("The state parameter is required"))
        } else {
            self.scopes
                .resolve_scopes(request.scope.as_deref(), &details.client, grant)
                .await
        };

        match checked {
            Ok(scopes) => {
                details.scopes = scopes;
                Ok(details)
            }
            Err(error) => {
                debug!(
                    client_id = %details.client.client_id,
                    error = %error,
                    "Authorization request rejected"
                );
                let redirect_to = details.error_redirect(&error).ok();
                Err(AuthorizeRejection { error, redirect_to })
            }
        }
    }

    /// Completes an approved authorization request and returns the redirect
    /// carrying the code (query) or the access token (fragment).
    pub async fn authorize(
        &self,
        details: &AuthorizationRequestDetails,
        owner_id: &str,
    ) -> AuthResult<Url> {
        match details.response_type {
            ResponseType::Code => {
                let code = enabled(&self.authorization_code, GrantType::AuthorizationCode)?
                    .issue_code(
                        &details.client,
                        owner_id,
                        details.scopes.clone(),
                        &details.redirect,
                    )
                    .await?;
                details.redirect_with([("code", code)])
            }
            ResponseType::Token => {
                let issued = enabled(&self.implicit, GrantType::Implicit)?
                    .issue(&details.client, owner_id, details.scopes.clone())
                    .await?;
                let mut params = vec![
                    ("access_token", issued.access_token),
                    ("token_type", "Bearer".to_string()),
                    ("expires_in", issued.expires_in.to_string()),
                ];
                if !issued.scopes.is_empty() {
                    params.push(("scope", self.scopes.format(&issued.scopes)));
                }
                details.redirect_with(params)
            }
        }
    }

    /// Redirect telling the client the resource owner refused.
    pub fn deny(&self, details: &AuthorizationRequestDetails) -> AuthResult<Url> {
        details.error_redirect(&AuthError::access_denied(
            "The resource owner denied the request",
        ))
    }

    /// Authenticates a resource owner on the consent screen.
    ///
    /// # Errors
    ///
    /// - `Configuration` if no credential verifier was supplied
    /// - `AccessDenied` if the credentials are wrong
    pub async fn authenticate_owner(&self, username: &str, password: &str) -> AuthResult<String> {
        let verifier = self
            .verifier
            .as_ref()
            .ok_or_else(|| AuthError::configuration("no credential verifier configured"))?;
        match verifier.verify(username, password).await? {
            Some(owner_id) => Ok(owner_id),
            None => {
                warn!("Resource owner authentication failed");
                Err(AuthError::access_denied("Invalid username or password"))
            }
        }
    }

    /// Revokes a session and every token it holds.
    pub async fn revoke_session(&self, session_id: Uuid) -> AuthResult<bool> {
        let revoked = self.sessions.revoke(session_id).await?;
        if revoked {
            info!(session_id = %session_id, "Session revoked");
        }
        Ok(revoked)
    }

    /// Revokes every session of a client.
    pub async fn revoke_client(&self, client_id: &str) -> AuthResult<u64> {
        let revoked = self.sessions.revoke_by_client(client_id).await?;
        info!(client_id = %client_id, revoked, "Client sessions revoked");
        Ok(revoked)
    }

    fn refresh_issuance(&self, client: &Client) -> RefreshIssuance {
        RefreshIssuance::from_flag(
            self.refresh_token.is_some()
                && self.clients.permits_grant(client, GrantType::RefreshToken),
        )
    }
}

fn enabled<T>(processor: &Option<T>, grant: GrantType) -> AuthResult<&T> {
    processor
        .as_ref()
        .ok_or_else(|| AuthError::unsupported_grant_type(grant.as_str()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{
        AuthorizationCodeGrantConfig, ClientCredentialsGrantConfig, ImplicitGrantConfig,
        PasswordGrantConfig, RefreshTokenGrantConfig,
    };
    use crate::grant::StaticCredentialVerifier;
    use crate::secret::hash_secret;
    use crate::types::Scope;

    const CALLBACK: &str = "https://app.example.com/cb";

    fn full_config() -> OAuthServerConfig {
        let mut config = OAuthServerConfig::default();
        config.grants.authorization_code = Some(AuthorizationCodeGrantConfig::default());
        config.grants.implicit = Some(ImplicitGrantConfig::default());
        config.grants.client_credentials = Some(ClientCredentialsGrantConfig {
            access_token_ttl: Some(Duration::from_secs(900)),
        });
        config.grants.password = Some(PasswordGrantConfig::default());
        config.grants.refresh_token = Some(RefreshTokenGrantConfig::default());
        config
    }

    async fn server(config: OAuthServerConfig) -> AuthorizationServer {
        let storage = Arc::new(InMemoryStorage::new());
        let secret = hash_secret("s3cret").unwrap();
        for client in [
            Client::new("svc", "Service")
                .with_secret_hash(secret.clone())
                .with_scope("read")
                .with_grant(GrantType::ClientCredentials),
            Client::new("web", "Web")
                .with_secret_hash(secret)
                .with_redirect_uri(CALLBACK)
                .with_scope("read")
                .with_grant(GrantType::AuthorizationCode)
                .with_grant(GrantType::Implicit)
                .with_grant(GrantType::Password)
                .with_grant(GrantType::RefreshToken),
        ] {
            ClientStorage::create(storage.as_ref(), &client).await.unwrap();
        }
        for scope in [Scope::new("read", "Read"), Scope::new("write", "Write")] {
            ScopeStorage::create(storage.as_ref(), &scope).await.unwrap();
        }
        let verifier = StaticCredentialVerifier::new().with_user(
            "alice",
            "user-1",
            hash_secret("pw").unwrap(),
        );

        AuthorizationServer::builder(config)
            .in_memory(storage)
            .credential_verifier(Arc::new(verifier))
            .build()
            .unwrap()
    }

    fn creds(client_id: &str) -> ClientCredentials {
        ClientCredentials::new(client_id, Some("s3cret"))
    }

    #[tokio::test]
    async fn test_client_credentials_end_to_end() {
        let server = server(full_config()).await;
        let mut request = TokenRequest::new("client_credentials");
        request.scope = Some("read".to_string());

        let response = server.issue_access_token(&request, creds("svc")).await.unwrap();
        assert_eq!(response.expires_in, 900);
        assert_eq!(response.scope, "read");
        assert!(response.refresh_token.is_none());

        let grant = server
            .token_validator()
            .validate_token(&response.access_token)
            .await
            .unwrap();
        assert_eq!(grant.client_id, "svc");
        assert!(grant.owner_id.is_none());
    }

    #[tokio::test]
    async fn test_disabled_grant_unsupported() {
        let mut config = full_config();
        config.grants.client_credentials = None;
        let server = server(config).await;

        let err = server
            .issue_access_token(&TokenRequest::new("client_credentials"), creds("svc"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedGrantType { .. }));

        let err = server
            .issue_access_token(&TokenRequest::new("implicit"), creds("web"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedGrantType { .. }));

        let err = server
            .issue_access_token(&TokenRequest::new("device_code"), creds("web"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedGrantType { .. }));
    }

    #[tokio::test]
    async fn test_bad_secret_rejected() {
        let server = server(full_config()).await;
        let err = server
            .issue_access_token(
                &TokenRequest::new("client_credentials"),
                ClientCredentials::new("svc", Some("wrong")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidClient { .. }));
    }

    #[tokio::test]
    async fn test_code_flow_then_refresh() {
        let server = server(full_config()).await;
        let details = server
            .check_authorize_params(&AuthorizeRequest {
                response_type: Some("code".into()),
                client_id: Some("web".into()),
                redirect_uri: Some(CALLBACK.into()),
                scope: Some("read".into()),
                state: Some("xyz".into()),
            })
            .await
            .unwrap();

        let redirect = server.authorize(&details, "user-1").await.unwrap();
        let params: std::collections::HashMap<_, _> = redirect.query_pairs().into_owned().collect();
        assert_eq!(params.get("state").map(String::as_str), Some("xyz"));
        let code = params.get("code").cloned().unwrap();

        let mut request = TokenRequest::new("authorization_code");
        request.code = Some(code);
        request.redirect_uri = Some(CALLBACK.into());
        let tokens = server.issue_access_token(&request, creds("web")).await.unwrap();
        let refresh = tokens.refresh_token.unwrap();

        let mut request = TokenRequest::new("refresh_token");
        request.refresh_token = Some(refresh);
        let refreshed = server.issue_access_token(&request, creds("web")).await.unwrap();
        assert!(refreshed.refresh_token.is_some());
        assert_eq!(refreshed.scope, "read");
    }

    #[tokio::test]
    async fn test_client_grant_restriction() {
        let mut config = full_config();
        config.limit_clients_to_grants = true;
        let server = server(config).await;
        // "svc" is not registered for the password grant.
        let mut request = TokenRequest::new("password");
        request.username = Some("alice".into());
        request.password = Some("pw".into());
        let err = server.issue_access_token(&request, creds("svc")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidClient { .. }));

        let response = server.issue_access_token(&request, creds("web")).await.unwrap();
        assert!(response.refresh_token.is_some());
    }

    #[tokio::test]
    async fn test_implicit_flow_uses_fragment() {
        let server = server(full_config()).await;
        let details = server
            .check_authorize_params(&AuthorizeRequest {
                response_type: Some("token".into()),
                client_id: Some("web".into()),
                redirect_uri: None,
                scope: Some("read".into()),
                state: None,
            })
            .await
            .unwrap();
        let redirect = server.authorize(&details, "user-1").await.unwrap();
        let fragment = redirect.fragment().unwrap();
        assert!(fragment.contains("access_token="));
        assert!(fragment.contains("token_type=Bearer"));
        assert!(redirect.query().is_none());
    }

    #[tokio::test]
    async fn test_authorize_errors_redirect_after_client_check() {
        let server = server(full_config()).await;

        let rejection = server
            .check_authorize_params(&AuthorizeRequest {
                response_type: Some("code".into()),
                client_id: Some("web".into()),
                redirect_uri: Some("https://evil.example.com/cb".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(rejection.redirect_to.is_none());

        let rejection = server
            .check_authorize_params(&AuthorizeRequest {
                response_type: Some("code".into()),
                client_id: Some("web".into()),
                scope: Some("unknown".into()),
                state: Some("abc".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        let redirect = rejection.redirect_to.unwrap();
        let query = redirect.query().unwrap();
        assert!(query.contains("error=invalid_scope"));
        assert!(query.contains("state=abc"));
    }

    #[tokio::test]
    async fn test_deny_and_authenticate_owner() {
        let server = server(full_config()).await;
        let details = server
            .check_authorize_params(&AuthorizeRequest {
                response_type: Some("code".into()),
                client_id: Some("web".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let denied = server.deny(&details).unwrap();
        assert!(denied.query().unwrap().contains("error=access_denied"));

        assert_eq!(server.authenticate_owner("alice", "pw").await.unwrap(), "user-1");
        assert!(matches!(
            server.authenticate_owner("alice", "nope").await.unwrap_err(),
            AuthError::AccessDenied { .. }
        ));
    }

    #[tokio::test]
    async fn test_password_grant_requires_verifier() {
        let err = AuthorizationServer::builder(full_config())
            .in_memory(Arc::new(InMemoryStorage::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, AuthError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_revoke_client_invalidates_tokens() {
        let server = server(full_config()).await;
        let response = server
            .issue_access_token(&TokenRequest::new("client_credentials"), creds("svc"))
            .await
            .unwrap();
        assert_eq!(server.revoke_client("svc").await.unwrap(), 1);

        let validator = server.token_validator();
        assert!(validator.validate_token(&response.access_token).await.is_err());
    }
    #[tokio::test]
    async fn test_revoke_session_invalidates_tokens() {
        let server = server(full_config()).await;
        let kept = server
            .issue_access_token(&TokenRequest::new("client_credentials"), creds("svc"))
            .await
            .unwrap();
        let revoked = server
            .issue_access_token(&TokenRequest::new("client_credentials"), creds("svc"))
            .await
            .unwrap();

        let validator = server.token_validator();
        let grant = validator.validate_token(&revoked.access_token).await.unwrap();
        assert!(server.revoke_session(grant.session_id).await.unwrap());
        assert!(!server.revoke_session(grant.session_id).await.unwrap());

        assert!(validator.validate_token(&revoked.access_token).await.is_err());
        assert!(validator.validate_token(&kept.access_token).await.is_ok());
    }
}
