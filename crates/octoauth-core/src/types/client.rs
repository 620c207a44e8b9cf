//! OAuth 2.0 client domain types.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// Grant Type
// =============================================================================

/// OAuth 2.0 grant types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization Code flow.
    AuthorizationCode,
    /// Implicit flow (token returned in the redirect fragment).
    Implicit,
    /// Client Credentials flow (confidential clients only).
    ClientCredentials,
    /// Resource Owner Password Credentials flow.
    Password,
    /// Refresh Token flow.
    RefreshToken,
}

impl GrantType {
    /// Every supported grant, in a stable order.
    pub const ALL: [GrantType; 5] = [
        Self::AuthorizationCode,
        Self::Implicit,
        Self::ClientCredentials,
        Self::Password,
        Self::RefreshToken,
    ];

    /// Returns the OAuth 2.0 grant_type parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::Implicit => "implicit",
            Self::ClientCredentials => "client_credentials",
            Self::Password => "password",
            Self::RefreshToken => "refresh_token",
        }
    }

    /// Returns `true` for grants that go through the authorization endpoint
    /// and therefore need a redirect URI.
    #[must_use]
    pub fn uses_redirect(&self) -> bool {
        matches!(self, Self::AuthorizationCode | Self::Implicit)
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = UnknownGrantType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|grant| grant.as_str() == s)
            .ok_or_else(|| UnknownGrantType(s.to_string()))
    }
}

/// A grant_type value that names no supported grant.
#[derive(Debug, thiserror::Error)]
#[error("Unknown grant type: {0}")]
pub struct UnknownGrantType(pub String);

// =============================================================================
// Client
// =============================================================================

/// OAuth 2.0 client registration.
///
/// A client is confidential when it has a secret hash; public clients have none.
/// Registrations change only through administrative update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier used in OAuth flows.
    pub client_id: String,

    /// Human-readable display name, shown on the consent screen.
    pub name: String,

    /// Argon2 PHC hash of the client secret (confidential clients only).
    #[serde(skip_serializing)]
    pub secret_hash: Option<String>,

    /// Registered redirect URI for the authorization code and implicit flows.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Grants this client may use when grant restriction is enabled.
    #[serde(default)]
    pub grant_types: BTreeSet<GrantType>,

    /// Scopes this client may request when scope restriction is enabled.
    #[serde(default)]
    pub scopes: BTreeSet<String>,

    /// Inactive clients fail every validation.
    pub active: bool,
}

impl Client {
    /// Creates an active public client with no grants or scopes.
    #[must_use]
    pub fn new(client_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            name: name.into(),
            secret_hash: None,
            redirect_uri: None,
            grant_types: BTreeSet::new(),
            scopes: BTreeSet::new(),
            active: true,
        }
    }

    #[must_use]
    pub fn with_secret_hash(mut self, hash: impl Into<String>) -> Self {
        self.secret_hash = Some(hash.into());
        self
    }

    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_grant(mut self, grant: GrantType) -> Self {
        self.grant_types.insert(grant);
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.insert(scope.into());
        self
    }

    /// Returns `true` if the client authenticates with a secret.
    #[must_use]
    pub fn is_confidential(&self) -> bool {
        self.secret_hash.is_some()
    }

    /// Checks if the given grant type is listed on this registration.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Checks if the given scope is listed on this registration.
    #[must_use]
    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Exact match against the registered redirect URI.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uri.as_deref() == Some(uri)
    }

    /// Validates the registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration is inconsistent.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.client_id.trim().is_empty() {
            return Err(ClientValidationError::EmptyClientId);
        }

        if !self.is_confidential() && self.is_grant_type_allowed(GrantType::ClientCredentials) {
            return Err(ClientValidationError::PublicClientCredentials);
        }

        let needs_redirect = self.grant_types.iter().any(GrantType::uses_redirect);
        if needs_redirect && self.redirect_uri.is_none() {
            return Err(ClientValidationError::NoRedirectUri);
        }

        if let Some(uri) = &self.redirect_uri {
            let parsed = url::Url::parse(uri)
                .map_err(|_| ClientValidationError::InvalidRedirectUri(uri.clone()))?;
            if parsed.fragment().is_some() {
                return Err(ClientValidationError::InvalidRedirectUri(uri.clone()));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Errors that can occur during client registration.
#[derive(Debug, thiserror::Error)]
pub enum ClientValidationError {
    #[error("Client ID cannot be empty")]
    EmptyClientId,

    #[error("Public clients cannot use client_credentials grant")]
    PublicClientCredentials,

    #[error("Authorization code and implicit flows require a redirect URI")]
    NoRedirectUri,

    /// Redirect URIs must be absolute and carry no fragment.
    #[error("Invalid redirect URI: {0}")]
    InvalidRedirectUri(String),
}
