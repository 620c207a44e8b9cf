//! Grant processors.
//!
//! One state machine per grant type. Each processor validates grant-specific
//! input, then creates or mutates a session through
//! [`SessionStorage`](crate::storage::SessionStorage). Client and scope
//! validation happen before a processor runs, in
//! [`AuthorizationServer`](crate::server::AuthorizationServer).
//!
//! | Grant              | Endpoint      | Refresh token |
//! |--------------------|---------------|---------------|
//! | authorization_code | authorize + token | optional  |
//! | implicit           | authorize     | never         |
//! | client_credentials | token         | never         |
//! | password           | token         | optional      |
//! | refresh_token      | token         | on rotation   |

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod authorization_code;
pub mod authorize;
pub mod client_credentials;
pub mod implicit;
pub mod password;
pub mod refresh_token;
pub mod verifier;

pub use authorization_code::AuthorizationCodeGrant;
pub use authorize::{
    AuthorizationRequestDetails, AuthorizeRejection, AuthorizeRequest, ResponseType,
};
pub use client_credentials::ClientCredentialsGrant;
pub use implicit::ImplicitGrant;
pub use password::PasswordGrant;
pub use refresh_token::RefreshTokenGrant;
pub use verifier::{CredentialVerifier, StaticCredentialVerifier};

/// Token endpoint request parameters.
///
/// Which fields are required depends on `grant_type`:
///
/// - `authorization_code`: code, redirect_uri (if sent on the authorization request)
/// - `client_credentials`: (optional) scope
/// - `password`: username, password, (optional) scope
/// - `refresh_token`: refresh_token, (optional) scope
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: String,

    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub redirect_uri: Option<String>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,

    /// Client ID (client_secret_post or public clients).
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,
}

impl TokenRequest {
    #[must_use]
    pub fn new(grant_type: impl Into<String>) -> Self {
        Self {
            grant_type: grant_type.into(),
            ..Default::default()
        }
    }
}

/// Client credentials presented on the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
}

impl ClientCredentials {
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: Option<&str>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.map(str::to_string),
        }
    }
}

/// Tokens produced by a successful grant.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub session_id: Uuid,
    pub access_token: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    pub scopes: BTreeSet<String>,
}

/// Successful token endpoint response.
///
/// ```json
/// {
///   "access_token": "2YotnFZFEjr1zCsicMWpAA",
///   "token_type": "Bearer",
///   "expires_in": 3600,
///   "refresh_token": "tGzv3JOkF0XG5Qx2TlKWIA",
///   "scope": "read write"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    /// Always "Bearer".
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Granted scopes joined with the configured delimiter.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,
}

impl TokenResponse {
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            refresh_token: None,
            scope,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }
}

/// Whether a grant should attach a refresh token to the tokens it issues.
///
/// Decided per request: the refresh grant must be enabled and the client
/// allowed to use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshIssuance {
    Issue,
    Skip,
}

impl RefreshIssuance {
    #[must_use]
    pub fn from_flag(issue: bool) -> Self {
        if issue { Self::Issue } else { Self::Skip }
    }
}
