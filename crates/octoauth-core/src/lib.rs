//! # octoauth-core
//!
//! OAuth 2.0 authorization server and resource server core.
//!
//! This crate provides:
//! - Client and scope registries with optional grant/scope restrictions
//! - Grant processors for authorization code, implicit, client credentials,
//!   password and refresh token
//! - Session storage with atomic code and refresh token redemption
//! - Bearer token validation for protected resources
//! - Periodic sweeping of expired sessions
//!
//! ## Modules
//!
//! - [`config`] - Typed configuration, one block per grant
//! - [`registry`] - Client and scope validation
//! - [`grant`] - Grant processors and endpoint request/response types
//! - [`server`] - [`AuthorizationServer`] facade and its builder
//! - [`validator`] - Access token validation
//! - [`sweeper`] - Expired session removal
//! - [`storage`] - Storage traits and the in-memory implementation
//! - [`middleware`] - Axum bearer filter and error responses
//! - [`http`] - Axum handlers for the OAuth endpoints

pub mod config;
pub mod error;
pub mod grant;
pub mod http;
pub mod middleware;
pub mod registry;
pub mod secret;
pub mod server;
pub mod storage;
pub mod sweeper;
pub mod types;
pub mod validator;

pub use config::{ConfigError, OAuthServerConfig};
pub use error::{AuthError, ErrorCategory};
pub use grant::{
    AuthorizeRequest, ClientCredentials, CredentialVerifier, StaticCredentialVerifier,
    TokenRequest, TokenResponse,
};
pub use http::OAuthState;
pub use middleware::{OAuthFilter, oauth_filter};
pub use server::{AuthorizationServer, AuthorizationServerBuilder};
pub use storage::{ClientStorage, InMemoryStorage, ScopeStorage, SessionStorage};
pub use sweeper::{ExpirySweeper, SweepReport};
pub use types::{Client, GrantType, Scope, Session};
pub use validator::{AccessGrant, BearerRequest, TokenValidator};

/// Type alias for authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use octoauth_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{ConfigError, OAuthServerConfig};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::grant::{
        AuthorizeRequest, ClientCredentials, CredentialVerifier, StaticCredentialVerifier,
        TokenRequest, TokenResponse,
    };
    pub use crate::server::AuthorizationServer;
    pub use crate::storage::{ClientStorage, InMemoryStorage, ScopeStorage, SessionStorage};
    pub use crate::types::{Client, GrantType, Scope, Session};
    pub use crate::validator::{AccessGrant, TokenValidator};
}
