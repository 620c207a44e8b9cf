//! Resource server side: access token validation.
//!
//! A token is read from the `Authorization: Bearer` header first, then from
//! the `access_token` request parameter unless header-only mode is on. A
//! token is valid iff it maps to a live session slot and has not expired.

use std::collections::BTreeSet;
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::SessionStorage;
use crate::types::{TokenKind, hash_token};

/// Where a resource request may carry its token.
#[derive(Debug, Clone, Default)]
pub struct BearerRequest {
    /// Raw `Authorization` header value.
    pub authorization: Option<String>,
    /// `access_token` query or form parameter.
    pub access_token_param: Option<String>,
}

impl BearerRequest {
    #[must_use]
    pub fn from_header(value: impl Into<String>) -> Self {
        Self {
            authorization: Some(value.into()),
            access_token_param: None,
        }
    }

    #[must_use]
    pub fn from_param(value: impl Into<String>) -> Self {
        Self {
            authorization: None,
            access_token_param: Some(value.into()),
        }
    }
}

/// What a valid access token grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub session_id: Uuid,
    pub client_id: String,
    pub owner_id: Option<String>,
    pub scopes: BTreeSet<String>,
    pub expires_at: OffsetDateTime,
}

impl AccessGrant {
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    #[must_use]
    pub fn has_all_scopes<'a>(&self, scopes: impl IntoIterator<Item = &'a str>) -> bool {
        scopes.into_iter().all(|scope| self.has_scope(scope))
    }

    /// Seconds left before the token expires.
    #[must_use]
    pub fn expires_in(&self, now: OffsetDateTime) -> u64 {
        u64::try_from((self.expires_at - now).whole_seconds()).unwrap_or(0)
    }
}

#[derive(Clone)]
pub struct TokenValidator {
    sessions: Arc<dyn SessionStorage>,
    http_headers_only: bool,
}

impl TokenValidator {
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStorage>) -> Self {
        Self {
            sessions,
            http_headers_only: false,
        }
    }

    /// Ignore the `access_token` request parameter.
    #[must_use]
    pub fn with_http_headers_only(mut self, http_headers_only: bool) -> Self {
        self.http_headers_only = http_headers_only;
        self
    }

    #[must_use]
    pub fn is_http_headers_only(&self) -> bool {
        self.http_headers_only
    }

    /// Extracts and validates the token carried by a request.
    ///
    /// # Errors
    ///
    /// - `InvalidAccessToken` if no token is present, the header is not a
    ///   Bearer credential, or the token is unknown, revoked or expired
    /// - `Storage` if the session store fails
    pub async fn validate(&self, request: &BearerRequest) -> AuthResult<AccessGrant> {
        let token = self.extract(request)?;
        self.validate_token(&token).await
    }

    /// Validates a raw access token value.
    pub async fn validate_token(&self, token: &str) -> AuthResult<AccessGrant> {
        if token.is_empty() {
            return Err(AuthError::invalid_access_token("Empty access token"));
        }
        let token_hash = hash_token(token);
        let session = self
            .sessions
            .find_by_token(TokenKind::AccessToken, &token_hash)
            .await?
            .ok_or_else(|| AuthError::invalid_access_token("Unknown or revoked access token"))?;
        let issued = session
            .find_token(TokenKind::AccessToken, &token_hash)
            .ok_or_else(|| AuthError::invalid_access_token("Unknown or revoked access token"))?;

        if issued.is_expired_at(OffsetDateTime::now_utc()) {
            debug!(session_id = %session.id, "Access token expired");
            return Err(AuthError::invalid_access_token("The access token has expired"));
        }

        Ok(AccessGrant {
            session_id: session.id,
            client_id: session.client_id.clone(),
            owner_id: session.owner_id.clone(),
            scopes: issued.scopes.clone(),
            expires_at: issued.expires_at,
        })
    }

    /// Like [`validate`](Self::validate), folding token problems into `false`.
    ///
    /// # Errors
    ///
    /// Only storage failures are returned.
    pub async fn is_valid(&self, request: &BearerRequest) -> AuthResult<bool> {
        match self.validate(request).await {
            Ok(_) => Ok(true),
            Err(AuthError::InvalidAccessToken { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn extract(&self, request: &BearerRequest) -> AuthResult<String> {
        if let Some(header) = request.authorization.as_deref() {
            let (scheme, token) = header
                .trim()
                .split_once(' ')
                .ok_or_else(|| AuthError::invalid_access_token("Malformed Authorization header"))?;
            if !scheme.eq_ignore_ascii_case("bearer") {
                return Err(AuthError::invalid_access_token(
                    "Authorization header must use the Bearer scheme",
                ));
            }
            return Ok(token.trim().to_string());
        }

        if !self.http_headers_only {
            if let Some(token) = request.access_token_param.as_deref() {
                return Ok(token.trim().to_string());
            }
        }

        Err(AuthError::invalid_access_token("Missing access token"))
    }
}
