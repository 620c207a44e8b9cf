//! Authorization sessions and the tokens they own.
//!
//! # Security
//!
//! - Token values are 256-bit random strings, returned to the client once
//! - Only SHA-256 hashes of token values are stored
//! - A session owns at most one token per slot; replacing a slot invalidates
//!   the previous token

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Kind of token held by a session slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    AuthorizationCode,
    AccessToken,
    RefreshToken,
}

impl TokenKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A token issued from a session, stored by hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    /// SHA-256 hash of the token value.
    pub token_hash: String,

    /// Scopes carried by this token; always a subset of the session scopes.
    pub scopes: BTreeSet<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Redirect URI given explicitly on the authorization request (codes only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

impl IssuedToken {
    /// Generates a fresh token value and the record stored for it.
    ///
    /// The plaintext is returned to the caller and never stored.
    #[must_use]
    pub fn mint(ttl: Duration, scopes: BTreeSet<String>, now: OffsetDateTime) -> (String, Self) {
        let value = generate_token();
        let record = Self {
            token_hash: hash_token(&value),
            scopes,
            expires_at: now + ttl,
            redirect_uri: None,
        };
        (value, record)
    }

    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: Option<String>) -> Self {
        self.redirect_uri = redirect_uri;
        self
    }

    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Seconds until expiry, clamped at zero.
    #[must_use]
    pub fn expires_in(&self, now: OffsetDateTime) -> u64 {
        u64::try_from((self.expires_at - now).whole_seconds()).unwrap_or(0)
    }
}

/// The authorization record tying a client, an optional resource owner,
/// granted scopes and issued tokens together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,

    pub client_id: String,

    /// Resource owner (None for client credentials).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    /// Scopes granted to this session.
    pub scopes: BTreeSet<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<IssuedToken>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<IssuedToken>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<IssuedToken>,

    /// Rotated refresh token that may still be redeemed exactly once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_refresh_token: Option<IssuedToken>,
}

impl Session {
    /// Creates an empty session for a client.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        owner_id: Option<String>,
        scopes: BTreeSet<String>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: client_id.into(),
            owner_id,
            scopes,
            created_at: now,
            authorization_code: None,
            access_token: None,
            refresh_token: None,
            grace_refresh_token: None,
        }
    }

    #[must_use]
    pub fn with_authorization_code(mut self, code: IssuedToken) -> Self {
        self.authorization_code = Some(code);
        self
    }

    #[must_use]
    pub fn with_access_token(mut self, token: IssuedToken) -> Self {
        self.access_token = Some(token);
        self
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: IssuedToken) -> Self {
        self.refresh_token = Some(token);
        self
    }

    /// Finds the token of `kind` with the given hash.
    ///
    /// Refresh lookups also match the grace slot.
    #[must_use]
    pub fn find_token(&self, kind: TokenKind, token_hash: &str) -> Option<&IssuedToken> {
        fn matches<'a>(slot: &'a Option<IssuedToken>, hash: &str) -> Option<&'a IssuedToken> {
            slot.as_ref().filter(|token| token.token_hash == hash)
        }

        match kind {
            TokenKind::AuthorizationCode => matches(&self.authorization_code, token_hash),
            TokenKind::AccessToken => matches(&self.access_token, token_hash),
            TokenKind::RefreshToken => matches(&self.refresh_token, token_hash)
                .or_else(|| matches(&self.grace_refresh_token, token_hash)),
        }
    }

    /// All tokens currently held by the session.
    pub fn tokens(&self) -> impl Iterator<Item = &IssuedToken> {
        [
            &self.authorization_code,
            &self.access_token,
            &self.refresh_token,
            &self.grace_refresh_token,
        ]
        .into_iter()
        .flatten()
    }

    /// Returns `true` if the session holds no unexpired token.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.tokens().all(|token| token.is_expired_at(now))
    }
}

/// Hash a token value using SHA-256.
///
/// Used both when storing new tokens and when looking them up.
#[must_use]
pub fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a cryptographically secure random token.
///
/// Returns a 256-bit random value encoded as base64url (43 characters).
#[must_use]
pub fn generate_token() -> String {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
