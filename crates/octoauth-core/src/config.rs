//! Authorization server configuration.
//!
//! One typed block per grant: a grant is enabled exactly when its block is
//! present. Everything is validated once at startup via
//! [`OAuthServerConfig::validate`]; nothing is looked up dynamically while
//! serving requests.
//!
//! # Example (TOML)
//!
//! ```toml
//! [oauth]
//! access_token_ttl = "1h"
//! scope_delimiter = " "
//! default_scope = "read"
//! limit_clients_to_grants = true
//!
//! [oauth.grants.client_credentials]
//! access_token_ttl = "15m"
//!
//! [oauth.grants.refresh_token]
//! refresh_token_ttl = "30d"
//! rotate_refresh_tokens = true
//! revoke_rotated_immediately = false
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::GrantType;

const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(3600);
const DEFAULT_AUTH_CODE_TTL: Duration = Duration::from_secs(600);
const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 3600);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Root configuration of the authorization and resource server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthServerConfig {
    /// Access token lifetime used by grants that do not set their own.
    #[serde(with = "humantime_serde")]
    pub access_token_ttl: Duration,

    /// Require the `state` parameter on authorization requests.
    pub state_param: bool,

    /// Require the `scope` parameter when no default scope is configured.
    pub scope_param: bool,

    /// Separator between scope identifiers in a scope string.
    pub scope_delimiter: String,

    /// Scope string applied when a request omits `scope`.
    pub default_scope: Option<String>,

    /// Only allow clients to use grants listed on their registration.
    pub limit_clients_to_grants: bool,

    /// Only allow clients to request scopes listed on their registration.
    pub limit_clients_to_scopes: bool,

    /// Only allow scopes to be requested under grants listed on the scope.
    pub limit_scopes_to_grants: bool,

    /// Read bearer tokens from the `Authorization` header only.
    /// When false the `access_token` query or form parameter is also accepted.
    pub http_headers_only: bool,

    /// Enabled grants and their options.
    pub grants: GrantsConfig,

    /// Expired session sweeping.
    pub sweeper: SweeperConfig,
}

impl Default for OAuthServerConfig {
    fn default() -> Self {
        Self {
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            state_param: false,
            scope_param: false,
            scope_delimiter: " ".to_string(),
            default_scope: None,
            limit_clients_to_grants: false,
            limit_clients_to_scopes: false,
            limit_scopes_to_grants: false,
            http_headers_only: false,
            grants: GrantsConfig::default(),
            sweeper: SweeperConfig::default(),
        }
    }
}

/// Per-grant configuration. A `None` block disables the grant.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GrantsConfig {
    pub authorization_code: Option<AuthorizationCodeGrantConfig>,
    pub implicit: Option<ImplicitGrantConfig>,
    pub client_credentials: Option<ClientCredentialsGrantConfig>,
    pub password: Option<PasswordGrantConfig>,
    pub refresh_token: Option<RefreshTokenGrantConfig>,
}

/// Authorization code grant options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorizationCodeGrantConfig {
    /// Access token lifetime (falls back to the global value).
    #[serde(with = "humantime_serde")]
    pub access_token_ttl: Option<Duration>,

    /// Authorization code lifetime.
    #[serde(with = "humantime_serde")]
    pub auth_token_ttl: Duration,

    /// Lifetime of refresh tokens issued alongside the exchanged code.
    #[serde(with = "humantime_serde")]
    pub refresh_token_ttl: Duration,
}

impl Default for AuthorizationCodeGrantConfig {
    fn default() -> Self {
        Self {
            access_token_ttl: None,
            auth_token_ttl: DEFAULT_AUTH_CODE_TTL,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
        }
    }
}

/// Implicit grant options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ImplicitGrantConfig {
    #[serde(with = "humantime_serde")]
    pub access_token_ttl: Option<Duration>,
}

/// Client credentials grant options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientCredentialsGrantConfig {
    #[serde(with = "humantime_serde")]
    pub access_token_ttl: Option<Duration>,
}

/// Resource owner password grant options.
///
/// Enabling this grant requires a credential verifier at assembly time.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PasswordGrantConfig {
    #[serde(with = "humantime_serde")]
    pub access_token_ttl: Option<Duration>,

    #[serde(with = "humantime_serde")]
    pub refresh_token_ttl: Duration,
}

impl Default for PasswordGrantConfig {
    fn default() -> Self {
        Self {
            access_token_ttl: None,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
        }
    }
}

/// Refresh token grant options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshTokenGrantConfig {
    #[serde(with = "humantime_serde")]
    pub access_token_ttl: Option<Duration>,

    /// Lifetime of refresh tokens minted on rotation.
    #[serde(with = "humantime_serde")]
    pub refresh_token_ttl: Duration,

    /// Issue a new refresh token on every refresh.
    pub rotate_refresh_tokens: bool,

    /// When rotating, invalidate the presented refresh token immediately.
    /// When false it stays usable for exactly one more refresh.
    pub revoke_rotated_immediately: bool,
}

impl Default for RefreshTokenGrantConfig {
    fn default() -> Self {
        Self {
            access_token_ttl: None,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
            rotate_refresh_tokens: true,
            revoke_rotated_immediately: true,
        }
    }
}

/// Periodic expiry sweeping.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl OAuthServerConfig {
    /// Returns `true` if the grant has a configuration block.
    #[must_use]
    pub fn is_grant_enabled(&self, grant: GrantType) -> bool {
        let grants = &self.grants;
        match grant {
            GrantType::AuthorizationCode => grants.authorization_code.is_some(),
            GrantType::Implicit => grants.implicit.is_some(),
            GrantType::ClientCredentials => grants.client_credentials.is_some(),
            GrantType::Password => grants.password.is_some(),
            GrantType::RefreshToken => grants.refresh_token.is_some(),
        }
    }

    /// Lists the enabled grants.
    #[must_use]
    pub fn enabled_grants(&self) -> Vec<GrantType> {
        GrantType::ALL
            .into_iter()
            .filter(|grant| self.is_grant_enabled(*grant))
            .collect()
    }

    /// Access token lifetime for a grant, falling back to the global value.
    #[must_use]
    pub fn access_token_ttl_for(&self, grant: GrantType) -> Duration {
        let grants = &self.grants;
        let specific = match grant {
            GrantType::AuthorizationCode => grants
                .authorization_code
                .as_ref()
                .and_then(|g| g.access_token_ttl),
            GrantType::Implicit => grants.implicit.as_ref().and_then(|g| g.access_token_ttl),
            GrantType::ClientCredentials => grants
                .client_credentials
                .as_ref()
                .and_then(|g| g.access_token_ttl),
            GrantType::Password => grants.password.as_ref().and_then(|g| g.access_token_ttl),
            GrantType::RefreshToken => grants
                .refresh_token
                .as_ref()
                .and_then(|g| g.access_token_ttl),
        };
        specific.unwrap_or(self.access_token_ttl)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The scope delimiter is empty
    /// - Any token lifetime is zero
    /// - The default scope contains no scope identifiers
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scope_delimiter.is_empty() {
            return Err(ConfigError::InvalidValue(
                "scope_delimiter cannot be empty".to_string(),
            ));
        }

        if let Some(default_scope) = &self.default_scope {
            let has_scope = default_scope
                .split(self.scope_delimiter.as_str())
                .any(|s| !s.trim().is_empty());
            if !has_scope {
                return Err(ConfigError::InvalidValue(
                    "default_scope must name at least one scope".to_string(),
                ));
            }
        }

        ensure_non_zero("access_token_ttl", self.access_token_ttl)?;
        for grant in self.enabled_grants() {
            ensure_non_zero(
                &format!("grants.{grant}.access_token_ttl"),
                self.access_token_ttl_for(grant),
            )?;
        }

        if let Some(code) = &self.grants.authorization_code {
            ensure_non_zero("grants.authorization_code.auth_token_ttl", code.auth_token_ttl)?;
            ensure_non_zero(
                "grants.authorization_code.refresh_token_ttl",
                code.refresh_token_ttl,
            )?;
        }
        if let Some(password) = &self.grants.password {
            ensure_non_zero("grants.password.refresh_token_ttl", password.refresh_token_ttl)?;
        }
        if let Some(refresh) = &self.grants.refresh_token {
            ensure_non_zero(
                "grants.refresh_token.refresh_token_ttl",
                refresh.refresh_token_ttl,
            )?;
        }

        if self.sweeper.enabled {
            ensure_non_zero("sweeper.interval", self.sweeper.interval)?;
        }

        Ok(())
    }
}

fn ensure_non_zero(name: &str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
    }
    Ok(())
}
