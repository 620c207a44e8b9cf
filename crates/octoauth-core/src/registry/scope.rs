//! Scope string parsing and validation.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::AuthResult;
use crate::config::OAuthServerConfig;
use crate::error::AuthError;
use crate::storage::ScopeStorage;
use crate::types::{Client, GrantType, Scope};

/// Scope handling options taken from the server configuration.
#[derive(Debug, Clone)]
pub struct ScopeSettings {
    pub delimiter: String,
    pub default_scope: Option<String>,
    pub scope_required: bool,
    pub limit_clients_to_scopes: bool,
    pub limit_scopes_to_grants: bool,
}

impl ScopeSettings {
    #[must_use]
    pub fn from_config(config: &OAuthServerConfig) -> Self {
        Self {
            delimiter: config.scope_delimiter.clone(),
            default_scope: config.default_scope.clone(),
            scope_required: config.scope_param,
            limit_clients_to_scopes: config.limit_clients_to_scopes,
            limit_scopes_to_grants: config.limit_scopes_to_grants,
        }
    }
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self::from_config(&OAuthServerConfig::default())
    }
}

/// Splits a scope string, dropping empty segments and duplicates.
#[must_use]
pub fn split_scopes(scope: &str, delimiter: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    scope
        .split(delimiter)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(*s))
        .map(str::to_string)
        .collect()
}

/// Resolves requested scope strings to registered scopes.
#[derive(Clone)]
pub struct ScopeRegistry {
    storage: Arc<dyn ScopeStorage>,
    settings: ScopeSettings,
}

impl ScopeRegistry {
    #[must_use]
    pub fn new(storage: Arc<dyn ScopeStorage>, settings: ScopeSettings) -> Self {
        Self { storage, settings }
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn ScopeStorage> {
        &self.storage
    }

    #[must_use]
    pub fn delimiter(&self) -> &str {
        &self.settings.delimiter
    }

    /// Splits a scope string with the configured delimiter.
    #[must_use]
    pub fn parse(&self, scope: &str) -> Vec<String> {
        split_scopes(scope, &self.settings.delimiter)
    }

    /// Joins scope identifiers with the configured delimiter.
    #[must_use]
    pub fn format(&self, scopes: &BTreeSet<String>) -> String {
        scopes
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(&self.settings.delimiter)
    }

    /// Resolves a requested scope string for `client` under `grant`.
    ///
    /// An omitted or blank scope falls back to the default scope. Without a
    /// default the result is empty, unless the scope parameter is required.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the scope is omitted, required, and no default exists
    /// - `InvalidScope` if a scope is unregistered, not allowed for the client
    ///   (client restriction), or not allowed under the grant (grant restriction)
    pub async fn resolve_scopes(
        &self,
        requested: Option<&str>,
        client: &Client,
        grant: GrantType,
    ) -> AuthResult<BTreeSet<String>> {
        let mut ids = requested.map(|s| self.parse(s)).unwrap_or_default();

        if ids.is_empty() {
            match &self.settings.default_scope {
                Some(default_scope) => ids = self.parse(default_scope),
                None if self.settings.scope_required => {
                    return Err(AuthError::invalid_request(
                        "The scope parameter is required",
                    ));
                }
                None => return Ok(BTreeSet::new()),
            }
        }

        let mut resolved = BTreeSet::new();
        for id in ids {
            let scope = self
                .storage
                .find(&id)
                .await?
                .ok_or_else(|| {
                    AuthError::invalid_scope(format!("Scope '{id}' is not registered"))
                })?;

            if self.settings.limit_clients_to_scopes && !client.is_scope_allowed(&scope.id) {
                return Err(AuthError::invalid_scope(format!(
                    "Scope '{id}' is not allowed for this client"
                )));
            }
            if self.settings.limit_scopes_to_grants && !scope.is_grant_allowed(grant) {
                return Err(AuthError::invalid_scope(format!(
                    "Scope '{id}' cannot be requested with the {grant} grant"
                )));
            }
            resolved.insert(scope.id);
        }
        Ok(resolved)
    }

    /// Loads the registrations of already-resolved scope identifiers.
    ///
    /// Unknown identifiers are skipped.
    pub async fn describe(&self, ids: &BTreeSet<String>) -> AuthResult<Vec<Scope>> {
        let mut scopes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(scope) = self.storage.find(id).await? {
                scopes.push(scope);
            }
        }
        Ok(scopes)
    }
}
