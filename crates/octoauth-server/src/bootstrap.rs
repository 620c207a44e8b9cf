//! Seeding of the in-memory store from `[bootstrap]` configuration.
//!
//! Clients and scopes go into [`InMemoryStorage`]; users become a
//! [`StaticCredentialVerifier`] for the password grant and the consent form.
//! Plaintext secrets and passwords are hashed with Argon2 here and never kept.

use octoauth_core::secret::hash_secret;
use octoauth_core::{
    AuthError, Client, ClientStorage, InMemoryStorage, ScopeStorage, StaticCredentialVerifier,
};
use tracing::{debug, info};

use crate::config::{BootstrapClient, BootstrapConfig};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("failed to register client '{client_id}': {source}")]
    Client {
        client_id: String,
        #[source]
        source: AuthError,
    },

    #[error("failed to register scope '{scope}': {source}")]
    Scope {
        scope: String,
        #[source]
        source: AuthError,
    },

    #[error("failed to hash credentials: {0}")]
    Hashing(#[source] AuthError),
}

/// Counts of what was seeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapStats {
    pub clients: usize,
    pub scopes: usize,
}

/// Registers every configured scope and client.
///
/// Scopes go first so that a client's scope list refers to known scopes.
///
/// # Errors
///
/// Fails on the first client or scope the storage rejects.
pub async fn seed_storage(
    storage: &InMemoryStorage,
    cfg: &BootstrapConfig,
) -> Result<BootstrapStats, BootstrapError> {
    for scope in &cfg.scopes {
        ScopeStorage::create(storage, scope)
            .await
            .map_err(|source| BootstrapError::Scope {
                scope: scope.id.clone(),
                source,
            })?;
        debug!(scope = %scope.id, "Bootstrap scope registered");
    }

    for entry in &cfg.clients {
        let client = to_client(entry)?;
        ClientStorage::create(storage, &client)
            .await
            .map_err(|source| BootstrapError::Client {
                client_id: entry.client_id.clone(),
                source,
            })?;
        debug!(
            client_id = %client.client_id,
            confidential = client.is_confidential(),
            "Bootstrap client registered"
        );
    }

    let stats = BootstrapStats {
        clients: cfg.clients.len(),
        scopes: cfg.scopes.len(),
    };
    info!(clients = stats.clients, scopes = stats.scopes, "Bootstrap storage seeded");
    Ok(stats)
}

/// Builds the credential verifier from `bootstrap.users`.
///
/// # Errors
///
/// Returns `Hashing` if a plaintext password cannot be hashed.
pub fn credential_verifier(
    cfg: &BootstrapConfig,
) -> Result<StaticCredentialVerifier, BootstrapError> {
    let mut verifier = StaticCredentialVerifier::new();
    for user in &cfg.users {
        match (&user.password_hash, &user.password) {
            (Some(hash), _) => {
                verifier = verifier.with_user(&user.username, user.owner_id(), hash);
            }
            (None, Some(password)) => verifier
                .add_user(&user.username, user.owner_id(), password)
                .map_err(BootstrapError::Hashing)?,
            (None, None) => {}
        }
    }
    Ok(verifier)
}

fn to_client(entry: &BootstrapClient) -> Result<Client, BootstrapError> {
    let name = entry.name.as_deref().unwrap_or(&entry.client_id);
    let mut client = Client::new(&entry.client_id, name);

    let secret_hash = match (&entry.secret_hash, &entry.secret) {
        (Some(hash), _) => Some(hash.clone()),
        (None, Some(secret)) => Some(hash_secret(secret).map_err(BootstrapError::Hashing)?),
        (None, None) => None,
    };
    if let Some(hash) = secret_hash {
        client = client.with_secret_hash(hash);
    }
    if let Some(uri) = &entry.redirect_uri {
        client = client.with_redirect_uri(uri);
    }
    for grant in &entry.grant_types {
        client = client.with_grant(*grant);
    }
    for scope in &entry.scopes {
        client = client.with_scope(scope);
    }
    Ok(client)
}

#[cfg(test)]
mod tests {
    use octoauth_core::{CredentialVerifier, GrantType, Scope};

    use super::*;
    use crate::config::BootstrapUser;

    fn service_client() -> BootstrapClient {
        BootstrapClient {
            client_id: "svc".into(),
            name: Some("Service".into()),
            secret: Some("pw".into()),
            secret_hash: None,
            redirect_uri: None,
            grant_types: vec![GrantType::ClientCredentials],
            scopes: vec!["read".into()],
        }
    }

    #[tokio::test]
    async fn test_seed_hashes_client_secret() {
        let storage = InMemoryStorage::new();
        let cfg = BootstrapConfig {
            clients: vec![service_client()],
            scopes: vec![Scope::new("read", "Read access")],
            users: vec![],
        };

        let stats = seed_storage(&storage, &cfg).await.unwrap();
        assert_eq!(stats.clients, 1);
        assert_eq!(stats.scopes, 1);

        let client = storage.find_by_client_id("svc").await.unwrap().unwrap();
        assert!(client.is_confidential());
        assert_ne!(client.secret_hash.as_deref(), Some("pw"));
        assert!(client.is_scope_allowed("read"));
    }

    #[tokio::test]
    async fn test_invalid_client_is_reported() {
        let storage = InMemoryStorage::new();
        let mut client = service_client();
        client.secret = None;
        let cfg = BootstrapConfig {
            clients: vec![client],
            ..Default::default()
        };

        let err = seed_storage(&storage, &cfg).await.unwrap_err();
        assert!(matches!(err, BootstrapError::Client { ref client_id, .. } if client_id == "svc"));
    }

    #[tokio::test]
    async fn test_credential_verifier_from_users() {
        let cfg = BootstrapConfig {
            users: vec![BootstrapUser {
                username: "alice".into(),
                owner_id: Some("user-1".into()),
                password: Some("wonderland".into()),
                password_hash: None,
            }],
            ..Default::default()
        };

        let verifier = credential_verifier(&cfg).unwrap();
        assert_eq!(
            verifier.verify("alice", "wonderland").await.unwrap(),
            Some("user-1".to_string())
        );
        assert_eq!(verifier.verify("alice", "nope").await.unwrap(), None);
    }
}
