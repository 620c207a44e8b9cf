//! In-memory storage backend.
//!
//! Sessions live in one table guarded by a single `tokio::sync::RwLock`, next
//! to an index from token hash to session id. Every session mutation takes the
//! write lock for its whole read-validate-write cycle, which makes
//! [`SessionStorage::exchange`] atomic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ClientStorage, Retirement, ScopeStorage, SessionStorage, TokenExchange};
use crate::AuthResult;
use crate::error::AuthError;
use crate::secret;
use crate::types::{Client, Scope, Session, TokenKind};

#[derive(Debug, Default)]
struct SessionTable {
    sessions: HashMap<Uuid, Session>,
    token_index: HashMap<String, Uuid>,
}

impl SessionTable {
    fn index(&mut self, session: &Session) {
        for token in session.tokens() {
            self.token_index.insert(token.token_hash.clone(), session.id);
        }
    }

    fn unindex(&mut self, session: &Session) {
        for token in session.tokens() {
            self.token_index.remove(&token.token_hash);
        }
    }

    fn remove(&mut self, id: Uuid) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        self.unindex(&session);
        Some(session)
    }
}

/// Client, scope and session storage held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    clients: RwLock<BTreeMap<String, Client>>,
    scopes: RwLock<BTreeMap<String, Scope>>,
    sessions: RwLock<SessionTable>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// =============================================================================
// Clients
// =============================================================================

#[async_trait]
impl ClientStorage for InMemoryStorage {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.read().await.get(client_id).cloned())
    }

    async fn create(&self, client: &Client) -> AuthResult<Client> {
        client
            .validate()
            .map_err(|e| AuthError::invalid_request(e.to_string()))?;

        let mut clients = self.clients.write().await;
        if clients.contains_key(&client.client_id) {
            return Err(AuthError::invalid_request(format!(
                "Client '{}' already exists",
                client.client_id
            )));
        }
        clients.insert(client.client_id.clone(), client.clone());
        Ok(client.clone())
    }

    async fn update(&self, client_id: &str, client: &Client) -> AuthResult<Client> {
        client
            .validate()
            .map_err(|e| AuthError::invalid_request(e.to_string()))?;
        if client.client_id != client_id {
            return Err(AuthError::invalid_request("client_id cannot be changed"));
        }

        let mut clients = self.clients.write().await;
        let slot = clients
            .get_mut(client_id)
            .ok_or_else(|| AuthError::invalid_client(format!("Unknown client '{client_id}'")))?;
        *slot = client.clone();
        Ok(client.clone())
    }

    async fn delete(&self, client_id: &str) -> AuthResult<()> {
        self.clients
            .write()
            .await
            .remove(client_id)
            .map(|_| ())
            .ok_or_else(|| AuthError::invalid_client(format!("Unknown client '{client_id}'")))
    }

    async fn list(&self, limit: usize, offset: usize) -> AuthResult<Vec<Client>> {
        Ok(self
            .clients
            .read()
            .await
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn verify_secret(&self, client_id: &str, secret: &str) -> AuthResult<bool> {
        let hash = {
            let clients = self.clients.read().await;
            let client = clients
                .get(client_id)
                .ok_or_else(|| AuthError::invalid_client(format!("Unknown client '{client_id}'")))?;
            match &client.secret_hash {
                Some(hash) => hash.clone(),
                None => return Ok(false),
            }
        };
        secret::verify_secret(secret, &hash)
    }
}

// =============================================================================
// Scopes
// =============================================================================

#[async_trait]
impl ScopeStorage for InMemoryStorage {
    async fn find(&self, id: &str) -> AuthResult<Option<Scope>> {
        Ok(self.scopes.read().await.get(id).cloned())
    }

    async fn create(&self, scope: &Scope) -> AuthResult<Scope> {
        if scope.id.trim().is_empty() {
            return Err(AuthError::invalid_request("Scope id cannot be empty"));
        }
        self.scopes
            .write()
            .await
            .insert(scope.id.clone(), scope.clone());
        Ok(scope.clone())
    }

    async fn list(&self) -> AuthResult<Vec<Scope>> {
        Ok(self.scopes.read().await.values().cloned().collect())
    }
}

// =============================================================================
// Sessions
// =============================================================================

#[async_trait]
impl SessionStorage for InMemoryStorage {
    async fn create(&self, session: &Session) -> AuthResult<()> {
        let mut table = self.sessions.write().await;
        if table.sessions.contains_key(&session.id) {
            return Err(AuthError::storage(format!(
                "Session {} already exists",
                session.id
            )));
        }
        table.index(session);
        table.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Session>> {
        Ok(self.sessions.read().await.sessions.get(&id).cloned())
    }

    async fn find_by_token(
        &self,
        kind: TokenKind,
        token_hash: &str,
    ) -> AuthResult<Option<Session>> {
        let table = self.sessions.read().await;
        let session = table
            .token_index
            .get(token_hash)
            .and_then(|id| table.sessions.get(id))
            .filter(|session| session.find_token(kind, token_hash).is_some());
        Ok(session.cloned())
    }

    async fn exchange(&self, exchange: TokenExchange) -> AuthResult<Session> {
        if exchange.kind == TokenKind::AccessToken {
            return Err(AuthError::internal("access tokens cannot be exchanged"));
        }
        let mut table = self.sessions.write().await;

        let id = *table
            .token_index
            .get(&exchange.token_hash)
            .ok_or_else(|| AuthError::invalid_grant(format!("The {} is invalid", exchange.kind)))?;
        let current = table.sessions.get(&id).ok_or_else(|| {
            AuthError::invalid_grant("The session behind this token was revoked")
        })?;

        let presented = current
            .find_token(exchange.kind, &exchange.token_hash)
            .ok_or_else(|| AuthError::invalid_grant(format!("The {} is invalid", exchange.kind)))?;
        if current.client_id != exchange.client_id {
            return Err(AuthError::invalid_grant(format!(
                "The {} was issued to another client",
                exchange.kind
            )));
        }
        if presented.is_expired_at(exchange.now) {
            return Err(AuthError::invalid_grant(format!(
                "The {} has expired",
                exchange.kind
            )));
        }

        // Validation passed; nothing below can fail.
        let mut session = current.clone();
        table.unindex(&session);

        match exchange.kind {
            TokenKind::AuthorizationCode => session.authorization_code = None,
            TokenKind::RefreshToken => {
                let from_grace = session
                    .grace_refresh_token
                    .as_ref()
                    .is_some_and(|t| t.token_hash == exchange.token_hash);
                if from_grace {
                    session.grace_refresh_token = None;
                } else {
                    match exchange.retire {
                        Retirement::Consume => session.refresh_token = None,
                        Retirement::Grace => {
                            session.grace_refresh_token = session.refresh_token.take();
                        }
                        Retirement::Keep => {}
                    }
                }
            }
            TokenKind::AccessToken => {}
        }

        session.access_token = Some(exchange.access_token);
        if let Some(refresh) = exchange.refresh_token {
            session.refresh_token = Some(refresh);
        }

        table.index(&session);
        table.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn revoke(&self, id: Uuid) -> AuthResult<bool> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }

    async fn revoke_by_client(&self, client_id: &str) -> AuthResult<u64> {
        let mut table = self.sessions.write().await;
        let ids: Vec<Uuid> = table
            .sessions
            .values()
            .filter(|s| s.client_id == client_id)
            .map(|s| s.id)
            .collect();
        for id in &ids {
            table.remove(*id);
        }
        Ok(ids.len() as u64)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut table = self.sessions.write().await;
        let ids: Vec<Uuid> = table
            .sessions
            .values()
            .filter(|s| s.is_expired_at(now))
            .map(|s| s.id)
            .collect();
        for id in &ids {
            table.remove(*id);
        }
        Ok(ids.len() as u64)
    }

    async fn count(&self) -> AuthResult<usize> {
        Ok(self.sessions.read().await.sessions.len())
    }
}
