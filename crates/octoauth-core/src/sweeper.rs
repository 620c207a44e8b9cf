//! Periodic removal of sessions whose tokens have all expired.
//!
//! A sweep only deletes sessions in which every token slot is past its
//! expiry. Live sessions are never touched, so a sweep racing a token
//! exchange is harmless.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::storage::SessionStorage;

/// Result of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub sessions_removed: u64,
}

pub struct ExpirySweeper {
    sessions: Arc<dyn SessionStorage>,
    interval: Duration,
}

impl ExpirySweeper {
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStorage>, interval: Duration) -> Self {
        Self { sessions, interval }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Deletes every fully expired session once.
    pub async fn sweep(&self) -> AuthResult<SweepReport> {
        self.sweep_at(OffsetDateTime::now_utc()).await
    }

    /// Sweep against an explicit clock.
    pub async fn sweep_at(&self, now: OffsetDateTime) -> AuthResult<SweepReport> {
        let sessions_removed = self.sessions.delete_expired(now).await?;
        if sessions_removed > 0 {
            tracing::info!(removed = sessions_removed, "Swept expired sessions");
        }
        Ok(SweepReport { sessions_removed })
    }

    /// Runs [`sweep`](Self::sweep) every `interval` until the task is aborted.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            // The first tick fires immediately.
            interval.tick().await;

            loop {
                interval.tick().await;

                match self.sweep().await {
                    Ok(report) => {
                        tracing::debug!(
                            removed = report.sessions_removed,
                            "Expiry sweep completed"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Expiry sweep failed");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::storage::InMemoryStorage;
    use crate::types::{IssuedToken, Session};

    async fn insert(storage: &InMemoryStorage, ttl: Duration, issued_at: OffsetDateTime) {
        let (_, access) = IssuedToken::mint(ttl, BTreeSet::new(), issued_at);
        let session =
            Session::new("app", None, BTreeSet::new(), issued_at).with_access_token(access);
        SessionStorage::create(storage, &session).await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let storage = Arc::new(InMemoryStorage::new());
        let now = OffsetDateTime::now_utc();
        insert(&storage, Duration::from_secs(60), now - Duration::from_secs(600)).await;
        insert(&storage, Duration::from_secs(3600), now).await;

        let sweeper = ExpirySweeper::new(storage.clone(), Duration::from_secs(60));
        assert_eq!(sweeper.sweep_at(now).await.unwrap().sessions_removed, 1);
        assert_eq!(storage.count().await.unwrap(), 1);
        assert_eq!(sweeper.sweep_at(now).await.unwrap().sessions_removed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweeper_runs_on_interval() {
        let storage = Arc::new(InMemoryStorage::new());
        let now = OffsetDateTime::now_utc();
        insert(&storage, Duration::from_secs(1), now - Duration::from_secs(10)).await;

        let sweeper = Arc::new(ExpirySweeper::new(storage.clone(), Duration::from_secs(30)));
        let handle = sweeper.spawn();

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(storage.count().await.unwrap(), 0);
        handle.abort();
    }
}
