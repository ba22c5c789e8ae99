//! Periodic deletion of blocked and expired refresh token records.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::service::AuthService;

/// Spawn the purge loop. The first pass runs immediately; the task ends
/// when `cancel` fires.
pub fn spawn_token_purge(
    service: Arc<AuthService>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("token purge stopped");
                    return;
                }
                _ = interval.tick() => {
                    match service.purge_stale_tokens().await {
                        Ok(0) => {}
                        Ok(removed) => info!(removed, "purged stale token records"),
                        Err(e) => warn!(error = %e, "token purge failed"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::auth::testing::{Fixture, fixture};
    use crate::models::auth::TokenRecord;
    use crate::store::TokenStore;

    fn record(blocked: bool, expires_in: ChronoDuration) -> TokenRecord {
        let now = Utc::now();
        TokenRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "h".into(),
            blocked,
            issued_at: now,
            updated_at: now,
            expires_at: now + expires_in,
        }
    }

    #[tokio::test]
    async fn purge_runs_then_stops_on_cancel() {
        let Fixture { service, store, .. } = fixture().await;
        let live = record(false, ChronoDuration::hours(1));
        store.save(live.clone()).await.unwrap();
        store.save(record(true, ChronoDuration::hours(1))).await.unwrap();
        store.save(record(false, ChronoDuration::hours(-1))).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = spawn_token_purge(
            Arc::new(service),
            Duration::from_millis(10),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(store.token_records(), vec![live]);
    }
}
