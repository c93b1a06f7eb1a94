use std::sync::Arc;
use tracing::info;

use crate::forwarding::Forwarder;
use crate::scheduler::Scheduler;

/// Periodic log line with the bot's state, so hosting logs show it is alive.
pub async fn register_heartbeat(
    scheduler: &Scheduler,
    cron_expr: &str,
    forwarder: Arc<Forwarder>,
) -> anyhow::Result<()> {
    scheduler
        .add_cron_job(cron_expr, "heartbeat", move || {
            let forwarder = forwarder.clone();
            Box::pin(async move {
                let status = forwarder.status().await;
                info!(
                    "Heartbeat: mode={}, targets={}, pending={}",
                    status.mode, status.targets, status.pending
                );
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarding::testing::RecordingClient;
    use crate::forwarding::ForwardingSettings;
    use crate::store::{Mode, StateStore};
    use std::time::Duration;
    use teloxide::types::UserId;

    async fn forwarder(dir: &tempfile::TempDir) -> Arc<Forwarder> {
        let store = StateStore::open(dir.path().join("state.json"), Mode::Auto).await;
        Arc::new(Forwarder::new(
            Arc::new(RecordingClient::new()),
            store,
            UserId(1),
            ForwardingSettings {
                send_timeout: Duration::from_secs(1),
                per_target_buttons: true,
                forwarded_only: false,
            },
        ))
    }

    #[tokio::test]
    async fn test_register_heartbeat() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new().await.unwrap();
        register_heartbeat(&scheduler, "0 0 * * * *", forwarder(&dir).await)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_cron_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new().await.unwrap();
        let err = register_heartbeat(&scheduler, "every hour", forwarder(&dir).await)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid cron expression"));
    }
}
