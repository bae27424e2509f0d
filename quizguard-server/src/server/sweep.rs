//! Retention sweep for safety alerts. Alerts expire 90 days after
//! creation and must become unrecoverable; the sweep hard-deletes them
//! together with their derived notifications. Idempotent by construction.

use chrono::Utc;
use std::time::Duration;

use super::AppState;

pub fn spawn_retention_sweep(state: AppState) -> tokio::task::JoinHandle<()> {
    let minutes = state.config.alert_sweep_minutes.unwrap_or(60).max(1);
    let period = Duration::from_secs(minutes * 60);
    let shutdown = state.shutdown_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
            match state
                .store
                .purge_expired_alerts(Utc::now().naive_utc())
                .await
            {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "retention sweep removed expired alerts"),
                Err(e) => tracing::warn!(error=%e, "retention sweep failed"),
            }
        }
    })
}
