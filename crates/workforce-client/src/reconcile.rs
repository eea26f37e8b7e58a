use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, ApiError};
use crate::store::{SharedStore, Store};

/// Fetch `/api/tasks` once and reconcile the store against it. Returns
/// whether the store changed.
pub async fn poll_once(api: &ApiClient, token: &str, store: &SharedStore) -> Result<bool, ApiError> {
    let fresh = api.list_tasks(token, None).await?;
    Ok(store.update(|s| s.reconcile_tasks(fresh)).await)
}

/// Poll every `interval` until cancelled. Failures are logged and the next
/// tick simply tries again, except a rejected token: that clears the
/// session and cancels `cancel`, stopping the rest of the mount with it.
pub async fn run(
    api: ApiClient,
    token: String,
    store: SharedStore,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {},
        }
        tokio::select! {
            () = cancel.cancelled() => break,
            result = poll_once(&api, &token, &store) => match result {
                Ok(true) => tracing::debug!("Reconciled tasks from poll"),
                Ok(false) => {},
                Err(ApiError::Unauthorized(reason)) => {
                    tracing::warn!(%reason, "Task poll rejected the session token, logging out");
                    store.update(Store::clear_session).await;
                    cancel.cancel();
                    break;
                },
                Err(e) => tracing::debug!(error = %e, "Task poll failed"),
            },
        }
    }
}
