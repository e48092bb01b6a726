//! Periodic reconciliation between the acquisition engine and the ledger.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::AcquisitionEngine;
use crate::ledger::StateStore;

/// Poll the engine on a fixed interval and fold every live observation
/// into the store. Records the engine no longer knows about are left
/// untouched and keep serving as stale entries.
///
/// Engine failures are logged and retried on the next cycle; they never
/// take the process down.
pub async fn run_reconciler(
    store: StateStore,
    engine: Arc<dyn AcquisitionEngine>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let observations = match engine.list_active().await {
            Ok(observations) => observations,
            Err(err) => {
                warn!(%err, "Reconciliation skipped, engine unreachable");
                continue;
            }
        };

        let count = observations.len();
        for obs in observations {
            store.upsert_from_observation(obs).await;
        }
        debug!(count, "Reconciliation pass complete");
    }

    info!("Reconciler stopped");
}
