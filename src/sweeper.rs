use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::limits::COMPACT_CHECK_INTERVAL_SECS;
use crate::model::to_ms;

/// Backstop reconciliation: catches approved windows that elapsed without
/// an explicit transition.
pub async fn run_reconciler(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let changed = engine.reconcile_all(to_ms(chrono::Utc::now())).await;
        if changed > 0 {
            tracing::warn!("reconcile sweep corrected {changed} vehicle status(es)");
        }
    }
}

/// Compact the journal once `threshold` appends have accumulated.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(COMPACT_CHECK_INTERVAL_SECS));
    loop {
        interval.tick().await;
        compact_if_needed(&engine, threshold).await;
    }
}

async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.journal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_journal().await {
        Ok(true) => {
            info!("journal compacted after {appends} appends");
            true
        }
        Ok(false) => {
            tracing::debug!("journal compaction deferred, vehicle busy");
            false
        }
        Err(e) => {
            tracing::error!("journal compaction failed: {e}");
            false
        }
    }
}
