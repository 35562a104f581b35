use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::InMemoryStore;
use crate::model::now_ms;

/// Background task that periodically drops expired cart holds from the
/// store. Expired holds already stopped counting toward quota demand; this
/// keeps the record set from growing without bound.
pub async fn run_reaper(store: Arc<InMemoryStore>) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        let purged = store.purge_expired_holds(now_ms());
        if !purged.is_empty() {
            metrics::counter!(crate::observability::REAPED_HOLDS_TOTAL)
                .increment(purged.len() as u64);
            info!("reaped {} expired cart holds", purged.len());
        }
    }
}
