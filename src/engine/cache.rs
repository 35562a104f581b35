use std::time::Instant;

use dashmap::DashMap;
use tracing::warn;
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::availability::{CallCache, compute};
use super::{DemandSource, Engine, EngineError, ScopeFilter};

/// Key under which the per-event product-list summary is memoized one layer
/// up. Every successful recomputation deletes it.
pub const ITEM_QUOTA_CACHE_KEY: &str = "item_quota_cache";

/// Event-wide derived cache for display summaries. Holds whatever the
/// presentation layer wants to memoize across quotas; the engine only ever
/// deletes from it.
#[derive(Debug, Default)]
pub struct EventCache {
    entries: DashMap<String, serde_json::Value>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl<D: DemandSource> Engine<D> {
    /// Read-through availability for one quota: the single public entry
    /// point of the engine's fast path.
    ///
    /// `allow_stale` permits serving a stored verdict that is still within
    /// the staleness window. Stored verdicts are only ever produced by
    /// waitlist-inclusive computations, so a hot-cache read additionally
    /// requires `count_waitlist` — a waitlist-exclusive read always
    /// recomputes.
    ///
    /// The verdict is an admission hint under read skew, not a lock; two
    /// concurrent callers may see different answers within the window.
    pub async fn availability(
        &self,
        quota_id: Ulid,
        now: Ms,
        count_waitlist: bool,
        allow_stale: bool,
        mut call_cache: Option<&mut CallCache>,
    ) -> Result<Verdict, EngineError> {
        metrics::counter!(observability::AVAILABILITY_CHECKS_TOTAL).increment(1);

        let shared = self
            .get_quota(&quota_id)
            .ok_or(EngineError::NotFound(quota_id))?;

        if allow_stale && count_waitlist {
            let guard = shared.read().await;
            if let Some(cached) = guard.cached
                && cached.is_hot(now)
            {
                metrics::counter!(observability::VERDICT_CACHE_HITS_TOTAL).increment(1);
                return Ok(cached.verdict());
            }
        }

        if let Some(cache) = call_cache.as_deref_mut()
            && let Some(verdict) = cache.lookup(quota_id, count_waitlist)
        {
            return Ok(verdict);
        }

        // Snapshot capacity and scope; the lock must not be held across the
        // demand queries.
        let (capacity, scope) = {
            let guard = shared.read().await;
            (guard.capacity, guard.scope.clone())
        };
        let filter = ScopeFilter {
            quota: quota_id,
            scope: &scope,
        };

        metrics::counter!(observability::VERDICT_CACHE_MISSES_TOTAL).increment(1);
        let started = Instant::now();
        let result = compute(self.demand.as_ref(), &filter, capacity, now, count_waitlist).await;
        metrics::histogram!(observability::COMPUTE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        let computation = match result {
            Ok(c) => c,
            Err(e) => {
                // Never fabricate availability on a failure. A hot
                // waitlist-inclusive memo may still answer; otherwise the
                // caller gets the error.
                if count_waitlist {
                    let guard = shared.read().await;
                    if let Some(cached) = guard.cached
                        && cached.is_hot(now)
                    {
                        warn!("quota {quota_id}: demand query failed, serving hot verdict: {e}");
                        return Ok(cached.verdict());
                    }
                }
                return Err(e);
            }
        };

        // The per-event product summary is derived from this verdict.
        self.event_cache.delete(ITEM_QUOTA_CACHE_KEY);

        if count_waitlist {
            // Unlimited quotas skip all demand queries, but the paid count
            // is still persisted for display.
            let paid = match computation.paid_orders {
                Some(p) => p,
                None => self.demand.count_paid_orders(&filter).await?,
            };

            let mut guard = shared.write().await;
            // Last write wins, except a verdict that is still hot is never
            // replaced: a concurrent caller may have just written a fresher
            // one, and this one is no better.
            if !guard.cached.is_some_and(|c| c.is_hot(now)) {
                guard.cached = Some(CachedVerdict {
                    state: computation.verdict.state,
                    remaining: computation.verdict.remaining,
                    paid_orders: Some(paid.min(u64::from(u32::MAX)) as u32),
                    computed_at: now,
                });
            }
        }

        if let Some(cache) = call_cache {
            cache.store(quota_id, count_waitlist, computation.verdict);
        }

        Ok(computation.verdict)
    }

    /// Forcibly drop the stored verdict, then recompute from scratch.
    pub async fn rebuild_cache(&self, quota_id: Ulid, now: Ms) -> Result<Verdict, EngineError> {
        let shared = self
            .get_quota(&quota_id)
            .ok_or(EngineError::NotFound(quota_id))?;
        {
            let mut guard = shared.write().await;
            guard.cached = None;
        }
        self.availability(quota_id, now, true, false, None).await
    }
}
