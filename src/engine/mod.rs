mod availability;
mod cache;
mod error;
mod mutations;
mod queries;
mod store;

pub use availability::{CallCache, Computation, combine, compute};
pub use cache::{EventCache, ITEM_QUOTA_CACHE_KEY};
pub use error::EngineError;
pub use store::InMemoryStore;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedQuotaState = Arc<RwLock<QuotaState>>;

/// Explicit scope predicate handed to demand-count queries, replacing
/// implicit relationship traversal: item-set membership, variation-set
/// membership and subevent equality, nothing else.
pub struct ScopeFilter<'a> {
    pub quota: Ulid,
    pub scope: &'a QuotaScope,
}

impl ScopeFilter<'_> {
    pub fn matches_position(
        &self,
        item: Ulid,
        variation: Option<Ulid>,
        subevent: Option<Ulid>,
    ) -> bool {
        self.scope.matches_position(item, variation, subevent)
    }

    /// A voucher blocks this quota if it targets the quota itself or any
    /// key in its scope, on the same subevent.
    pub fn matches_voucher(&self, voucher: &Voucher) -> bool {
        if voucher.subevent != self.scope.subevent {
            return false;
        }
        match voucher.target {
            VoucherTarget::Quota(q) => q == self.quota,
            VoucherTarget::Item(item) => self.scope.items.contains(&item),
            VoucherTarget::Variation(variation) => self.scope.variations.contains(&variation),
        }
    }
}

/// Read-only count queries over demand records, scoped by a [`ScopeFilter`].
///
/// Implementations must not take exclusive locks: these run on every cache
/// miss and must not serialize concurrent readers against each other or
/// against writers of demand records. No internal retries — a failure
/// surfaces as [`EngineError::DemandUnavailable`].
#[async_trait]
pub trait DemandSource: Send + Sync {
    async fn count_paid_orders(&self, filter: &ScopeFilter<'_>) -> Result<u64, EngineError>;

    async fn count_pending_orders(&self, filter: &ScopeFilter<'_>) -> Result<u64, EngineError>;

    /// Sum of `max(0, max_usages - redeemed)` over active blocking vouchers
    /// matching the scope directly or targeting the quota, clipped per
    /// voucher.
    async fn count_blocking_vouchers(
        &self,
        filter: &ScopeFilter<'_>,
        now: Ms,
    ) -> Result<u64, EngineError>;

    /// Unexpired cart holds, excluding holds tied to a still-active
    /// blocking voucher (those are already counted above).
    async fn count_in_cart(&self, filter: &ScopeFilter<'_>, now: Ms) -> Result<u64, EngineError>;

    /// Waiting-list entries with no attached voucher.
    async fn count_waiting_list(&self, filter: &ScopeFilter<'_>) -> Result<u64, EngineError>;
}

/// Quota engine for one event. Owns the quotas, the catalog index needed
/// for scope validation, and the event-wide derived display cache; demand
/// records live behind the [`DemandSource`] seam.
pub struct Engine<D: DemandSource> {
    quotas: DashMap<Ulid, SharedQuotaState>,
    /// Item → its variation ids.
    items: DashMap<Ulid, HashSet<Ulid>>,
    /// Reverse lookup: variation id → item id.
    variation_to_item: DashMap<Ulid, Ulid>,
    has_subevents: bool,
    pub event_cache: EventCache,
    demand: Arc<D>,
}

impl<D: DemandSource> Engine<D> {
    pub fn new(demand: Arc<D>, has_subevents: bool) -> Self {
        Self {
            quotas: DashMap::new(),
            items: DashMap::new(),
            variation_to_item: DashMap::new(),
            has_subevents,
            event_cache: EventCache::new(),
            demand,
        }
    }

    pub fn has_subevents(&self) -> bool {
        self.has_subevents
    }

    pub fn get_quota(&self, id: &Ulid) -> Option<SharedQuotaState> {
        self.quotas.get(id).map(|e| e.value().clone())
    }

    pub fn quota_ids(&self) -> Vec<Ulid> {
        self.quotas.iter().map(|e| *e.key()).collect()
    }

    pub fn item_of_variation(&self, variation: &Ulid) -> Option<Ulid> {
        self.variation_to_item.get(variation).map(|e| *e.value())
    }
}
