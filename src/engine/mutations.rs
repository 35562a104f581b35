use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{DemandSource, Engine, EngineError};

impl<D: DemandSource> Engine<D> {
    /// Register a catalog item and its variations so scope validation and
    /// per-item checks can resolve them.
    pub fn register_item(&self, item: Ulid, variations: Vec<Ulid>) -> Result<(), EngineError> {
        if self.items.contains_key(&item) {
            return Err(EngineError::AlreadyExists(item));
        }
        for v in &variations {
            if self.variation_to_item.contains_key(v) {
                return Err(EngineError::AlreadyExists(*v));
            }
        }
        for v in &variations {
            self.variation_to_item.insert(*v, item);
        }
        self.items.insert(item, variations.into_iter().collect());
        Ok(())
    }

    pub fn create_quota(
        &self,
        id: Ulid,
        name: String,
        capacity: Option<u32>,
        scope: QuotaScope,
    ) -> Result<(), EngineError> {
        if self.quotas.len() >= MAX_QUOTAS_PER_EVENT {
            return Err(EngineError::LimitExceeded("too many quotas"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("quota name too long"));
        }
        if self.quotas.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        self.validate_scope(&scope)?;

        let state = QuotaState::new(id, name, capacity, scope);
        self.quotas.insert(id, Arc::new(RwLock::new(state)));
        // Display summaries go stale the moment the pool set changes.
        self.event_cache.clear();
        debug!("created quota {id}");
        Ok(())
    }

    /// Edit capacity and scope. Drops the quota's stored verdict and clears
    /// the event-wide display cache synchronously with the write.
    pub async fn update_quota(
        &self,
        id: Ulid,
        capacity: Option<u32>,
        scope: QuotaScope,
    ) -> Result<(), EngineError> {
        let shared = self.get_quota(&id).ok_or(EngineError::NotFound(id))?;
        self.validate_scope(&scope)?;

        {
            let mut guard = shared.write().await;
            guard.capacity = capacity;
            guard.scope = scope;
            guard.cached = None;
        }
        self.event_cache.clear();
        debug!("updated quota {id}");
        Ok(())
    }

    /// Delete a quota. Demand records are untouched — they simply stop
    /// being counted against anything.
    pub fn delete_quota(&self, id: Ulid) -> Result<(), EngineError> {
        self.quotas.remove(&id).ok_or(EngineError::NotFound(id))?;
        self.event_cache.clear();
        debug!("deleted quota {id}");
        Ok(())
    }

    /// Scope is validated here, at configuration time; the calculator
    /// assumes scope is valid and performs no re-validation.
    fn validate_scope(&self, scope: &QuotaScope) -> Result<(), EngineError> {
        if self.has_subevents && scope.subevent.is_none() {
            return Err(EngineError::SubeventRequired);
        }
        if !self.has_subevents && scope.subevent.is_some() {
            return Err(EngineError::InvalidScope(
                "subevent given for a non-series event",
            ));
        }
        if scope.items.len() + scope.variations.len() > MAX_SCOPE_ENTRIES {
            return Err(EngineError::LimitExceeded("scope too large"));
        }
        for item in &scope.items {
            if !self.items.contains_key(item) {
                return Err(EngineError::NotFound(*item));
            }
        }
        for variation in &scope.variations {
            let item = self
                .item_of_variation(variation)
                .ok_or(EngineError::NotFound(*variation))?;
            if !scope.items.contains(&item) {
                return Err(EngineError::InvalidScope(
                    "variation belongs to an item outside the quota's items",
                ));
            }
        }
        Ok(())
    }
}
