use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{CallCache, combine};
use super::{DemandSource, Engine, EngineError};

impl<D: DemandSource> Engine<D> {
    /// Verdicts for many quotas within one logical operation, sharing one
    /// call-scoped memo. Per-quota semantics are identical to
    /// [`Engine::availability`].
    pub async fn availability_bulk(
        &self,
        quota_ids: &[Ulid],
        now: Ms,
        count_waitlist: bool,
    ) -> Result<Vec<(Ulid, Verdict)>, EngineError> {
        if quota_ids.len() > MAX_BULK_QUOTAS {
            return Err(EngineError::LimitExceeded("too many quota IDs"));
        }
        let mut cache = CallCache::new();
        let mut out = Vec::with_capacity(quota_ids.len());
        for &id in quota_ids {
            let verdict = self
                .availability(id, now, count_waitlist, false, Some(&mut cache))
                .await?;
            out.push((id, verdict));
        }
        Ok(out)
    }

    /// Combined verdict across every quota protecting an item that has no
    /// variations. Items with variations must be checked per variation.
    pub async fn check_item(
        &self,
        item: Ulid,
        subevent: Option<Ulid>,
        now: Ms,
        count_waitlist: bool,
        ignored: &[Ulid],
        call_cache: Option<&mut CallCache>,
    ) -> Result<Verdict, EngineError> {
        let variations = self
            .items
            .get(&item)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(item))?;
        if !variations.is_empty() {
            return Err(EngineError::InvalidScope(
                "item has variations; check each variation instead",
            ));
        }
        self.check_key(item, None, subevent, now, count_waitlist, ignored, call_cache)
            .await
    }

    /// Combined verdict across every quota protecting one variation.
    pub async fn check_variation(
        &self,
        variation: Ulid,
        subevent: Option<Ulid>,
        now: Ms,
        count_waitlist: bool,
        ignored: &[Ulid],
        call_cache: Option<&mut CallCache>,
    ) -> Result<Verdict, EngineError> {
        let item = self
            .item_of_variation(&variation)
            .ok_or(EngineError::NotFound(variation))?;
        self.check_key(
            item,
            Some(variation),
            subevent,
            now,
            count_waitlist,
            ignored,
            call_cache,
        )
        .await
    }

    /// Snapshot of every quota, for listings.
    pub async fn list_quotas(&self) -> Vec<QuotaInfo> {
        let snapshot: Vec<_> = self.quotas.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(snapshot.len());
        for shared in snapshot {
            let guard = shared.read().await;
            out.push(QuotaInfo {
                id: guard.id,
                name: guard.name.clone(),
                capacity: guard.capacity,
                subevent: guard.scope.subevent,
                cached: guard.cached,
            });
        }
        out
    }

    #[allow(clippy::too_many_arguments)]
    async fn check_key(
        &self,
        item: Ulid,
        variation: Option<Ulid>,
        subevent: Option<Ulid>,
        now: Ms,
        count_waitlist: bool,
        ignored: &[Ulid],
        mut call_cache: Option<&mut CallCache>,
    ) -> Result<Verdict, EngineError> {
        if self.has_subevents && subevent.is_none() {
            return Err(EngineError::SubeventRequired);
        }
        if !self.has_subevents && subevent.is_some() {
            return Err(EngineError::InvalidScope(
                "subevent given for a non-series event",
            ));
        }

        let quota_ids = self
            .applicable_quotas(item, variation, subevent, ignored)
            .await;
        if quota_ids.is_empty() {
            // Nothing restricts the sale.
            return Ok(Verdict::unlimited());
        }

        let mut verdicts = Vec::with_capacity(quota_ids.len());
        for id in quota_ids {
            let verdict = self
                .availability(id, now, count_waitlist, false, call_cache.as_deref_mut())
                .await?;
            verdicts.push(verdict);
        }
        Ok(combine(verdicts))
    }

    /// Quotas whose scope covers the given key. The map is snapshotted
    /// first so no shard lock is held across an await.
    async fn applicable_quotas(
        &self,
        item: Ulid,
        variation: Option<Ulid>,
        subevent: Option<Ulid>,
        ignored: &[Ulid],
    ) -> Vec<Ulid> {
        let snapshot: Vec<_> = self
            .quotas
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();

        let mut out = Vec::new();
        for (id, shared) in snapshot {
            if ignored.contains(&id) {
                continue;
            }
            let guard = shared.read().await;
            if guard.scope.matches_position(item, variation, subevent) {
                out.push(id);
            }
        }
        out
    }
}
