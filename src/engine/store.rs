use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::{DemandSource, EngineError, ScopeFilter};

/// Demand records behind the [`DemandSource`] seam: order lines, cart
/// holds, vouchers and waiting-list entries. Lifecycle of these records is
/// owned by checkout and voucher flows elsewhere; the engine only counts
/// them.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    orders: DashMap<Ulid, OrderLine>,
    holds: DashMap<Ulid, CartHold>,
    vouchers: DashMap<Ulid, Voucher>,
    waitlist: DashMap<Ulid, WaitlistEntry>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Orders ───────────────────────────────────────────────

    pub fn insert_order(&self, line: OrderLine) {
        self.orders.insert(line.id, line);
    }

    pub fn set_order_status(&self, id: &Ulid, status: OrderStatus) -> bool {
        match self.orders.get_mut(id) {
            Some(mut line) => {
                line.status = status;
                true
            }
            None => false,
        }
    }

    pub fn remove_order(&self, id: &Ulid) -> Option<OrderLine> {
        self.orders.remove(id).map(|(_, line)| line)
    }

    // ── Cart holds ───────────────────────────────────────────

    pub fn insert_hold(&self, hold: CartHold) {
        self.holds.insert(hold.id, hold);
    }

    pub fn remove_hold(&self, id: &Ulid) -> Option<CartHold> {
        self.holds.remove(id).map(|(_, hold)| hold)
    }

    /// Drop holds whose expiry has passed. They already stopped counting
    /// toward demand; this is garbage collection. Returns the removed ids.
    pub fn purge_expired_holds(&self, now: Ms) -> Vec<Ulid> {
        let expired: Vec<Ulid> = self
            .holds
            .iter()
            .filter(|e| e.value().expires < now)
            .map(|e| *e.key())
            .collect();
        for id in &expired {
            self.holds.remove(id);
        }
        expired
    }

    pub fn hold_count(&self) -> usize {
        self.holds.len()
    }

    // ── Vouchers ─────────────────────────────────────────────

    pub fn insert_voucher(&self, voucher: Voucher) {
        self.vouchers.insert(voucher.id, voucher);
    }

    /// Record one redemption. Returns false when the voucher is unknown.
    pub fn redeem_voucher(&self, id: &Ulid) -> bool {
        match self.vouchers.get_mut(id) {
            Some(mut v) => {
                v.redeemed += 1;
                true
            }
            None => false,
        }
    }

    pub fn remove_voucher(&self, id: &Ulid) -> Option<Voucher> {
        self.vouchers.remove(id).map(|(_, v)| v)
    }

    // ── Waiting list ─────────────────────────────────────────

    pub fn insert_waitlist(&self, entry: WaitlistEntry) {
        self.waitlist.insert(entry.id, entry);
    }

    /// Attach a voucher to a waiting-list entry; from then on the entry is
    /// counted through the voucher.
    pub fn assign_waitlist_voucher(&self, id: &Ulid, voucher: Ulid) -> bool {
        match self.waitlist.get_mut(id) {
            Some(mut entry) => {
                entry.voucher = Some(voucher);
                true
            }
            None => false,
        }
    }

    pub fn remove_waitlist(&self, id: &Ulid) -> Option<WaitlistEntry> {
        self.waitlist.remove(id).map(|(_, e)| e)
    }

    /// Whether a hold's capacity is already accounted for by the blocking
    /// voucher it redeems.
    fn hold_counted_via_voucher(&self, hold: &CartHold, now: Ms) -> bool {
        hold.voucher
            .and_then(|vid| self.vouchers.get(&vid))
            .is_some_and(|v| v.block_quota && v.is_active(now))
    }
}

#[async_trait]
impl DemandSource for InMemoryStore {
    async fn count_paid_orders(&self, filter: &ScopeFilter<'_>) -> Result<u64, EngineError> {
        Ok(self
            .orders
            .iter()
            .filter(|e| {
                let line = e.value();
                line.status == OrderStatus::Paid
                    && filter.matches_position(line.item, line.variation, line.subevent)
            })
            .count() as u64)
    }

    async fn count_pending_orders(&self, filter: &ScopeFilter<'_>) -> Result<u64, EngineError> {
        Ok(self
            .orders
            .iter()
            .filter(|e| {
                let line = e.value();
                line.status == OrderStatus::Pending
                    && filter.matches_position(line.item, line.variation, line.subevent)
            })
            .count() as u64)
    }

    async fn count_blocking_vouchers(
        &self,
        filter: &ScopeFilter<'_>,
        now: Ms,
    ) -> Result<u64, EngineError> {
        Ok(self
            .vouchers
            .iter()
            .filter(|e| {
                let v = e.value();
                v.block_quota && v.is_active(now) && filter.matches_voucher(v)
            })
            .map(|e| u64::from(e.value().free_usages()))
            .sum())
    }

    async fn count_in_cart(&self, filter: &ScopeFilter<'_>, now: Ms) -> Result<u64, EngineError> {
        Ok(self
            .holds
            .iter()
            .filter(|e| {
                let hold = e.value();
                hold.expires >= now
                    && filter.matches_position(hold.item, hold.variation, hold.subevent)
                    && !self.hold_counted_via_voucher(hold, now)
            })
            .count() as u64)
    }

    async fn count_waiting_list(&self, filter: &ScopeFilter<'_>) -> Result<u64, EngineError> {
        Ok(self
            .waitlist
            .iter()
            .filter(|e| {
                let entry = e.value();
                entry.voucher.is_none()
                    && filter.matches_position(entry.item, entry.variation, entry.subevent)
            })
            .count() as u64)
    }
}
