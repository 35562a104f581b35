use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// How long a stored verdict may be served without recomputation.
pub const CACHE_TTL_MS: Ms = 120_000;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as Ms
}

/// Availability states, ordered by severity. The derived `Ord` relies on
/// variant order: `Gone < Ordered < Reserved < Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Sold out: capacity exhausted by paid orders.
    Gone,
    /// Exhausted by pending (unpaid) orders. May free up if they expire.
    Ordered,
    /// Exhausted by blocking vouchers, cart holds or the waiting list.
    /// May free up if carts expire or vouchers go unredeemed.
    Reserved,
    /// Units are left for sale.
    Ok,
}

/// What the calculator answers: a state plus how many units remain.
/// `remaining == None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub state: Availability,
    pub remaining: Option<u32>,
}

impl Verdict {
    pub fn unlimited() -> Self {
        Self {
            state: Availability::Ok,
            remaining: None,
        }
    }

    pub fn ok(remaining: u32) -> Self {
        Self {
            state: Availability::Ok,
            remaining: Some(remaining),
        }
    }

    pub fn exhausted(state: Availability) -> Self {
        Self {
            state,
            remaining: Some(0),
        }
    }

    /// Key for combining verdicts across quotas: worst state first, then the
    /// smaller count, with unlimited larger than any finite count.
    pub fn sort_key(&self) -> (Availability, u64) {
        (self.state, self.remaining.map_or(u64::MAX, u64::from))
    }
}

/// Persisted memo of a computed verdict. A time-bounded hint, never a source
/// of truth — concurrent writers race on it harmlessly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedVerdict {
    pub state: Availability,
    pub remaining: Option<u32>,
    /// Paid-order count at computation time. Display-only; the one number
    /// still worth showing next to an unlimited quota.
    pub paid_orders: Option<u32>,
    pub computed_at: Ms,
}

impl CachedVerdict {
    pub fn is_hot(&self, now: Ms) -> bool {
        now - self.computed_at < CACHE_TTL_MS
    }

    pub fn verdict(&self) -> Verdict {
        Verdict {
            state: self.state,
            remaining: self.remaining,
        }
    }
}

/// The set of catalog keys a quota applies to.
///
/// Item-level entries only ever match positions without a variation; items
/// that have variations are covered through variation-level entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaScope {
    pub items: HashSet<Ulid>,
    pub variations: HashSet<Ulid>,
    /// Required when the owning event is a series, forbidden otherwise.
    pub subevent: Option<Ulid>,
}

impl QuotaScope {
    pub fn matches_position(
        &self,
        item: Ulid,
        variation: Option<Ulid>,
        subevent: Option<Ulid>,
    ) -> bool {
        if subevent != self.subevent {
            return false;
        }
        match variation {
            None => self.items.contains(&item),
            Some(v) => self.variations.contains(&v),
        }
    }
}

/// A named pool of sellable capacity.
#[derive(Debug, Clone)]
pub struct QuotaState {
    pub id: Ulid,
    pub name: String,
    /// `None` means unlimited.
    pub capacity: Option<u32>,
    pub scope: QuotaScope,
    pub cached: Option<CachedVerdict>,
}

impl QuotaState {
    pub fn new(id: Ulid, name: String, capacity: Option<u32>, scope: QuotaScope) -> Self {
        Self {
            id,
            name,
            capacity,
            scope,
            cached: None,
        }
    }
}

/// Snapshot of a quota for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaInfo {
    pub id: Ulid,
    pub name: String,
    pub capacity: Option<u32>,
    pub subevent: Option<Ulid>,
    pub cached: Option<CachedVerdict>,
}

// ── Demand records ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: Ulid,
    pub item: Ulid,
    pub variation: Option<Ulid>,
    pub subevent: Option<Ulid>,
    pub status: OrderStatus,
}

/// A shopping-cart hold on one unit, alive until `expires`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartHold {
    pub id: Ulid,
    pub item: Ulid,
    pub variation: Option<Ulid>,
    pub subevent: Option<Ulid>,
    pub expires: Ms,
    /// Voucher this hold redeems, if any. Holds backed by a still-active
    /// blocking voucher are counted through the voucher, not the cart.
    pub voucher: Option<Ulid>,
}

/// What a voucher is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherTarget {
    Item(Ulid),
    Variation(Ulid),
    /// Blocks a specific quota regardless of its item scope.
    Quota(Ulid),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: Ulid,
    pub target: VoucherTarget,
    pub subevent: Option<Ulid>,
    /// Whether unredeemed usages reserve quota capacity up front.
    pub block_quota: bool,
    pub valid_until: Option<Ms>,
    pub max_usages: u32,
    pub redeemed: u32,
}

impl Voucher {
    pub fn is_active(&self, now: Ms) -> bool {
        self.valid_until.is_none_or(|t| t >= now)
    }

    /// Usages that still reserve capacity, clipped at zero.
    pub fn free_usages(&self) -> u32 {
        self.max_usages.saturating_sub(self.redeemed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: Ulid,
    pub item: Ulid,
    pub variation: Option<Ulid>,
    pub subevent: Option<Ulid>,
    /// Set once the entry has been sent a voucher; such entries are counted
    /// through the voucher instead.
    pub voucher: Option<Ulid>,
}
