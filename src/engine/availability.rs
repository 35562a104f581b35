use std::collections::HashMap;

use ulid::Ulid;

use crate::model::*;

use super::{DemandSource, EngineError, ScopeFilter};

// ── Availability Algorithm ────────────────────────────────────────

/// Result of one calculator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Computation {
    pub verdict: Verdict,
    /// Paid-order count observed on the finite-capacity path. `None` when
    /// capacity is unlimited, because no demand query is issued then.
    pub paid_orders: Option<u64>,
}

/// Subtract demand from capacity in fixed priority order, short-circuiting
/// the first time the remainder reaches zero:
///
/// 1. paid orders → `Gone`
/// 2. pending orders → `Ordered`
/// 3. blocking vouchers → `Reserved`
/// 4. cart holds → `Reserved`
/// 5. waiting list (only when `count_waitlist`) → `Reserved`
///
/// Unlimited capacity returns `(Ok, unlimited)` without touching the demand
/// source at all. Demand sources after the short-circuit point are never
/// queried either.
pub async fn compute<D: DemandSource + ?Sized>(
    demand: &D,
    filter: &ScopeFilter<'_>,
    capacity: Option<u32>,
    now: Ms,
    count_waitlist: bool,
) -> Result<Computation, EngineError> {
    let Some(capacity) = capacity else {
        return Ok(Computation {
            verdict: Verdict::unlimited(),
            paid_orders: None,
        });
    };

    let paid = demand.count_paid_orders(filter).await?;
    let mut left = i64::from(capacity) - paid as i64;
    if left <= 0 {
        return Ok(exhausted(Availability::Gone, paid));
    }

    left -= demand.count_pending_orders(filter).await? as i64;
    if left <= 0 {
        return Ok(exhausted(Availability::Ordered, paid));
    }

    left -= demand.count_blocking_vouchers(filter, now).await? as i64;
    if left <= 0 {
        return Ok(exhausted(Availability::Reserved, paid));
    }

    left -= demand.count_in_cart(filter, now).await? as i64;
    if left <= 0 {
        return Ok(exhausted(Availability::Reserved, paid));
    }

    if count_waitlist {
        left -= demand.count_waiting_list(filter).await? as i64;
        if left <= 0 {
            return Ok(exhausted(Availability::Reserved, paid));
        }
    }

    Ok(Computation {
        verdict: Verdict::ok(left as u32),
        paid_orders: Some(paid),
    })
}

fn exhausted(state: Availability, paid: u64) -> Computation {
    Computation {
        verdict: Verdict::exhausted(state),
        paid_orders: Some(paid),
    }
}

/// Fold the verdicts of every quota protecting the same item: the least
/// available state wins, ties broken by the smaller remaining count. An
/// empty input means no quota restricts the sale.
pub fn combine<I: IntoIterator<Item = Verdict>>(verdicts: I) -> Verdict {
    verdicts
        .into_iter()
        .min_by_key(|v| v.sort_key())
        .unwrap_or_else(Verdict::unlimited)
}

/// Call-scoped memo shared across the quota evaluations of one logical
/// operation, e.g. every line of a single cart. Keyed by quota identity.
/// Flipping the waitlist flag mid-operation drops all entries, since
/// verdicts for the two flags are not comparable.
#[derive(Debug, Default)]
pub struct CallCache {
    entries: HashMap<Ulid, Verdict>,
    count_waitlist: Option<bool>,
}

impl CallCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&mut self, quota: Ulid, count_waitlist: bool) -> Option<Verdict> {
        if self.count_waitlist.is_some_and(|f| f != count_waitlist) {
            self.entries.clear();
            self.count_waitlist = None;
        }
        self.entries.get(&quota).copied()
    }

    pub fn store(&mut self, quota: Ulid, count_waitlist: bool, verdict: Verdict) {
        self.count_waitlist = Some(count_waitlist);
        self.entries.insert(quota, verdict);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;

    use super::*;

    /// Fixed counts, no records behind them.
    struct FixedDemand {
        paid: u64,
        pending: u64,
        blocking: u64,
        cart: u64,
        waitlist: u64,
    }

    impl FixedDemand {
        fn none() -> Self {
            Self {
                paid: 0,
                pending: 0,
                blocking: 0,
                cart: 0,
                waitlist: 0,
            }
        }
    }

    #[async_trait]
    impl DemandSource for FixedDemand {
        async fn count_paid_orders(&self, _: &ScopeFilter<'_>) -> Result<u64, EngineError> {
            Ok(self.paid)
        }
        async fn count_pending_orders(&self, _: &ScopeFilter<'_>) -> Result<u64, EngineError> {
            Ok(self.pending)
        }
        async fn count_blocking_vouchers(
            &self,
            _: &ScopeFilter<'_>,
            _: Ms,
        ) -> Result<u64, EngineError> {
            Ok(self.blocking)
        }
        async fn count_in_cart(&self, _: &ScopeFilter<'_>, _: Ms) -> Result<u64, EngineError> {
            Ok(self.cart)
        }
        async fn count_waiting_list(&self, _: &ScopeFilter<'_>) -> Result<u64, EngineError> {
            Ok(self.waitlist)
        }
    }

    /// Proves the calculator never queries demand. Any call panics.
    struct PanickingDemand;

    #[async_trait]
    impl DemandSource for PanickingDemand {
        async fn count_paid_orders(&self, _: &ScopeFilter<'_>) -> Result<u64, EngineError> {
            panic!("demand queried for an unlimited quota")
        }
        async fn count_pending_orders(&self, _: &ScopeFilter<'_>) -> Result<u64, EngineError> {
            panic!("demand queried for an unlimited quota")
        }
        async fn count_blocking_vouchers(
            &self,
            _: &ScopeFilter<'_>,
            _: Ms,
        ) -> Result<u64, EngineError> {
            panic!("demand queried for an unlimited quota")
        }
        async fn count_in_cart(&self, _: &ScopeFilter<'_>, _: Ms) -> Result<u64, EngineError> {
            panic!("demand queried for an unlimited quota")
        }
        async fn count_waiting_list(&self, _: &ScopeFilter<'_>) -> Result<u64, EngineError> {
            panic!("demand queried for an unlimited quota")
        }
    }

    fn scope() -> QuotaScope {
        QuotaScope {
            items: HashSet::from([Ulid::new()]),
            variations: HashSet::new(),
            subevent: None,
        }
    }

    async fn run(demand: &FixedDemand, capacity: Option<u32>, count_waitlist: bool) -> Verdict {
        let scope = scope();
        let filter = ScopeFilter {
            quota: Ulid::new(),
            scope: &scope,
        };
        compute(demand, &filter, capacity, 0, count_waitlist)
            .await
            .unwrap()
            .verdict
    }

    #[tokio::test]
    async fn unlimited_issues_no_demand_queries() {
        let scope = scope();
        let filter = ScopeFilter {
            quota: Ulid::new(),
            scope: &scope,
        };
        let result = compute(&PanickingDemand, &filter, None, 0, true)
            .await
            .unwrap();
        assert_eq!(result.verdict, Verdict::unlimited());
        assert_eq!(result.paid_orders, None);
    }

    #[tokio::test]
    async fn empty_demand_leaves_full_capacity() {
        let verdict = run(&FixedDemand::none(), Some(100), true).await;
        assert_eq!(verdict, Verdict::ok(100));
    }

    #[tokio::test]
    async fn paid_at_capacity_is_gone() {
        let demand = FixedDemand {
            paid: 100,
            ..FixedDemand::none()
        };
        let verdict = run(&demand, Some(100), true).await;
        assert_eq!(verdict, Verdict::exhausted(Availability::Gone));
    }

    #[tokio::test]
    async fn paid_over_capacity_is_gone() {
        let demand = FixedDemand {
            paid: 150,
            ..FixedDemand::none()
        };
        let verdict = run(&demand, Some(100), true).await;
        assert_eq!(verdict, Verdict::exhausted(Availability::Gone));
    }

    #[tokio::test]
    async fn pending_exhausts_to_ordered() {
        let demand = FixedDemand {
            paid: 80,
            pending: 15,
            ..FixedDemand::none()
        };
        let verdict = run(&demand, Some(95), true).await;
        assert_eq!(verdict, Verdict::exhausted(Availability::Ordered));
    }

    #[tokio::test]
    async fn blocking_vouchers_exhaust_to_reserved() {
        let demand = FixedDemand {
            paid: 50,
            pending: 30,
            blocking: 20,
            ..FixedDemand::none()
        };
        let verdict = run(&demand, Some(100), true).await;
        assert_eq!(verdict, Verdict::exhausted(Availability::Reserved));
    }

    #[tokio::test]
    async fn cart_holds_exhaust_to_reserved() {
        let demand = FixedDemand {
            paid: 50,
            cart: 50,
            ..FixedDemand::none()
        };
        let verdict = run(&demand, Some(100), true).await;
        assert_eq!(verdict, Verdict::exhausted(Availability::Reserved));
    }

    #[tokio::test]
    async fn waitlist_exhausts_to_reserved_when_counted() {
        let demand = FixedDemand {
            paid: 50,
            waitlist: 50,
            ..FixedDemand::none()
        };
        let verdict = run(&demand, Some(100), true).await;
        assert_eq!(verdict, Verdict::exhausted(Availability::Reserved));
    }

    #[tokio::test]
    async fn waitlist_ignored_when_flag_off() {
        let demand = FixedDemand {
            paid: 50,
            waitlist: 50,
            ..FixedDemand::none()
        };
        let verdict = run(&demand, Some(100), false).await;
        assert_eq!(verdict, Verdict::ok(50));
    }

    #[tokio::test]
    async fn disabling_waitlist_never_decreases_remaining() {
        for waitlist in [0u64, 1, 10, 100] {
            let demand = FixedDemand {
                paid: 20,
                pending: 5,
                cart: 3,
                waitlist,
                ..FixedDemand::none()
            };
            let with = run(&demand, Some(40), true).await;
            let without = run(&demand, Some(40), false).await;
            assert!(
                without.remaining.unwrap() >= with.remaining.unwrap_or(0),
                "waitlist={waitlist}: {without:?} < {with:?}"
            );
        }
    }

    #[tokio::test]
    async fn positive_remainder_after_all_steps() {
        let demand = FixedDemand {
            paid: 30,
            cart: 10,
            ..FixedDemand::none()
        };
        let verdict = run(&demand, Some(100), false).await;
        assert_eq!(verdict, Verdict::ok(60));
    }

    #[tokio::test]
    async fn gone_takes_priority_over_later_steps() {
        // Even with huge later demand, paid exhaustion decides the state.
        let demand = FixedDemand {
            paid: 100,
            pending: 1000,
            blocking: 1000,
            cart: 1000,
            waitlist: 1000,
        };
        let verdict = run(&demand, Some(100), true).await;
        assert_eq!(verdict.state, Availability::Gone);
    }

    #[tokio::test]
    async fn paid_count_reported_for_finite_capacity() {
        let scope = scope();
        let filter = ScopeFilter {
            quota: Ulid::new(),
            scope: &scope,
        };
        let demand = FixedDemand {
            paid: 7,
            ..FixedDemand::none()
        };
        let result = compute(&demand, &filter, Some(10), 0, true).await.unwrap();
        assert_eq!(result.paid_orders, Some(7));
    }

    // ── combine ───────────────────────────────────────────

    #[test]
    fn combine_takes_least_available_state() {
        let combined = combine([Verdict::exhausted(Availability::Gone), Verdict::ok(50)]);
        assert_eq!(combined, Verdict::exhausted(Availability::Gone));
    }

    #[test]
    fn combine_breaks_state_ties_by_smaller_count() {
        let combined = combine([Verdict::ok(50), Verdict::ok(3)]);
        assert_eq!(combined, Verdict::ok(3));
    }

    #[test]
    fn combine_unlimited_loses_to_finite() {
        let combined = combine([Verdict::unlimited(), Verdict::ok(10)]);
        assert_eq!(combined, Verdict::ok(10));
    }

    #[test]
    fn combine_empty_is_unlimited() {
        assert_eq!(combine(std::iter::empty::<Verdict>()), Verdict::unlimited());
    }

    // ── CallCache ─────────────────────────────────────────

    #[test]
    fn call_cache_round_trip() {
        let mut cache = CallCache::new();
        let quota = Ulid::new();
        assert_eq!(cache.lookup(quota, true), None);
        cache.store(quota, true, Verdict::ok(5));
        assert_eq!(cache.lookup(quota, true), Some(Verdict::ok(5)));
    }

    #[test]
    fn call_cache_cleared_when_waitlist_flag_flips() {
        let mut cache = CallCache::new();
        let quota = Ulid::new();
        cache.store(quota, true, Verdict::ok(5));
        assert_eq!(cache.lookup(quota, false), None);
        assert!(cache.is_empty());
    }
}
