//! Authoritative in-memory store of active orders and their id mappings.
//!
//! [`OrderRegistry::register`] is the only path that feeds the per-ticker sent-volume
//! counter. It counts each order once, keyed by order id, so a strategy ref reused for a
//! fresh order is counted again while re-registering the same order is not.

use crate::order::{EtfConvertRequest, Order};
use crate::types::{CustId, ExchangeRef, LogicId, StrategyRef};
use log::{debug, info};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct OrderRegistry {
    active: BTreeMap<StrategyRef, Order>,
    // every exchange ref ever seen, including retired orders
    exchange_refs: HashMap<ExchangeRef, StrategyRef>,
    seen: HashSet<Uuid>,
    sent_volume: HashMap<String, Decimal>,
    logic_order_counts: BTreeMap<LogicId, u64>,
    filled: HashSet<StrategyRef>,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite by strategy ref. Orders without a strategy ref are ignored and
    /// `false` is returned. Returns `true` when this order was never registered before.
    pub fn register(&mut self, order: Order) -> bool {
        let Some(strategy_ref) = order.strategy_ref().cloned() else {
            return false;
        };
        let newly_seen = self.seen.insert(order.id());
        if newly_seen {
            *self
                .sent_volume
                .entry(order.ticker().to_string())
                .or_insert(Decimal::ZERO) += order.quantity();
            *self.logic_order_counts.entry(order.logic_id().clone()).or_insert(0) += 1;
        }
        if let Some(exchange_ref) = order.exchange_ref() {
            self.exchange_refs.insert(exchange_ref.clone(), strategy_ref.clone());
        }
        debug!(
            "order registered strategy_ref={} ticker={} qty={} new={}",
            strategy_ref,
            order.ticker(),
            order.quantity(),
            newly_seen
        );
        self.active.insert(strategy_ref, order);
        newly_seen
    }

    /// Refresh the exchange ref of an active order and map it. Returns the updated order.
    pub fn assign_exchange_ref(
        &mut self,
        strategy_ref: &StrategyRef,
        exchange_ref: ExchangeRef,
    ) -> Option<&mut Order> {
        let order = self.active.get_mut(strategy_ref)?;
        self.exchange_refs.insert(exchange_ref.clone(), strategy_ref.clone());
        order.set_exchange_ref(exchange_ref);
        Some(order)
    }

    /// Remove from the active set, returning the order if it was there.
    pub fn unregister(&mut self, strategy_ref: &StrategyRef) -> Option<Order> {
        let removed = self.active.remove(strategy_ref);
        if removed.is_some() {
            info!("order unregistered strategy_ref={}", strategy_ref);
        }
        removed
    }

    /// Remove by order id. Absent ids are a no-op.
    pub fn unregister_by_id(&mut self, id: Uuid) -> Option<Order> {
        let strategy_ref = self.active.iter().find(|(_, o)| o.id() == id).map(|(r, _)| r.clone())?;
        self.unregister(&strategy_ref)
    }

    /// Record that an order reached FILLED.
    pub fn mark_filled(&mut self, strategy_ref: &StrategyRef) {
        self.filled.insert(strategy_ref.clone());
    }

    pub fn is_filled(&self, strategy_ref: &StrategyRef) -> bool {
        self.filled.contains(strategy_ref)
    }

    pub fn get(&self, strategy_ref: &StrategyRef) -> Option<&Order> {
        self.active.get(strategy_ref)
    }

    pub fn get_mut(&mut self, strategy_ref: &StrategyRef) -> Option<&mut Order> {
        self.active.get_mut(strategy_ref)
    }

    /// Strategy ref mapped to an exchange ref, whether or not the order is still active.
    pub fn strategy_ref_for(&self, exchange_ref: &ExchangeRef) -> Option<&StrategyRef> {
        self.exchange_refs.get(exchange_ref)
    }

    /// Active order by exchange ref via the reverse index.
    pub fn by_exchange_ref(&self, exchange_ref: &ExchangeRef) -> Option<&Order> {
        self.exchange_refs.get(exchange_ref).and_then(|r| self.active.get(r))
    }

    /// Active order by adapter correlation id. Linear scan.
    pub fn by_cust_id(&self, cust_id: &CustId) -> Option<&Order> {
        self.active.values().find(|o| o.cust_id() == Some(cust_id))
    }

    pub fn all_exchange_refs(&self) -> impl Iterator<Item = &ExchangeRef> {
        self.exchange_refs.keys()
    }

    pub fn knows_exchange_ref(&self, exchange_ref: &ExchangeRef) -> bool {
        self.exchange_refs.contains_key(exchange_ref)
    }

    pub fn active_orders(&self) -> impl Iterator<Item = &Order> {
        self.active.values()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Volume ever sent for `ticker` in this process. Never decremented.
    pub fn cumulative_sent_volume(&self, ticker: &str) -> Decimal {
        self.sent_volume.get(ticker).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn logic_order_counts(&self) -> &BTreeMap<LogicId, u64> {
        &self.logic_order_counts
    }

    /// Lowest limit price among active sell-side orders on `ticker`.
    pub fn min_active_sell_price(&self, ticker: &str) -> Option<Decimal> {
        self.active
            .values()
            .filter(|o| o.ticker() == ticker && o.action().is_sell())
            .map(|o| o.limit_price())
            .min()
    }

    /// Highest limit price among active buy-side orders on `ticker`.
    pub fn max_active_buy_price(&self, ticker: &str) -> Option<Decimal> {
        self.active
            .values()
            .filter(|o| o.ticker() == ticker && o.is_buy())
            .map(|o| o.limit_price())
            .max()
    }
}

/// ETF convert requests, reachable by strategy ref and by cust id.
#[derive(Debug, Default)]
pub struct EtfConvertRegistry {
    by_ref: HashMap<StrategyRef, EtfConvertRequest>,
    cust_ids: HashMap<CustId, StrategyRef>,
}

impl EtfConvertRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, request: EtfConvertRequest) {
        let Some(strategy_ref) = request.strategy_ref().cloned() else {
            return;
        };
        if let Some(cust_id) = request.submission().cust_id() {
            self.cust_ids.insert(cust_id.clone(), strategy_ref.clone());
        }
        self.by_ref.insert(strategy_ref, request);
    }

    /// Attach a cust id to a tracked request. Returns false if the request is unknown.
    pub fn assign_cust_id(&mut self, strategy_ref: &StrategyRef, cust_id: CustId) -> bool {
        match self.by_ref.get_mut(strategy_ref) {
            Some(req) => {
                req.submission_mut().set_cust_id(cust_id.clone());
                self.cust_ids.insert(cust_id, strategy_ref.clone());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, strategy_ref: &StrategyRef) -> Option<&EtfConvertRequest> {
        self.by_ref.get(strategy_ref)
    }

    pub fn by_cust_id(&self, cust_id: &CustId) -> Option<&EtfConvertRequest> {
        self.cust_ids.get(cust_id).and_then(|r| self.by_ref.get(r))
    }

    pub fn len(&self) -> usize {
        self.by_ref.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ref.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::InstrumentTraits;
    use crate::types::OrderAction;
    use chrono::Utc;

    fn submitted(r: &str, action: OrderAction, price: i64, qty: i64) -> Order {
        let traits = InstrumentTraits::stock();
        let mut o =
            Order::limit(action, "A", Decimal::from(price), Decimal::from(qty), traits, Utc::now())
                .unwrap();
        o.submit(StrategyRef::from(r), Utc::now()).unwrap();
        o
    }

    #[test]
    fn reregistering_does_not_double_count_volume() {
        let mut reg = OrderRegistry::new();
        let o = submitted("s1", OrderAction::Buy, 10, 100);
        assert!(reg.register(o.clone()));
        assert!(!reg.register(o.clone()));
        assert_eq!(reg.cumulative_sent_volume("A"), Decimal::from(100));
        reg.unregister(&StrategyRef::from("s1"));
        assert!(!reg.register(o));
        assert_eq!(reg.cumulative_sent_volume("A"), Decimal::from(100));
        assert_eq!(reg.logic_order_counts().get(&LogicId::unknown()), Some(&1));
    }

    #[test]
    fn reused_ref_for_a_new_order_counts_again() {
        let mut reg = OrderRegistry::new();
        let s1 = StrategyRef::from("s1");
        for round in 1..=3 {
            assert!(reg.register(submitted("s1", OrderAction::Buy, 10, 100)));
            reg.mark_filled(&s1);
            reg.unregister(&s1);
            assert_eq!(reg.cumulative_sent_volume("A"), Decimal::from(100 * round));
        }
        assert_eq!(reg.logic_order_counts().get(&LogicId::unknown()), Some(&3));
    }

    #[test]
    fn exchange_ref_mapping_outlives_the_order() {
        let mut reg = OrderRegistry::new();
        reg.register(submitted("s1", OrderAction::Buy, 10, 100));
        let s1 = StrategyRef::from("s1");
        reg.assign_exchange_ref(&s1, ExchangeRef::from("X1")).unwrap();
        let x1 = ExchangeRef::from("X1");
        assert_eq!(reg.by_exchange_ref(&x1).map(|o| o.quantity()), Some(Decimal::from(100)));
        reg.unregister(&s1);
        assert!(reg.by_exchange_ref(&ExchangeRef::from("X1")).is_none());
        assert_eq!(reg.strategy_ref_for(&ExchangeRef::from("X1")), Some(&s1));
        assert!(reg.knows_exchange_ref(&ExchangeRef::from("X1")));
    }

    #[test]
    fn unregister_by_missing_id_is_noop() {
        let mut reg = OrderRegistry::new();
        reg.register(submitted("s1", OrderAction::Buy, 10, 100));
        assert!(reg.unregister_by_id(Uuid::new_v4()).is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn opposing_price_extremes() {
        let mut reg = OrderRegistry::new();
        assert_eq!(reg.min_active_sell_price("A"), None);
        reg.register(submitted("s1", OrderAction::Sell, 12, 100));
        reg.register(submitted("s2", OrderAction::SellShort, 11, 100));
        reg.register(submitted("b1", OrderAction::BuyToCover, 9, 100));
        assert_eq!(reg.min_active_sell_price("A"), Some(Decimal::from(11)));
        assert_eq!(reg.max_active_buy_price("A"), Some(Decimal::from(9)));
        assert_eq!(reg.max_active_buy_price("B"), None);
    }

    #[test]
    fn cust_id_lookup() {
        let mut reg = OrderRegistry::new();
        reg.register(submitted("s1", OrderAction::Buy, 10, 100));
        reg.get_mut(&StrategyRef::from("s1")).unwrap().set_cust_id(CustId::from("c9"));
        assert!(reg.by_cust_id(&CustId::from("c9")).is_some());
        assert!(reg.by_cust_id(&CustId::from("c0")).is_none());
    }

    #[test]
    fn etf_requests_by_both_keys() {
        let mut reg = EtfConvertRegistry::new();
        let one = Decimal::ONE;
        let now = Utc::now();
        let mut req =
            EtfConvertRequest::new(OrderAction::EtfCreate, "510050.SH", one, one, now).unwrap();
        req.submission_mut().mark_submitted(StrategyRef::from("e1"), Utc::now()).unwrap();
        reg.register(req);
        assert!(reg.assign_cust_id(&StrategyRef::from("e1"), CustId::from("c1")));
        assert!(reg.by_cust_id(&CustId::from("c1")).is_some());
        assert!(!reg.assign_cust_id(&StrategyRef::from("nope"), CustId::from("c2")));
    }
}
