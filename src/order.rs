//! Order and request value types.
//!
//! An [`Order`] owns its state machine and fill accounting. Submission bookkeeping shared by
//! every request kind lives in [`Submission`], which orders and ETF convert requests hold.

use crate::error::OrderError;
use crate::instrument::InstrumentTraits;
use crate::types::{CustId, ExchangeRef, LogicId, OrderAction, OrderState, StrategyRef};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Submission tracking: strategy ref, submit/accept times, broker-side ids and owning logic.
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    created_at: DateTime<Utc>,
    strategy_ref: Option<StrategyRef>,
    submitted_at: Option<DateTime<Utc>>,
    accepted_at: Option<DateTime<Utc>>,
    cust_id: Option<CustId>,
    exchange_ref: Option<ExchangeRef>,
    logic_id: LogicId,
}

impl Submission {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            strategy_ref: None,
            submitted_at: None,
            accepted_at: None,
            cust_id: None,
            exchange_ref: None,
            logic_id: LogicId::unknown(),
        }
    }

    /// Stamp the strategy ref and submit time. The ref may be stamped again only with the
    /// same value.
    pub fn mark_submitted(
        &mut self,
        strategy_ref: StrategyRef,
        at: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if let Some(existing) = &self.strategy_ref {
            if *existing != strategy_ref {
                return Err(OrderError::RefAlreadySet(existing.to_string()));
            }
        }
        self.strategy_ref = Some(strategy_ref);
        self.submitted_at = Some(at);
        Ok(())
    }

    pub fn mark_accepted(&mut self, at: DateTime<Utc>) {
        self.accepted_at = Some(at);
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn strategy_ref(&self) -> Option<&StrategyRef> {
        self.strategy_ref.as_ref()
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn accepted_at(&self) -> Option<DateTime<Utc>> {
        self.accepted_at
    }

    pub fn cust_id(&self) -> Option<&CustId> {
        self.cust_id.as_ref()
    }

    pub fn set_cust_id(&mut self, cust_id: CustId) {
        self.cust_id = Some(cust_id);
    }

    pub fn exchange_ref(&self) -> Option<&ExchangeRef> {
        self.exchange_ref.as_ref()
    }

    pub fn set_exchange_ref(&mut self, exchange_ref: ExchangeRef) {
        self.exchange_ref = Some(exchange_ref);
    }

    pub fn logic_id(&self) -> &LogicId {
        &self.logic_id
    }

    pub fn set_logic_id(&mut self, logic_id: LogicId) {
        self.logic_id = logic_id;
    }
}

/// One applied execution. Never mutated after it is appended to an order.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderExecutionInfo {
    pub price: Decimal,
    pub quantity: Decimal,
    pub commission: Decimal,
    pub timestamp: DateTime<Utc>,
    pub exchange_trade_ref: String,
}

/// A limit order and its lifecycle.
#[derive(Clone, Debug)]
pub struct Order {
    id: Uuid,
    ticker: String,
    action: OrderAction,
    limit_price: Decimal,
    quantity: Decimal,
    filled: Decimal,
    avg_fill_price: Option<Decimal>,
    commissions: Decimal,
    state: OrderState,
    expire_secs: u64,
    traits: InstrumentTraits,
    executions: Vec<OrderExecutionInfo>,
    submission: Submission,
}

impl Order {
    /// New limit order in [`OrderState::Initial`].
    pub fn limit(
        action: OrderAction,
        ticker: impl Into<String>,
        limit_price: Decimal,
        quantity: Decimal,
        traits: InstrumentTraits,
        created_at: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if action.is_etf_convert() {
            return Err(OrderError::UnsupportedAction(format!("{:?}", action)));
        }
        // a quantity off the trade-unit grid could never reach zero remaining
        if quantity <= Decimal::ZERO || traits.round_trade_quantity(quantity) != quantity {
            return Err(OrderError::InvalidQuantity(quantity));
        }
        if limit_price <= Decimal::ZERO {
            return Err(OrderError::InvalidPrice(limit_price));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            ticker: ticker.into(),
            action,
            limit_price,
            quantity,
            filled: Decimal::ZERO,
            avg_fill_price: None,
            commissions: Decimal::ZERO,
            state: OrderState::Initial,
            expire_secs: 0,
            traits,
            executions: Vec::new(),
            submission: Submission::new(created_at),
        })
    }

    /// Placeholder for an order found at the broker with no local record. Starts ACCEPTED
    /// with the reported fill already counted.
    #[allow(clippy::too_many_arguments)]
    pub fn external(
        exchange_ref: ExchangeRef,
        action: OrderAction,
        ticker: impl Into<String>,
        limit_price: Decimal,
        quantity: Decimal,
        filled: Decimal,
        traits: InstrumentTraits,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut submission = Submission::new(created_at);
        submission.strategy_ref = Some(StrategyRef::from("unknown"));
        submission.submitted_at = Some(created_at);
        submission.exchange_ref = Some(exchange_ref);
        Self {
            id: Uuid::new_v4(),
            ticker: ticker.into(),
            action,
            limit_price,
            quantity,
            filled: filled.min(quantity),
            avg_fill_price: None,
            commissions: Decimal::ZERO,
            state: OrderState::Accepted,
            expire_secs: 0,
            traits,
            executions: Vec::new(),
            submission,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn action(&self) -> OrderAction {
        self.action
    }

    pub fn is_buy(&self) -> bool {
        self.action.is_buy()
    }

    pub fn limit_price(&self) -> Decimal {
        self.limit_price
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn filled(&self) -> Decimal {
        self.filled
    }

    pub fn remaining(&self) -> Decimal {
        self.traits.round_trade_quantity(self.quantity - self.filled)
    }

    pub fn avg_fill_price(&self) -> Option<Decimal> {
        self.avg_fill_price
    }

    pub fn commissions(&self) -> Decimal {
        self.commissions
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Lifetime in seconds; 0 means no per-order expiry.
    pub fn expire_secs(&self) -> u64 {
        self.expire_secs
    }

    pub fn set_expire_secs(&mut self, secs: u64) {
        self.expire_secs = secs;
    }

    pub fn traits(&self) -> &InstrumentTraits {
        &self.traits
    }

    pub fn executions(&self) -> &[OrderExecutionInfo] {
        &self.executions
    }

    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    pub fn strategy_ref(&self) -> Option<&StrategyRef> {
        self.submission.strategy_ref()
    }

    pub fn exchange_ref(&self) -> Option<&ExchangeRef> {
        self.submission.exchange_ref()
    }

    pub fn set_exchange_ref(&mut self, exchange_ref: ExchangeRef) {
        self.submission.set_exchange_ref(exchange_ref);
    }

    pub fn cust_id(&self) -> Option<&CustId> {
        self.submission.cust_id()
    }

    pub fn set_cust_id(&mut self, cust_id: CustId) {
        self.submission.set_cust_id(cust_id);
    }

    pub fn logic_id(&self) -> &LogicId {
        self.submission.logic_id()
    }

    pub fn set_logic_id(&mut self, logic_id: LogicId) {
        self.submission.set_logic_id(logic_id);
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submission.submitted_at()
    }

    /// Stamp submission and move to SUBMITTED.
    pub fn submit(
        &mut self,
        strategy_ref: StrategyRef,
        at: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.state.can_transition_to(OrderState::Submitted) {
            return Err(OrderError::InvalidStateTransition {
                from: self.state,
                to: OrderState::Submitted,
            });
        }
        self.submission.mark_submitted(strategy_ref, at)?;
        self.state = OrderState::Submitted;
        Ok(())
    }

    /// Move to ACCEPTED and stamp the acceptance time.
    pub fn accept(&mut self, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.switch_state(OrderState::Accepted)?;
        self.submission.mark_accepted(at);
        Ok(())
    }

    /// Transition per [`OrderState::allowed_targets`]; state is unchanged on error.
    pub fn switch_state(&mut self, to: OrderState) -> Result<(), OrderError> {
        if !self.state.can_transition_to(to) {
            return Err(OrderError::InvalidStateTransition { from: self.state, to });
        }
        self.state = to;
        Ok(())
    }

    /// Apply one execution: updates filled, average price, commissions and state.
    /// Nothing changes when the fill is oversized or the resulting transition is invalid.
    pub fn add_execution_info(&mut self, info: OrderExecutionInfo) -> Result<(), OrderError> {
        if info.quantity <= Decimal::ZERO {
            return Err(OrderError::InvalidQuantity(info.quantity));
        }
        let remaining = self.remaining();
        if info.quantity > remaining {
            return Err(OrderError::OverFill {
                requested: info.quantity,
                remaining,
            });
        }
        let new_filled = self.traits.round_trade_quantity(self.filled + info.quantity);
        let new_remaining = self.traits.round_trade_quantity(self.quantity - new_filled);
        let target = if new_remaining.is_zero() {
            OrderState::Filled
        } else {
            OrderState::PartiallyFilled
        };
        if !self.state.can_transition_to(target) {
            return Err(OrderError::InvalidStateTransition { from: self.state, to: target });
        }

        let prior_value = self.avg_fill_price.unwrap_or(Decimal::ZERO) * self.filled;
        let total = self.filled + info.quantity;
        self.avg_fill_price = Some((prior_value + info.price * info.quantity) / total);
        self.filled = new_filled;
        self.commissions += info.commission;
        self.state = target;
        self.executions.push(info);
        Ok(())
    }

    /// Derive the incremental execution from a cumulative report (total filled, average
    /// price, total commission). `None` when the report carries no new quantity.
    pub fn incremental_from_cumulative(
        &self,
        cumulative_filled: Decimal,
        avg_price: Decimal,
        cumulative_commission: Decimal,
        timestamp: DateTime<Utc>,
        exchange_trade_ref: String,
    ) -> Option<OrderExecutionInfo> {
        let quantity = cumulative_filled - self.filled;
        if quantity <= Decimal::ZERO {
            return None;
        }
        let price = match self.avg_fill_price {
            Some(prev) if !self.filled.is_zero() => {
                (avg_price * cumulative_filled - prev * self.filled) / quantity
            }
            _ => avg_price,
        };
        let commission = (cumulative_commission - self.commissions).max(Decimal::ZERO);
        Some(OrderExecutionInfo {
            price,
            quantity,
            commission,
            timestamp,
            exchange_trade_ref,
        })
    }
}

/// Child orders submitted together under one batch id.
#[derive(Clone, Debug)]
pub struct BatchOrder {
    batch_id: String,
    logic_id: LogicId,
    orders: Vec<Order>,
    turnover: Decimal,
}

impl BatchOrder {
    pub fn new(logic_id: LogicId, orders: Vec<Order>) -> Self {
        let turnover = orders.iter().map(|o| o.quantity() * o.limit_price()).sum();
        Self {
            batch_id: Uuid::new_v4().to_string(),
            logic_id,
            orders,
            turnover,
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn logic_id(&self) -> &LogicId {
        &self.logic_id
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Σ quantity × limit price, fixed at construction.
    pub fn turnover(&self) -> Decimal {
        self.turnover
    }
}

/// ETF creation or redemption instruction.
#[derive(Clone, Debug)]
pub struct EtfConvertRequest {
    id: Uuid,
    action: OrderAction,
    ticker: String,
    quantity: Decimal,
    min_exchange_unit: Decimal,
    submission: Submission,
}

impl EtfConvertRequest {
    pub fn new(
        action: OrderAction,
        ticker: impl Into<String>,
        quantity: Decimal,
        min_exchange_unit: Decimal,
        created_at: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if !action.is_etf_convert() {
            return Err(OrderError::UnsupportedAction(format!("{:?}", action)));
        }
        if quantity <= Decimal::ZERO {
            return Err(OrderError::InvalidQuantity(quantity));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            action,
            ticker: ticker.into(),
            quantity,
            min_exchange_unit,
            submission: Submission::new(created_at),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn action(&self) -> OrderAction {
        self.action
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn min_exchange_unit(&self) -> Decimal {
        self.min_exchange_unit
    }

    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    pub fn submission_mut(&mut self) -> &mut Submission {
        &mut self.submission
    }

    pub fn strategy_ref(&self) -> Option<&StrategyRef> {
        self.submission.strategy_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(action: OrderAction, qty: i64, price: Decimal) -> Order {
        let traits = InstrumentTraits::stock();
        Order::limit(action, "600000.SH", price, Decimal::from(qty), traits, Utc::now()).unwrap()
    }

    fn fill(qty: i64, price: Decimal) -> OrderExecutionInfo {
        OrderExecutionInfo {
            price,
            quantity: Decimal::from(qty),
            commission: Decimal::new(5, 1),
            timestamp: Utc::now(),
            exchange_trade_ref: "t".into(),
        }
    }

    fn accepted(qty: i64) -> Order {
        let mut o = order(OrderAction::Buy, qty, Decimal::from(10));
        o.submit(StrategyRef::from("s1"), Utc::now()).unwrap();
        o.accept(Utc::now()).unwrap();
        o
    }

    #[test]
    fn rejects_non_positive_quantity_and_etf_action() {
        let traits = InstrumentTraits::stock();
        let now = Utc::now();
        assert!(matches!(
            Order::limit(OrderAction::Buy, "A", Decimal::ONE, Decimal::ZERO, traits.clone(), now),
            Err(OrderError::InvalidQuantity(_))
        ));
        assert!(matches!(
            Order::limit(OrderAction::EtfCreate, "A", Decimal::ONE, Decimal::ONE, traits, now),
            Err(OrderError::UnsupportedAction(_))
        ));
    }

    #[test]
    fn rejects_quantity_off_the_trade_unit() {
        let traits = InstrumentTraits::stock();
        for qty in [Decimal::new(4, 1), Decimal::new(1005, 1)] {
            assert_eq!(
                Order::limit(OrderAction::Buy, "A", Decimal::ONE, qty, traits.clone(), Utc::now())
                    .unwrap_err(),
                OrderError::InvalidQuantity(qty)
            );
        }
        let whole = Decimal::new(1000, 1);
        let built = Order::limit(OrderAction::Buy, "A", Decimal::ONE, whole, traits, Utc::now());
        assert!(built.is_ok());
    }

    #[test]
    fn partial_then_full_fill_tracks_average() {
        let mut o = accepted(100);
        o.add_execution_info(fill(40, Decimal::from(10))).unwrap();
        assert_eq!(o.state(), OrderState::PartiallyFilled);
        assert_eq!(o.remaining(), Decimal::from(60));
        o.add_execution_info(fill(60, Decimal::from(11))).unwrap();
        assert_eq!(o.state(), OrderState::Filled);
        assert!(o.remaining().is_zero());
        assert_eq!(o.avg_fill_price(), Some(Decimal::new(106, 1)));
        assert_eq!(o.commissions(), Decimal::ONE);
        assert_eq!(o.executions().len(), 2);
    }

    #[test]
    fn overfill_leaves_order_untouched() {
        let mut o = accepted(100);
        let err = o.add_execution_info(fill(101, Decimal::from(10))).unwrap_err();
        assert!(matches!(err, OrderError::OverFill { .. }));
        assert!(o.filled().is_zero());
        assert_eq!(o.state(), OrderState::Accepted);
    }

    #[test]
    fn fill_on_submitted_order_is_an_invalid_transition() {
        let mut o = order(OrderAction::Sell, 100, Decimal::from(10));
        o.submit(StrategyRef::from("s1"), Utc::now()).unwrap();
        let err = o.add_execution_info(fill(10, Decimal::from(10))).unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidStateTransition {
                from: OrderState::Submitted,
                to: OrderState::PartiallyFilled
            }
        );
        assert!(o.executions().is_empty());
    }

    #[test]
    fn strategy_ref_cannot_change() {
        let mut o = order(OrderAction::Buy, 100, Decimal::from(10));
        o.submit(StrategyRef::from("s1"), Utc::now()).unwrap();
        let mut s = o.submission().clone();
        assert!(s.mark_submitted(StrategyRef::from("s2"), Utc::now()).is_err());
        assert!(s.mark_submitted(StrategyRef::from("s1"), Utc::now()).is_ok());
    }

    #[test]
    fn cumulative_report_yields_incremental_fill() {
        let mut o = accepted(100);
        let now = Utc::now();
        let forty = Decimal::from(40);
        let first = o
            .incremental_from_cumulative(forty, Decimal::from(10), Decimal::ONE, now, "r-1".into())
            .unwrap();
        assert_eq!(first.quantity, Decimal::from(40));
        assert_eq!(first.price, Decimal::from(10));
        o.add_execution_info(first).unwrap();

        // 100 @ 10.6 cumulative means the last 60 traded at 11
        let second = o
            .incremental_from_cumulative(
                Decimal::from(100),
                Decimal::new(106, 1),
                Decimal::from(3),
                now,
                "r-2".into(),
            )
            .unwrap();
        assert_eq!(second.quantity, Decimal::from(60));
        assert_eq!(second.price, Decimal::from(11));
        assert_eq!(second.commission, Decimal::from(2));

        assert!(o
            .incremental_from_cumulative(forty, Decimal::from(10), Decimal::ONE, now, "dup".into())
            .is_none());
    }

    #[test]
    fn batch_turnover_is_fixed_at_construction() {
        let batch = BatchOrder::new(
            LogicId::from("l1"),
            vec![
                order(OrderAction::Buy, 100, Decimal::from(10)),
                order(OrderAction::Sell, 200, Decimal::new(55, 1)),
            ],
        );
        assert_eq!(batch.turnover(), Decimal::from(2100));
        assert_eq!(batch.orders().len(), 2);
    }

    #[test]
    fn etf_convert_requires_convert_action() {
        let now = Utc::now();
        let unit = Decimal::from(900_000);
        assert!(EtfConvertRequest::new(OrderAction::Buy, "510050.SH", unit, unit, now).is_err());
        let req =
            EtfConvertRequest::new(OrderAction::EtfCreate, "510050.SH", unit, unit, now).unwrap();
        assert_eq!(req.submission().logic_id(), &LogicId::unknown());
    }
}
