//! Pre-trade checks: insertion and cancel throttles, per-ticker volume ceilings and the
//! self-trade guard. Checks only read state; [`RiskGate::record_insert`] is called after a
//! successful submission.

use crate::clock::elapsed;
use crate::error::ErrorKind;
use crate::order::Order;
use crate::registry::OrderRegistry;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;

/// Volume ceiling applied to tickers with no configured limit.
pub fn default_volume_limit() -> Decimal {
    Decimal::from(100_000_000_000u64)
}

#[derive(Clone, Debug, PartialEq)]
pub struct RiskLimits {
    pub order_interval: Duration,
    pub cancel_interval: Duration,
    pub volume_limits: HashMap<String, Decimal>,
    pub default_volume_limit: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            order_interval: Duration::ZERO,
            cancel_interval: Duration::ZERO,
            volume_limits: HashMap::new(),
            default_volume_limit: default_volume_limit(),
        }
    }
}

impl RiskLimits {
    pub fn volume_limit(&self, ticker: &str) -> Decimal {
        self.volume_limits.get(ticker).copied().unwrap_or(self.default_volume_limit)
    }
}

/// Why the gate refused a request.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RiskViolation {
    #[error("insert order too fast: {elapsed:?} since last order, minimum {interval:?}")]
    InsertTooFast { elapsed: Duration, interval: Duration },
    #[error("cancel order too fast: {elapsed:?} since submit, minimum {interval:?}")]
    CancelTooFast { elapsed: Duration, interval: Duration },
    #[error("quantity excess limit: {ticker} sent {sent}, limit {limit}")]
    QuantityExcessLimit { ticker: String, sent: Decimal, limit: Decimal },
    #[error("self-trading risk")]
    SelfTradeRisk { ticker: String, price: Decimal, opposing: Decimal },
}

impl RiskViolation {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RiskViolation::InsertTooFast { .. } => ErrorKind::InsertTooFast,
            RiskViolation::CancelTooFast { .. } => ErrorKind::CancelTooFast,
            RiskViolation::QuantityExcessLimit { .. } => ErrorKind::QuantityExcessLimit,
            RiskViolation::SelfTradeRisk { .. } => ErrorKind::PriceExcessLimit,
        }
    }
}

#[derive(Debug, Default)]
pub struct RiskGate {
    limits: RiskLimits,
    last_order_time: Option<DateTime<Utc>>,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            last_order_time: None,
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn last_order_time(&self) -> Option<DateTime<Utc>> {
        self.last_order_time
    }

    pub fn check_insert_rate(&self, now: DateTime<Utc>) -> Result<(), RiskViolation> {
        let Some(last) = self.last_order_time else {
            return Ok(());
        };
        let since = elapsed(now, last);
        if since < self.limits.order_interval {
            return Err(RiskViolation::InsertTooFast {
                elapsed: since,
                interval: self.limits.order_interval,
            });
        }
        Ok(())
    }

    pub fn check_volume(
        &self,
        registry: &OrderRegistry,
        ticker: &str,
    ) -> Result<(), RiskViolation> {
        let sent = registry.cumulative_sent_volume(ticker);
        let limit = self.limits.volume_limit(ticker);
        if sent >= limit {
            return Err(RiskViolation::QuantityExcessLimit {
                ticker: ticker.to_string(),
                sent,
                limit,
            });
        }
        Ok(())
    }

    /// A buy may not reach the lowest active sell on the same ticker, and vice versa.
    pub fn check_self_trade(
        &self,
        registry: &OrderRegistry,
        order: &Order,
    ) -> Result<(), RiskViolation> {
        let price = order.limit_price();
        let ticker = order.ticker();
        let crossing = if order.is_buy() {
            registry.min_active_sell_price(ticker).filter(|&min_sell| price >= min_sell)
        } else if order.action().is_sell() {
            registry.max_active_buy_price(ticker).filter(|&max_buy| price <= max_buy)
        } else {
            None
        };
        match crossing {
            Some(opposing) => Err(RiskViolation::SelfTradeRisk {
                ticker: ticker.to_string(),
                price,
                opposing,
            }),
            None => Ok(()),
        }
    }

    pub fn check_cancel(&self, now: DateTime<Utc>, order: &Order) -> Result<(), RiskViolation> {
        let Some(submitted) = order.submitted_at() else {
            return Ok(());
        };
        let since = elapsed(now, submitted);
        if since < self.limits.cancel_interval {
            return Err(RiskViolation::CancelTooFast {
                elapsed: since,
                interval: self.limits.cancel_interval,
            });
        }
        Ok(())
    }

    pub fn record_insert(&mut self, now: DateTime<Utc>) {
        self.last_order_time = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::InstrumentTraits;
    use crate::types::{OrderAction, StrategyRef};

    fn order(r: &str, action: OrderAction, price: Decimal, at: DateTime<Utc>) -> Order {
        let traits = InstrumentTraits::stock();
        let mut o = Order::limit(action, "X", price, Decimal::from(100), traits, at).unwrap();
        o.submit(StrategyRef::from(r), at).unwrap();
        o
    }

    #[test]
    fn self_trade_guard_blocks_crossing_buy() {
        let now = Utc::now();
        let gate = RiskGate::default();
        let mut reg = OrderRegistry::new();
        reg.register(order("s1", OrderAction::Sell, Decimal::from(10), now));

        let at = order("b1", OrderAction::Buy, Decimal::from(10), now);
        let err = gate.check_self_trade(&reg, &at).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PriceExcessLimit);
        assert_eq!(err.to_string(), "self-trading risk");
        let above = order("b2", OrderAction::Buy, Decimal::new(101, 1), now);
        assert!(gate.check_self_trade(&reg, &above).is_err());
        let below = order("b3", OrderAction::Buy, Decimal::new(999, 2), now);
        assert!(gate.check_self_trade(&reg, &below).is_ok());
    }

    #[test]
    fn self_trade_guard_blocks_crossing_sell() {
        let now = Utc::now();
        let gate = RiskGate::default();
        let mut reg = OrderRegistry::new();
        let s0 = order("s0", OrderAction::Sell, Decimal::ONE, now);
        assert!(gate.check_self_trade(&reg, &s0).is_ok());
        reg.register(order("b1", OrderAction::Buy, Decimal::from(10), now));
        let s1 = order("s1", OrderAction::SellShort, Decimal::from(10), now);
        assert!(gate.check_self_trade(&reg, &s1).is_err());
        let s2 = order("s2", OrderAction::Sell, Decimal::new(1001, 2), now);
        assert!(gate.check_self_trade(&reg, &s2).is_ok());
    }

    #[test]
    fn insertion_throttle() {
        let now = Utc::now();
        let mut gate = RiskGate::new(RiskLimits {
            order_interval: Duration::from_millis(500),
            ..Default::default()
        });
        assert!(gate.check_insert_rate(now).is_ok());
        gate.record_insert(now);
        let err = gate.check_insert_rate(now + chrono::Duration::milliseconds(200)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsertTooFast);
        assert!(gate.check_insert_rate(now + chrono::Duration::milliseconds(600)).is_ok());
    }

    #[test]
    fn cancel_throttle_uses_submit_time() {
        let now = Utc::now();
        let gate = RiskGate::new(RiskLimits {
            cancel_interval: Duration::from_secs(1),
            ..Default::default()
        });
        let o = order("s1", OrderAction::Buy, Decimal::ONE, now);
        assert_eq!(gate.check_cancel(now, &o).unwrap_err().kind(), ErrorKind::CancelTooFast);
        assert!(gate.check_cancel(now + chrono::Duration::seconds(2), &o).is_ok());
    }

    #[test]
    fn volume_ceiling_counts_sent_volume() {
        let now = Utc::now();
        let mut limits = RiskLimits::default();
        limits.volume_limits.insert("X".into(), Decimal::from(150));
        let gate = RiskGate::new(limits);
        let mut reg = OrderRegistry::new();
        assert!(gate.check_volume(&reg, "X").is_ok());
        reg.register(order("s1", OrderAction::Buy, Decimal::ONE, now));
        assert!(gate.check_volume(&reg, "X").is_ok());
        reg.register(order("s2", OrderAction::Buy, Decimal::ONE, now));
        let err = gate.check_volume(&reg, "X").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuantityExcessLimit);
        assert!(gate.check_volume(&reg, "Y").is_ok());
    }
}
