//! Broker-reported snapshots: open orders, holdings and balances. Replaced wholesale on
//! every resync and stamped with the time they arrived.

use crate::clock::elapsed;
use crate::types::{ExchangeRef, OrderAction};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One open order as the broker reports it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QryOrderResult {
    pub exchange_ref: ExchangeRef,
    pub ticker: String,
    pub action: OrderAction,
    pub limit_price: Decimal,
    pub quantity: Decimal,
    pub filled: Decimal,
    pub create_time: DateTime<Utc>,
}

/// Long and short position for one ticker.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountHolding {
    pub ticker: String,
    pub long_avg_cost: Decimal,
    pub long_holding: Decimal,
    pub long_available: Decimal,
    pub long_profit: Decimal,
    pub long_margin: Decimal,
    pub long_market_value: Decimal,
    pub long_opened_today: Decimal,
    pub long_td_holding: Decimal,
    pub long_yd_holding: Decimal,
    pub short_avg_cost: Decimal,
    pub short_holding: Decimal,
    pub short_available: Decimal,
    pub short_profit: Decimal,
    pub short_margin: Decimal,
    pub short_market_value: Decimal,
    pub short_opened_today: Decimal,
    pub short_td_holding: Decimal,
    pub short_yd_holding: Decimal,
    pub margin_sell_available: Decimal,
}

impl AccountHolding {
    pub fn is_flat(&self) -> bool {
        self.long_holding.is_zero() && self.short_holding.is_zero()
    }
}

/// Cash and margin figures for one currency.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub currency: String,
    pub balance: Decimal,
    pub cash: Decimal,
    pub cash_available: Decimal,
    pub margin: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub total_debit: Decimal,
    pub total_asset: Decimal,
    pub cash_for_risk_asset: Decimal,
    pub withdrawable: Decimal,
    pub borrowable: Decimal,
    pub cash_for_cover_short: Decimal,
}

/// A value plus the time it was last replaced. Never-updated snapshots are always stale.
#[derive(Clone, Debug, Default)]
pub struct Snapshot<T> {
    value: T,
    updated_at: Option<DateTime<Utc>>,
}

impl<T> Snapshot<T> {
    pub fn replace(&mut self, value: T, at: DateTime<Utc>) {
        self.value = value;
        self.updated_at = Some(at);
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.updated_at.map(|t| elapsed(now, t))
    }

    /// True when updated less than `max_age` ago.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now).map(|a| a < max_age).unwrap_or(false)
    }
}
