//! Static per-instrument rounding and fee rules, and the catalogue that resolves them by ticker.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rounding, precision and size rules for one instrument. Immutable after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentTraits {
    pub trade_unit: Decimal,
    pub price_tick: Decimal,
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
    pub quote_precision: u32,
    pub volume_precision: u32,
    pub min_order_volume: Decimal,
    pub max_order_volume: Decimal,
    pub base: String,
    pub quote: String,
    pub is_derivative: bool,
    pub exchange_name: String,
}

impl InstrumentTraits {
    /// Exchange-listed equity: lots of 1, cent tick.
    pub fn stock() -> Self {
        Self {
            trade_unit: Decimal::ONE,
            price_tick: Decimal::new(1, 2),
            maker_fee: Decimal::ZERO,
            taker_fee: Decimal::ZERO,
            quote_precision: 2,
            volume_precision: 0,
            min_order_volume: Decimal::from(100),
            max_order_volume: Decimal::from(1_000_000),
            base: "CNY".to_string(),
            quote: "STOCK".to_string(),
            is_derivative: false,
            exchange_name: "ChineseStock".to_string(),
        }
    }

    /// Exchange-traded fund: same lots as equities, tenth-of-a-cent tick.
    pub fn etf() -> Self {
        Self {
            price_tick: Decimal::new(1, 3),
            quote_precision: 3,
            quote: "ETF".to_string(),
            is_derivative: true,
            ..Self::stock()
        }
    }

    /// Nearest whole number of trade units.
    pub fn round_trade_quantity(&self, quantity: Decimal) -> Decimal {
        if self.trade_unit.is_zero() {
            return quantity;
        }
        (quantity / self.trade_unit).round() * self.trade_unit
    }

    /// Nearest whole number of minimum order lots.
    pub fn round_order_quantity(&self, quantity: Decimal) -> Decimal {
        if self.min_order_volume.is_zero() {
            return quantity;
        }
        (quantity / self.min_order_volume).round() * self.min_order_volume
    }

    /// Nearest tick, then to quote precision.
    pub fn round_price(&self, price: Decimal) -> Decimal {
        let ticked = if self.price_tick.is_zero() {
            price
        } else {
            (price / self.price_tick).round() * self.price_tick
        };
        ticked.round_dp(self.quote_precision)
    }
}

/// Resolves [`InstrumentTraits`] by ticker: exact entries first, then leading-digit rules,
/// then an optional fallback.
#[derive(Clone, Debug, Default)]
pub struct InstrumentCatalog {
    entries: BTreeMap<String, InstrumentTraits>,
    prefix_rules: Vec<(char, InstrumentTraits)>,
    fallback: Option<InstrumentTraits>,
}

impl InstrumentCatalog {
    /// Empty catalogue: every lookup misses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tickers whose code starts with one of `etf_prefixes` are ETFs, everything else an equity.
    pub fn with_etf_prefixes(etf_prefixes: &[char]) -> Self {
        let mut catalog = Self::new();
        for &c in etf_prefixes {
            catalog.prefix_rules.push((c, InstrumentTraits::etf()));
        }
        catalog.fallback = Some(InstrumentTraits::stock());
        catalog
    }

    pub fn insert(&mut self, ticker: impl Into<String>, traits: InstrumentTraits) {
        self.entries.insert(ticker.into(), traits);
    }

    pub fn set_fallback(&mut self, traits: Option<InstrumentTraits>) {
        self.fallback = traits;
    }

    /// Traits for `ticker`, or `None` when the catalogue has no rule covering it.
    pub fn lookup(&self, ticker: &str) -> Option<&InstrumentTraits> {
        if ticker.is_empty() {
            return None;
        }
        if let Some(t) = self.entries.get(ticker) {
            return Some(t);
        }
        let code = ticker.split('.').next().unwrap_or(ticker);
        let first = code.chars().next()?;
        self.prefix_rules
            .iter()
            .find(|(c, _)| *c == first)
            .map(|(_, t)| t)
            .or(self.fallback.as_ref())
    }

    /// Explicitly listed instruments, in ticker order.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &InstrumentTraits)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_digit_selects_etf() {
        let catalog = InstrumentCatalog::with_etf_prefixes(&['1', '5']);
        assert_eq!(catalog.lookup("510050.SH").map(|t| t.quote.as_str()), Some("ETF"));
        assert_eq!(catalog.lookup("159915.SZ").map(|t| t.quote.as_str()), Some("ETF"));
        assert_eq!(catalog.lookup("600000.SH").map(|t| t.quote.as_str()), Some("STOCK"));
        assert!(catalog.lookup("").is_none());
    }

    #[test]
    fn explicit_entry_wins_and_missing_fallback_misses() {
        let mut catalog = InstrumentCatalog::new();
        catalog.insert("A", InstrumentTraits::etf());
        assert!(catalog.lookup("A").is_some());
        assert!(catalog.lookup("B").is_none());
    }

    #[test]
    fn rounding_follows_tick_and_unit() {
        let stock = InstrumentTraits::stock();
        assert_eq!(stock.round_price(Decimal::new(10_004, 3)), Decimal::new(1000, 2));
        assert_eq!(stock.round_price(Decimal::new(10_006, 3)), Decimal::new(1001, 2));
        assert_eq!(stock.round_trade_quantity(Decimal::new(994, 1)), Decimal::from(99));
        assert_eq!(stock.round_order_quantity(Decimal::from(260)), Decimal::from(300));
        let etf = InstrumentTraits::etf();
        assert_eq!(etf.round_price(Decimal::new(12_3456, 4)), Decimal::new(12_346, 3));
    }
}
