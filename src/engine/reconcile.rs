//! Periodic reconciliation: broker resyncs, expiry and orphan sweeps, account publication,
//! state snapshots and the health check.

use super::Engine;
use crate::account::{AccountBalance, AccountHolding, QryOrderResult};
use crate::audit::AuditCategory;
use crate::broker::BrokerEvent;
use crate::clock::{elapsed, to_millis};
use crate::order::Order;
use crate::scheduler::Job;
use crate::types::{ExchangeRef, OrderState, StrategyRef};
use crate::wire::message::{AccountReport, PositionEntry, PositionReport, ResponseBody};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Holdings older than this are not served to position queries.
pub const QUERY_STALENESS: Duration = Duration::from_secs(60);
/// Both holdings and balances must be younger than this for the gateway to be healthy.
pub const HEALTH_STALENESS: Duration = Duration::from_secs(30);
const SNAPSHOT_ORDER_LIMIT: usize = 10;

/// Answer to a health check.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub account_name: String,
    pub holdings_lag_secs: Option<f64>,
    pub balance_lag_secs: Option<f64>,
    pub active_orders: usize,
    pub started_at_ms: i64,
}

#[derive(Serialize)]
struct OrderSummary<'a> {
    strategy_ref: &'a str,
    exchange_ref: &'a str,
    ticker: &'a str,
    action: String,
    price: String,
    quantity: String,
    filled: String,
    state: String,
}

#[derive(Serialize)]
struct StateSnapshot<'a> {
    account_name: &'a str,
    timestamp_ms: i64,
    holdings: &'a [AccountHolding],
    balances: &'a [AccountBalance],
    orders: Vec<OrderSummary<'a>>,
    external_orders: Vec<&'a QryOrderResult>,
    logic_order_counts: BTreeMap<&'a str, u64>,
}

impl Engine {
    pub fn run_job(&mut self, job: Job) {
        debug!("job started job={:?}", job);
        match job {
            Job::ResyncOrders => {
                let broker = self.broker.clone();
                self.handle.spawn_query("qry_active_orders", async move {
                    broker.qry_active_orders().await.map(BrokerEvent::ActiveOrders)
                });
            }
            Job::ResyncHoldings => {
                let broker = self.broker.clone();
                self.handle.spawn_query("qry_account_holding", async move {
                    broker.qry_account_holding().await.map(BrokerEvent::Holdings)
                });
            }
            Job::ResyncBalance => {
                let broker = self.broker.clone();
                self.handle.spawn_query("qry_account_balance", async move {
                    broker.qry_account_balance().await.map(BrokerEvent::Balances)
                });
            }
            Job::SweepExpired => {
                self.sweep_expired();
            }
            Job::Snapshot => {
                self.publish_snapshot();
            }
        }
    }

    /// Cancel ACCEPTED or PARTIALLY_FILLED orders older than `min(max_order_life, expire)`
    /// through the normal cancel path. Each order is cancelled by the sweep at most once.
    pub fn sweep_expired(&mut self) -> Vec<StrategyRef> {
        let now = self.now();
        let max_life = self.config.max_order_life;
        let due: Vec<StrategyRef> = self
            .registry
            .active_orders()
            .filter(|o| o.expire_secs() > 0)
            .filter(|o| matches!(o.state(), OrderState::Accepted | OrderState::PartiallyFilled))
            .filter_map(|o| {
                let strategy_ref = o.strategy_ref()?;
                if self.expiry_cancels.contains(strategy_ref) {
                    return None;
                }
                let life = max_life.min(Duration::from_secs(o.expire_secs()));
                let age = elapsed(now, o.submitted_at()?);
                (age > life).then(|| strategy_ref.clone())
            })
            .collect();

        let mut cancelled = Vec::with_capacity(due.len());
        for strategy_ref in due {
            match self.on_cancel_order(strategy_ref.clone(), now) {
                Ok(()) => {
                    info!("expired order cancel issued strategy_ref={}", strategy_ref);
                    self.expiry_cancels.insert(strategy_ref.clone());
                    cancelled.push(strategy_ref);
                }
                Err(e) => {
                    self.emitter.on_error(&mut self.registry, e);
                }
            }
        }
        cancelled
    }

    /// Replace the broker order list, publish it and cancel any orphans.
    pub(super) fn update_broker_orders(&mut self, orders: Vec<QryOrderResult>) {
        let now = self.now();
        debug!("broker orders updated count={}", orders.len());
        self.broker_orders.replace(orders, now);
        self.publish_pending_orders();
        self.sweep_orphans();
    }

    /// Cancel, in one batch, broker orders created before this instance started that are
    /// neither mapped locally nor already sent for cancel.
    pub fn sweep_orphans(&mut self) -> Vec<ExchangeRef> {
        let now = self.now();
        let mut shells = Vec::new();
        for q in self.broker_orders.value() {
            if q.create_time >= self.started_at
                || self.registry.knows_exchange_ref(&q.exchange_ref)
                || self.orphan_cancels.contains_key(&q.exchange_ref)
            {
                continue;
            }
            let Some(traits) = self.catalog.lookup(&q.ticker).cloned() else {
                warn!(
                    "orphan order skipped: no instrument traits exchange_ref={} ticker={}",
                    q.exchange_ref, q.ticker
                );
                continue;
            };
            shells.push(Order::external(
                q.exchange_ref.clone(),
                q.action,
                q.ticker.clone(),
                q.limit_price,
                q.quantity,
                q.filled,
                traits,
                q.create_time,
            ));
        }
        if shells.is_empty() {
            return Vec::new();
        }

        let refs: Vec<ExchangeRef> =
            shells.iter().filter_map(|o| o.exchange_ref().cloned()).collect();
        for r in &refs {
            self.orphan_cancels.insert(r.clone(), now);
        }
        info!("orphan orders cancel issued count={} refs={:?}", refs.len(), refs);
        let broker = self.broker.clone();
        self.handle
            .spawn_broker_call("cancel_orders_in_batch", Vec::new(), async move {
                broker.cancel_orders_in_batch(shells).await
            });
        refs
    }

    pub(super) fn update_holdings(&mut self, holdings: Vec<AccountHolding>) {
        let now = self.now();
        debug!("holdings updated count={}", holdings.len());
        self.holdings.replace(holdings, now);
        self.publish_positions(None);
    }

    pub(super) fn update_balances(&mut self, balances: Vec<AccountBalance>) {
        let now = self.now();
        debug!("balances updated count={}", balances.len());
        self.balances.replace(balances, now);
    }

    /// One `ON_QUERY_POSITION` with every non-flat holding, or `ON_ERROR` when stale.
    pub(super) fn publish_positions(&mut self, requester: Option<&StrategyRef>) {
        let now = self.now();
        if !self.holdings.is_fresh(now, QUERY_STALENESS) {
            self.emitter.exchange_error(&mut self.registry, "account holding lag", requester);
            return;
        }
        let positions = self
            .holdings
            .value()
            .iter()
            .filter(|h| !h.is_flat())
            .map(|h| PositionEntry {
                ticker: h.ticker.clone(),
                long_holding: h.long_holding,
                long_available: h.long_available,
                long_avg_cost: h.long_avg_cost,
                short_holding: h.short_holding,
                short_available: h.short_available,
                short_avg_cost: h.short_avg_cost,
            })
            .collect();
        let update_time_ms = self.holdings.updated_at().map(to_millis).unwrap_or_default();
        self.emitter.emit(ResponseBody::OnQueryPosition(PositionReport {
            account_name: self.emitter.account_name().to_string(),
            update_time_ms,
            positions,
        }));
    }

    /// One `ON_QUERY_ACCOUNT` per currency, or `ON_ERROR` when stale.
    pub(super) fn publish_balances(&mut self, requester: Option<&StrategyRef>) {
        let now = self.now();
        if !self.balances.is_fresh(now, QUERY_STALENESS) {
            self.emitter.exchange_error(&mut self.registry, "account balance lag", requester);
            return;
        }
        let update_time_ms = self.balances.updated_at().map(to_millis).unwrap_or_default();
        for b in self.balances.value() {
            self.emitter.emit(ResponseBody::OnQueryAccount(AccountReport {
                account_name: self.emitter.account_name().to_string(),
                currency: b.currency.clone(),
                update_time_ms,
                balance: b.balance,
                cash: b.cash,
                cash_available: b.cash_available,
                margin: b.margin,
                unrealized_pnl: b.unrealized_pnl,
                realized_pnl: b.realized_pnl,
                total_asset: b.total_asset,
                withdrawable: b.withdrawable,
            }));
        }
    }

    /// Holdings and balances both younger than [`HEALTH_STALENESS`].
    pub fn check_update(&self) -> bool {
        let now = self.now();
        self.holdings.is_fresh(now, HEALTH_STALENESS)
            && self.balances.is_fresh(now, HEALTH_STALENESS)
    }

    pub fn health_report(&self) -> HealthReport {
        let now = self.now();
        HealthReport {
            healthy: self.check_update(),
            account_name: self.emitter.account_name().to_string(),
            holdings_lag_secs: self.holdings.age(now).map(|d| d.as_secs_f64()),
            balance_lag_secs: self.balances.age(now).map(|d| d.as_secs_f64()),
            active_orders: self.registry.len(),
            started_at_ms: to_millis(self.started_at),
        }
    }

    /// Push a JSON state snapshot to the audit channel. Skipped while account data is stale.
    pub fn publish_snapshot(&self) -> bool {
        if !self.check_update() {
            debug!("snapshot skipped: account data stale");
            return false;
        }
        let orders = self
            .registry
            .active_orders()
            .take(SNAPSHOT_ORDER_LIMIT)
            .map(|o| OrderSummary {
                strategy_ref: o.strategy_ref().map(|r| r.as_str()).unwrap_or(""),
                exchange_ref: o.exchange_ref().map(|r| r.as_str()).unwrap_or(""),
                ticker: o.ticker(),
                action: format!("{:?}", o.action()),
                price: o.limit_price().to_string(),
                quantity: o.quantity().to_string(),
                filled: o.filled().to_string(),
                state: o.state().to_string(),
            })
            .collect();
        let external_orders = self
            .broker_orders
            .value()
            .iter()
            .filter(|q| !self.registry.knows_exchange_ref(&q.exchange_ref))
            .take(SNAPSHOT_ORDER_LIMIT)
            .collect();
        let snapshot = StateSnapshot {
            account_name: self.emitter.account_name(),
            timestamp_ms: to_millis(self.now()),
            holdings: self.holdings.value(),
            balances: self.balances.value(),
            orders,
            external_orders,
            logic_order_counts: self
                .registry
                .logic_order_counts()
                .iter()
                .map(|(k, v)| (k.as_str(), *v))
                .collect(),
        };
        match serde_json::to_vec(&snapshot) {
            Ok(bytes) => {
                self.emitter.audit(AuditCategory::Snapshot, bytes);
                true
            }
            Err(e) => {
                error!("snapshot encode failed err={}", e);
                false
            }
        }
    }
}
