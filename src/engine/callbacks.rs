//! Adapter callbacks. Each one resolves the order it names, applies the state change and
//! publishes the matching response. Unknown orders are logged and ignored.

use super::Engine;
use crate::broker::{BrokerEvent, OrderLocator};
use crate::clock::to_millis;
use crate::error::{ErrorKind, GatewayError, OrderError};
use crate::order::OrderExecutionInfo;
use crate::types::{ExchangeRef, OrderState, StrategyRef};
use crate::wire::message::{EtfComponentReport, OrderActionReport, ResponseBody, TradeReport};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rust_decimal::Decimal;

impl Engine {
    pub fn handle_broker_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::CustIdAssigned { strategy_ref, cust_id } => {
                if let Some(order) = self.registry.get_mut(&strategy_ref) {
                    order.set_cust_id(cust_id);
                } else if !self.etf_converts.assign_cust_id(&strategy_ref, cust_id) {
                    warn!("cust id for unknown order strategy_ref={}", strategy_ref);
                }
            }
            BrokerEvent::OrderAccepted { locator, exchange_ref, at } => {
                self.on_order_accepted(&locator, exchange_ref, at)
            }
            BrokerEvent::OrderCanceled { locator, at } => self.on_order_canceled(&locator, at),
            BrokerEvent::Execution {
                locator,
                cumulative_filled,
                avg_price,
                cumulative_commission,
                at,
            } => {
                self.on_execution(&locator, cumulative_filled, avg_price, cumulative_commission, at)
            }
            BrokerEvent::Trade {
                locator,
                price,
                quantity,
                commission,
                exchange_trade_ref,
                at,
            } => self.on_trade(&locator, price, quantity, commission, exchange_trade_ref, at),
            BrokerEvent::Error { kind, message, locator } => {
                self.on_broker_error(kind, message, locator)
            }
            BrokerEvent::EtfConvertAccepted { locator, exchange_ref } => {
                self.on_etf_accepted(&locator, exchange_ref)
            }
            BrokerEvent::EtfComponent {
                locator,
                component_ticker,
                quantity,
                exchange_ref,
            } => self.on_etf_component(&locator, component_ticker, quantity, exchange_ref),
            BrokerEvent::ActiveOrders(orders) => self.update_broker_orders(orders),
            BrokerEvent::Holdings(holdings) => self.update_holdings(holdings),
            BrokerEvent::Balances(balances) => self.update_balances(balances),
        }
    }

    /// Strategy ref of the active order `locator` names.
    fn resolve(&self, locator: &OrderLocator) -> Option<StrategyRef> {
        let order = match locator {
            OrderLocator::Strategy(r) => self.registry.get(r),
            OrderLocator::Exchange(x) => self.registry.by_exchange_ref(x),
            OrderLocator::Cust(c) => self.registry.by_cust_id(c),
        }?;
        order.strategy_ref().cloned()
    }

    fn order_action(&self, strategy_ref: &StrategyRef, state: OrderState) -> ResponseBody {
        let exchange_ref = self
            .registry
            .get(strategy_ref)
            .and_then(|o| o.exchange_ref())
            .map(|r| r.0.clone())
            .unwrap_or_default();
        ResponseBody::OnOrderAction(OrderActionReport {
            account_name: self.emitter.account_name().to_string(),
            strategy_order_ref: strategy_ref.0.clone(),
            exchange_order_ref: exchange_ref,
            state,
            action: None,
        })
    }

    /// Report an order-model failure without touching the registry.
    fn report_order_error(&mut self, strategy_ref: &StrategyRef, e: OrderError) {
        error!("order update rejected strategy_ref={} err={}", strategy_ref, e);
        let kind = match e {
            OrderError::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            _ => ErrorKind::ExchangeError,
        };
        let err = GatewayError::new(kind, e.to_string()).for_order(strategy_ref);
        self.emitter.on_error(&mut self.registry, err);
    }

    /// Idempotent: the exchange ref is always refreshed, only a SUBMITTED order transitions.
    fn on_order_accepted(
        &mut self,
        locator: &OrderLocator,
        exchange_ref: ExchangeRef,
        at: DateTime<Utc>,
    ) {
        let Some(strategy_ref) = self.resolve(locator) else {
            warn!("accept for unknown order locator={:?} exchange_ref={}", locator, exchange_ref);
            return;
        };
        let Some(order) = self.registry.assign_exchange_ref(&strategy_ref, exchange_ref) else {
            return;
        };
        if order.state() != OrderState::Submitted {
            debug!("accept ignored strategy_ref={} state={}", strategy_ref, order.state());
            return;
        }
        if let Err(e) = order.accept(at) {
            self.report_order_error(&strategy_ref, e);
            return;
        }
        info!(
            "order accepted strategy_ref={} exchange_ref={}",
            strategy_ref,
            order.exchange_ref().map(|r| r.as_str()).unwrap_or("")
        );
        let body = self.order_action(&strategy_ref, OrderState::Accepted);
        self.emitter.emit(body);
    }

    fn on_order_canceled(&mut self, locator: &OrderLocator, _at: DateTime<Utc>) {
        let Some(strategy_ref) = self.resolve(locator) else {
            warn!("cancel confirmation for unknown order locator={:?}", locator);
            return;
        };
        let body = self.order_action(&strategy_ref, OrderState::Canceled);
        let Some(order) = self.registry.get_mut(&strategy_ref) else {
            return;
        };
        if let Err(e) = order.switch_state(OrderState::Canceled) {
            self.report_order_error(&strategy_ref, e);
            return;
        }
        self.registry.unregister(&strategy_ref);
        self.expiry_cancels.remove(&strategy_ref);
        info!("order canceled strategy_ref={}", strategy_ref);
        self.emitter.emit(body);
    }

    /// SUBMITTED orders are accepted implicitly before their first fill is applied.
    fn accept_if_submitted(&mut self, strategy_ref: &StrategyRef, at: DateTime<Utc>) -> bool {
        let Some(order) = self.registry.get_mut(strategy_ref) else {
            return false;
        };
        if order.state() != OrderState::Submitted {
            return true;
        }
        if let Err(e) = order.accept(at) {
            self.report_order_error(strategy_ref, e);
            return false;
        }
        let body = self.order_action(strategy_ref, OrderState::Accepted);
        self.emitter.emit(body);
        true
    }

    fn next_trade_ref(&self, strategy_ref: &StrategyRef) -> String {
        let n = self.registry.get(strategy_ref).map(|o| o.executions().len()).unwrap_or(0) + 1;
        format!("{}-{}", strategy_ref, n)
    }

    fn on_trade(
        &mut self,
        locator: &OrderLocator,
        price: Decimal,
        quantity: Decimal,
        commission: Decimal,
        exchange_trade_ref: Option<String>,
        at: DateTime<Utc>,
    ) {
        let Some(strategy_ref) = self.resolve(locator) else {
            warn!("trade for unknown order locator={:?} qty={} price={}", locator, quantity, price);
            return;
        };
        if !self.accept_if_submitted(&strategy_ref, at) {
            return;
        }
        let info = OrderExecutionInfo {
            price,
            quantity,
            commission,
            timestamp: at,
            exchange_trade_ref: exchange_trade_ref
                .unwrap_or_else(|| self.next_trade_ref(&strategy_ref)),
        };
        self.apply_fill(&strategy_ref, info);
    }

    /// Full-refresh report: derive the increment since the last applied fill.
    fn on_execution(
        &mut self,
        locator: &OrderLocator,
        cumulative_filled: Decimal,
        avg_price: Decimal,
        cumulative_commission: Decimal,
        at: DateTime<Utc>,
    ) {
        let Some(strategy_ref) = self.resolve(locator) else {
            warn!(
                "execution for unknown order locator={:?} cum_qty={}",
                locator, cumulative_filled
            );
            return;
        };
        if !self.accept_if_submitted(&strategy_ref, at) {
            return;
        }
        let trade_ref = self.next_trade_ref(&strategy_ref);
        let increment = self.registry.get(&strategy_ref).and_then(|o| {
            o.incremental_from_cumulative(
                cumulative_filled,
                avg_price,
                cumulative_commission,
                at,
                trade_ref,
            )
        });
        match increment {
            Some(info) => self.apply_fill(&strategy_ref, info),
            None => debug!(
                "execution carries no new quantity strategy_ref={} cum_qty={}",
                strategy_ref, cumulative_filled
            ),
        }
    }

    fn apply_fill(&mut self, strategy_ref: &StrategyRef, info: OrderExecutionInfo) {
        let Some(order) = self.registry.get_mut(strategy_ref) else {
            return;
        };
        if let Err(e) = order.add_execution_info(info.clone()) {
            self.report_order_error(strategy_ref, e);
            return;
        }
        let if_last = order.remaining().is_zero();
        let report = TradeReport {
            account_name: self.emitter.account_name().to_string(),
            strategy_order_ref: strategy_ref.0.clone(),
            exchange_order_ref: order.exchange_ref().map(|r| r.0.clone()).unwrap_or_default(),
            exchange_trade_ref: info.exchange_trade_ref,
            ticker: order.ticker().to_string(),
            action: order.action(),
            price: info.price,
            quantity: info.quantity,
            commission: info.commission,
            timestamp_ms: to_millis(info.timestamp),
            if_last,
        };
        info!(
            "order filled strategy_ref={} qty={} price={} filled={} remaining={}",
            strategy_ref,
            report.quantity,
            report.price,
            order.filled(),
            order.remaining()
        );
        if if_last {
            self.registry.unregister(strategy_ref);
            self.registry.mark_filled(strategy_ref);
            self.expiry_cancels.remove(strategy_ref);
        }
        self.emitter.emit(ResponseBody::OnTrade(report));
    }

    fn on_broker_error(&mut self, kind: ErrorKind, message: String, locator: Option<OrderLocator>) {
        let (strategy_ref, exchange_ref) = match &locator {
            Some(OrderLocator::Strategy(r)) => (Some(r.clone()), None),
            Some(OrderLocator::Exchange(x)) => {
                (self.registry.strategy_ref_for(x).cloned(), Some(x.clone()))
            }
            Some(OrderLocator::Cust(c)) => (
                self.registry
                    .by_cust_id(c)
                    .and_then(|o| o.strategy_ref().cloned())
                    .or_else(|| {
                        self.etf_converts
                            .by_cust_id(c)
                            .and_then(|r| r.strategy_ref().cloned())
                    }),
                None,
            ),
            None => (None, None),
        };
        let mut err = GatewayError::new(kind, message).with_exchange_ref(exchange_ref);
        err.strategy_ref = strategy_ref;
        self.emitter.on_error(&mut self.registry, err);
    }

    fn resolve_etf(&self, locator: &OrderLocator) -> Option<StrategyRef> {
        let request = match locator {
            OrderLocator::Strategy(r) => self.etf_converts.get(r),
            OrderLocator::Cust(c) => self.etf_converts.by_cust_id(c),
            OrderLocator::Exchange(_) => None,
        }?;
        request.strategy_ref().cloned()
    }

    fn on_etf_accepted(&mut self, locator: &OrderLocator, exchange_ref: Option<ExchangeRef>) {
        let Some(strategy_ref) = self.resolve_etf(locator) else {
            warn!("etf convert accept for unknown request locator={:?}", locator);
            return;
        };
        let action = self.etf_converts.get(&strategy_ref).map(|r| r.action());
        info!("etf convert accepted strategy_ref={} action={:?}", strategy_ref, action);
        self.emitter.emit(ResponseBody::OnOrderAction(OrderActionReport {
            account_name: self.emitter.account_name().to_string(),
            strategy_order_ref: strategy_ref.0,
            exchange_order_ref: exchange_ref.map(|r| r.0).unwrap_or_default(),
            state: OrderState::Accepted,
            action,
        }));
    }

    fn on_etf_component(
        &mut self,
        locator: &OrderLocator,
        component_ticker: String,
        quantity: Decimal,
        exchange_ref: Option<ExchangeRef>,
    ) {
        let Some(strategy_ref) = self.resolve_etf(locator) else {
            warn!(
                "etf component for unknown request locator={:?} ticker={}",
                locator, component_ticker
            );
            return;
        };
        let etf_ticker = self
            .etf_converts
            .get(&strategy_ref)
            .map(|r| r.ticker().to_string())
            .unwrap_or_default();
        self.emitter.emit(ResponseBody::EtfConvertComponent(EtfComponentReport {
            account_name: self.emitter.account_name().to_string(),
            strategy_order_ref: strategy_ref.0,
            etf_ticker,
            component_ticker,
            quantity,
            exchange_order_ref: exchange_ref.map(|r| r.0).unwrap_or_default(),
        }));
    }
}
