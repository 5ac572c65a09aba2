//! Paper broker: acknowledges everything through the callback channel and keeps its own
//! open-order book so resyncs see what it accepted. Used when no exchange binding is linked.

use crate::account::{AccountBalance, AccountHolding, QryOrderResult};
use crate::broker::{BrokerAdapter, BrokerEvent, OrderLocator};
use crate::clock::Clock;
use crate::error::{BrokerError, ErrorKind};
use crate::order::{BatchOrder, EtfConvertRequest, Order};
use crate::scheduler::LoopHandle;
use crate::types::ExchangeRef;
use async_trait::async_trait;
use log::{debug, info};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub struct PaperBroker {
    handle: LoopHandle,
    clock: Arc<dyn Clock>,
    next_id: AtomicU64,
    logged_in: AtomicBool,
    immediate_fills: bool,
    cash: Decimal,
    open: Mutex<BTreeMap<ExchangeRef, QryOrderResult>>,
}

impl PaperBroker {
    pub fn new(handle: LoopHandle, clock: Arc<dyn Clock>) -> Self {
        Self {
            handle,
            clock,
            next_id: AtomicU64::new(1),
            logged_in: AtomicBool::new(false),
            immediate_fills: false,
            cash: Decimal::from(10_000_000),
            open: Mutex::new(BTreeMap::new()),
        }
    }

    /// Fill every accepted order in full at its limit price.
    pub fn with_immediate_fills(mut self) -> Self {
        self.immediate_fills = true;
        self
    }

    fn next_exchange_ref(&self) -> ExchangeRef {
        ExchangeRef(format!("PAPER-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn ensure_login(&self) -> Result<(), BrokerError> {
        if self.logged_in.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::new(ErrorKind::ExchangeError, "paper broker not logged in"))
        }
    }

    fn open_orders(&self) -> std::sync::MutexGuard<'_, BTreeMap<ExchangeRef, QryOrderResult>> {
        self.open.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn accept(&self, order: &Order) {
        let Some(strategy_ref) = order.strategy_ref().cloned() else {
            return;
        };
        let exchange_ref = self.next_exchange_ref();
        let now = self.clock.now();
        debug!("paper order accepted strategy_ref={} exchange_ref={}", strategy_ref, exchange_ref);
        self.handle.broker_event(BrokerEvent::OrderAccepted {
            locator: OrderLocator::Strategy(strategy_ref.clone()),
            exchange_ref: exchange_ref.clone(),
            at: now,
        });
        if self.immediate_fills {
            self.handle.broker_event(BrokerEvent::Trade {
                locator: OrderLocator::Strategy(strategy_ref),
                price: order.limit_price(),
                quantity: order.remaining(),
                commission: Decimal::ZERO,
                exchange_trade_ref: None,
                at: now,
            });
            return;
        }
        self.open_orders().insert(
            exchange_ref.clone(),
            QryOrderResult {
                exchange_ref,
                ticker: order.ticker().to_string(),
                action: order.action(),
                limit_price: order.limit_price(),
                quantity: order.quantity(),
                filled: order.filled(),
                create_time: now,
            },
        );
    }

    fn cancel(&self, order: &Order) {
        if let Some(exchange_ref) = order.exchange_ref() {
            self.open_orders().remove(exchange_ref);
        }
        // placeholders for foreign orders carry no usable strategy ref
        let locator = match (order.exchange_ref(), order.strategy_ref()) {
            (Some(x), _) => OrderLocator::Exchange(x.clone()),
            (None, Some(r)) => OrderLocator::Strategy(r.clone()),
            (None, None) => return,
        };
        self.handle.broker_event(BrokerEvent::OrderCanceled {
            locator,
            at: self.clock.now(),
        });
    }
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    async fn login(&self) -> Result<(), BrokerError> {
        self.logged_in.store(true, Ordering::SeqCst);
        info!("paper broker logged in");
        Ok(())
    }

    async fn send_limit_order(&self, order: Order) -> Result<(), BrokerError> {
        self.ensure_login()?;
        self.accept(&order);
        Ok(())
    }

    async fn cancel_order(&self, order: Order) -> Result<(), BrokerError> {
        self.ensure_login()?;
        self.cancel(&order);
        Ok(())
    }

    async fn send_orders_in_batch(&self, batch: BatchOrder) -> Result<(), BrokerError> {
        self.ensure_login()?;
        for order in batch.orders() {
            self.accept(order);
        }
        Ok(())
    }

    async fn cancel_orders_in_batch(&self, orders: Vec<Order>) -> Result<(), BrokerError> {
        self.ensure_login()?;
        for order in &orders {
            self.cancel(order);
        }
        Ok(())
    }

    async fn send_etf_convert(&self, request: EtfConvertRequest) -> Result<(), BrokerError> {
        self.ensure_login()?;
        let Some(strategy_ref) = request.strategy_ref().cloned() else {
            return Err(BrokerError::new(ErrorKind::InvalidOrder, "etf convert without request id"));
        };
        let exchange_ref = self.next_exchange_ref();
        self.handle.broker_event(BrokerEvent::EtfConvertAccepted {
            locator: OrderLocator::Strategy(strategy_ref),
            exchange_ref: Some(exchange_ref),
        });
        Ok(())
    }

    async fn qry_active_orders(&self) -> Result<Vec<QryOrderResult>, BrokerError> {
        self.ensure_login()?;
        Ok(self.open_orders().values().cloned().collect())
    }

    async fn qry_account_holding(&self) -> Result<Vec<AccountHolding>, BrokerError> {
        self.ensure_login()?;
        Ok(Vec::new())
    }

    async fn qry_account_balance(&self) -> Result<Vec<AccountBalance>, BrokerError> {
        self.ensure_login()?;
        Ok(vec![AccountBalance {
            currency: "CNY".to_string(),
            balance: self.cash,
            cash: self.cash,
            cash_available: self.cash,
            total_asset: self.cash,
            withdrawable: self.cash,
            ..Default::default()
        }])
    }
}
