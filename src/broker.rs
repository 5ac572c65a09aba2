//! Broker adapter seam.
//!
//! The engine calls out through [`BrokerAdapter`]; adapters report back by scheduling
//! [`BrokerEvent`]s onto the event loop through a [`crate::scheduler::LoopHandle`].

use crate::account::{AccountBalance, AccountHolding, QryOrderResult};
use crate::error::{BrokerError, ErrorKind};
use crate::order::{BatchOrder, EtfConvertRequest, Order};
use crate::types::{CustId, ExchangeRef, StrategyRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};

/// Outbound calls, one per broker operation. All of them run off the event loop.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn login(&self) -> Result<(), BrokerError>;
    async fn send_limit_order(&self, order: Order) -> Result<(), BrokerError>;
    async fn cancel_order(&self, order: Order) -> Result<(), BrokerError>;
    async fn send_orders_in_batch(&self, batch: BatchOrder) -> Result<(), BrokerError>;
    async fn cancel_orders_in_batch(&self, orders: Vec<Order>) -> Result<(), BrokerError>;
    async fn send_etf_convert(&self, request: EtfConvertRequest) -> Result<(), BrokerError>;
    async fn qry_active_orders(&self) -> Result<Vec<QryOrderResult>, BrokerError>;
    async fn qry_account_holding(&self) -> Result<Vec<AccountHolding>, BrokerError>;
    async fn qry_account_balance(&self) -> Result<Vec<AccountBalance>, BrokerError>;
}

/// How a callback names the order it is about.
#[derive(Clone, Debug, PartialEq)]
pub enum OrderLocator {
    Strategy(StrategyRef),
    Exchange(ExchangeRef),
    Cust(CustId),
}

/// Inbound adapter callbacks.
#[derive(Clone, Debug, PartialEq)]
pub enum BrokerEvent {
    CustIdAssigned {
        strategy_ref: StrategyRef,
        cust_id: CustId,
    },
    OrderAccepted {
        locator: OrderLocator,
        exchange_ref: ExchangeRef,
        at: DateTime<Utc>,
    },
    OrderCanceled {
        locator: OrderLocator,
        at: DateTime<Utc>,
    },
    /// Full-refresh execution state: totals so far.
    Execution {
        locator: OrderLocator,
        cumulative_filled: Decimal,
        avg_price: Decimal,
        cumulative_commission: Decimal,
        at: DateTime<Utc>,
    },
    /// One incremental fill.
    Trade {
        locator: OrderLocator,
        price: Decimal,
        quantity: Decimal,
        commission: Decimal,
        exchange_trade_ref: Option<String>,
        at: DateTime<Utc>,
    },
    Error {
        kind: ErrorKind,
        message: String,
        locator: Option<OrderLocator>,
    },
    EtfConvertAccepted {
        locator: OrderLocator,
        exchange_ref: Option<ExchangeRef>,
    },
    EtfComponent {
        locator: OrderLocator,
        component_ticker: String,
        quantity: Decimal,
        exchange_ref: Option<ExchangeRef>,
    },
    ActiveOrders(Vec<QryOrderResult>),
    Holdings(Vec<AccountHolding>),
    Balances(Vec<AccountBalance>),
}

/// A call made through [`RecordingBroker`].
#[derive(Clone, Debug)]
pub enum BrokerCall {
    Login,
    SendLimitOrder(Order),
    CancelOrder(Order),
    SendOrdersInBatch(BatchOrder),
    CancelOrdersInBatch(Vec<Order>),
    SendEtfConvert(EtfConvertRequest),
    QryActiveOrders,
    QryAccountHolding,
    QryAccountBalance,
}

#[derive(Default)]
struct Recorded {
    calls: Vec<BrokerCall>,
    active_orders: Vec<QryOrderResult>,
    holdings: Vec<AccountHolding>,
    balances: Vec<AccountBalance>,
    fail_next: Option<BrokerError>,
}

/// Adapter that records every call and answers queries from canned data. Clone shares state.
#[derive(Clone, Default)]
pub struct RecordingBroker {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn set_active_orders(&self, orders: Vec<QryOrderResult>) {
        self.lock().active_orders = orders;
    }

    pub fn set_holdings(&self, holdings: Vec<AccountHolding>) {
        self.lock().holdings = holdings;
    }

    pub fn set_balances(&self, balances: Vec<AccountBalance>) {
        self.lock().balances = balances;
    }

    /// The next call fails with `err`.
    pub fn fail_next(&self, err: BrokerError) {
        self.lock().fail_next = Some(err);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: BrokerCall) -> Result<(), BrokerError> {
        let mut inner = self.lock();
        inner.calls.push(call);
        match inner.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BrokerAdapter for RecordingBroker {
    async fn login(&self) -> Result<(), BrokerError> {
        self.record(BrokerCall::Login)
    }

    async fn send_limit_order(&self, order: Order) -> Result<(), BrokerError> {
        self.record(BrokerCall::SendLimitOrder(order))
    }

    async fn cancel_order(&self, order: Order) -> Result<(), BrokerError> {
        self.record(BrokerCall::CancelOrder(order))
    }

    async fn send_orders_in_batch(&self, batch: BatchOrder) -> Result<(), BrokerError> {
        self.record(BrokerCall::SendOrdersInBatch(batch))
    }

    async fn cancel_orders_in_batch(&self, orders: Vec<Order>) -> Result<(), BrokerError> {
        self.record(BrokerCall::CancelOrdersInBatch(orders))
    }

    async fn send_etf_convert(&self, request: EtfConvertRequest) -> Result<(), BrokerError> {
        self.record(BrokerCall::SendEtfConvert(request))
    }

    async fn qry_active_orders(&self) -> Result<Vec<QryOrderResult>, BrokerError> {
        self.record(BrokerCall::QryActiveOrders)?;
        Ok(self.lock().active_orders.clone())
    }

    async fn qry_account_holding(&self) -> Result<Vec<AccountHolding>, BrokerError> {
        self.record(BrokerCall::QryAccountHolding)?;
        Ok(self.lock().holdings.clone())
    }

    async fn qry_account_balance(&self) -> Result<Vec<AccountBalance>, BrokerError> {
        self.record(BrokerCall::QryAccountBalance)?;
        Ok(self.lock().balances.clone())
    }
}
