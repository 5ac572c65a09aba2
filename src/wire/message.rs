//! Request and response envelopes carried on the request and response channels.
//!
//! Each envelope holds a correlation id, a timestamp in epoch milliseconds and a body enum
//! whose variant is the message head.

use crate::error::ErrorKind;
use crate::types::{OrderAction, OrderState};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Request head selecting the handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestHead {
    InsertOrder,
    InsertBatchOrder,
    AlterOrder,
    BatchCancel,
    QueryPosition,
    QueryOrder,
    QueryTrade,
    QueryInstrument,
    QueryAccount,
}

/// Strategy → gateway envelope. For INSERT_ORDER `req_id` is the strategy order ref.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub req_id: String,
    pub logic_id: String,
    pub timestamp_ms: i64,
    pub body: RequestBody,
}

impl RequestEnvelope {
    pub fn head(&self) -> RequestHead {
        self.body.head()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RequestBody {
    InsertOrder(InsertOrder),
    InsertBatchOrder(InsertBatchOrder),
    AlterOrder(AlterOrder),
    BatchCancel(BatchCancel),
    QueryPosition,
    QueryOrder,
    QueryTrade,
    QueryInstrument,
    QueryAccount,
}

impl RequestBody {
    pub fn head(&self) -> RequestHead {
        match self {
            RequestBody::InsertOrder(_) => RequestHead::InsertOrder,
            RequestBody::InsertBatchOrder(_) => RequestHead::InsertBatchOrder,
            RequestBody::AlterOrder(_) => RequestHead::AlterOrder,
            RequestBody::BatchCancel(_) => RequestHead::BatchCancel,
            RequestBody::QueryPosition => RequestHead::QueryPosition,
            RequestBody::QueryOrder => RequestHead::QueryOrder,
            RequestBody::QueryTrade => RequestHead::QueryTrade,
            RequestBody::QueryInstrument => RequestHead::QueryInstrument,
            RequestBody::QueryAccount => RequestHead::QueryAccount,
        }
    }
}

/// Single limit order, or an ETF convert when `action` is a convert action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsertOrder {
    pub ticker: String,
    pub action: OrderAction,
    pub price: Decimal,
    pub quantity: Decimal,
    /// 0 means the server-wide maximum order life.
    pub expire_secs: u64,
    /// Only used by ETF converts.
    pub min_exchange_unit: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchChild {
    pub strategy_order_ref: String,
    pub ticker: String,
    pub action: OrderAction,
    pub price: Decimal,
    pub quantity: Decimal,
    pub expire_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsertBatchOrder {
    pub orders: Vec<BatchChild>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlterOrder {
    pub strategy_order_ref: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchCancel {
    pub strategy_order_refs: Vec<String>,
}

/// Response head.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseHead {
    OnTrade,
    OnOrderAction,
    OnQueryOrder,
    OnQueryPosition,
    OnQueryAccount,
    OnQueryInstrument,
    OnError,
    EtfConvertComponent,
}

/// Gateway → strategy envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub resp_id: String,
    pub timestamp_ms: i64,
    pub body: ResponseBody,
}

impl ResponseEnvelope {
    pub fn head(&self) -> ResponseHead {
        self.body.head()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ResponseBody {
    OnTrade(TradeReport),
    OnOrderAction(OrderActionReport),
    OnQueryOrder(QueryOrderReport),
    OnQueryPosition(PositionReport),
    OnQueryAccount(AccountReport),
    OnQueryInstrument(InstrumentReport),
    OnError(ErrorReport),
    EtfConvertComponent(EtfComponentReport),
}

impl ResponseBody {
    pub fn head(&self) -> ResponseHead {
        match self {
            ResponseBody::OnTrade(_) => ResponseHead::OnTrade,
            ResponseBody::OnOrderAction(_) => ResponseHead::OnOrderAction,
            ResponseBody::OnQueryOrder(_) => ResponseHead::OnQueryOrder,
            ResponseBody::OnQueryPosition(_) => ResponseHead::OnQueryPosition,
            ResponseBody::OnQueryAccount(_) => ResponseHead::OnQueryAccount,
            ResponseBody::OnQueryInstrument(_) => ResponseHead::OnQueryInstrument,
            ResponseBody::OnError(_) => ResponseHead::OnError,
            ResponseBody::EtfConvertComponent(_) => ResponseHead::EtfConvertComponent,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeReport {
    pub account_name: String,
    pub strategy_order_ref: String,
    pub exchange_order_ref: String,
    pub exchange_trade_ref: String,
    pub ticker: String,
    pub action: OrderAction,
    pub price: Decimal,
    pub quantity: Decimal,
    pub commission: Decimal,
    pub timestamp_ms: i64,
    pub if_last: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderActionReport {
    pub account_name: String,
    pub strategy_order_ref: String,
    pub exchange_order_ref: String,
    pub state: OrderState,
    /// Set for ETF converts.
    pub action: Option<OrderAction>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    /// `manual` for orders placed outside the gateway.
    pub strategy_order_ref: String,
    pub exchange_order_ref: String,
    pub ticker: String,
    pub action: OrderAction,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled: Decimal,
    pub state: OrderState,
    pub create_time_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryOrderReport {
    pub account_name: String,
    pub update_time_ms: i64,
    pub pending_orders: Vec<PendingOrder>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub ticker: String,
    pub long_holding: Decimal,
    pub long_available: Decimal,
    pub long_avg_cost: Decimal,
    pub short_holding: Decimal,
    pub short_available: Decimal,
    pub short_avg_cost: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    pub account_name: String,
    pub update_time_ms: i64,
    pub positions: Vec<PositionEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountReport {
    pub account_name: String,
    pub currency: String,
    pub update_time_ms: i64,
    pub balance: Decimal,
    pub cash: Decimal,
    pub cash_available: Decimal,
    pub margin: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub total_asset: Decimal,
    pub withdrawable: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentEntry {
    pub ticker: String,
    pub trade_unit: Decimal,
    pub price_tick: Decimal,
    pub min_order_volume: Decimal,
    pub max_order_volume: Decimal,
    pub quote_precision: u32,
    pub base: String,
    pub quote: String,
    pub exchange_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentReport {
    pub instruments: Vec<InstrumentEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub account_name: String,
    pub kind: ErrorKind,
    pub msg: String,
    pub strategy_order_ref: String,
    pub exchange_order_ref: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EtfComponentReport {
    pub account_name: String,
    pub strategy_order_ref: String,
    pub etf_ticker: String,
    pub component_ticker: String,
    pub quantity: Decimal,
    pub exchange_order_ref: String,
}
