//! Error kinds reported on the wire and the typed errors that carry them.
//!
//! [`ErrorKind::retires_order`] is the one place that decides whether an error means the
//! referenced order can no longer be alive.

use crate::types::{ExchangeRef, OrderState, StrategyRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error kind carried by `ON_ERROR` responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidOrder,
    OrderNotFound,
    InsertTooFast,
    CancelTooFast,
    QuantityExcessLimit,
    PriceExcessLimit,
    InvalidSymbol,
    InvalidStateTransition,
    AuthFailed,
    InsufficientFunds,
    InsufficientQuantity,
    PriceTooHigh,
    PriceTooLow,
    DuplicateOrderId,
    DuplicateCustomOrderId,
    InvalidOrderId,
    InstrumentMismatch,
    InstrumentExpired,
    InstrumentNoMarketPrice,
    AccountMismatch,
    InvalidAccount,
    AccountSuspended,
    PermissionDenied,
    InvalidType,
    RequestTimeout,
    ExcessDailyQuota,
    CancelPending,
    ExchangeError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 28] = [
        ErrorKind::InvalidOrder,
        ErrorKind::OrderNotFound,
        ErrorKind::InsertTooFast,
        ErrorKind::CancelTooFast,
        ErrorKind::QuantityExcessLimit,
        ErrorKind::PriceExcessLimit,
        ErrorKind::InvalidSymbol,
        ErrorKind::InvalidStateTransition,
        ErrorKind::AuthFailed,
        ErrorKind::InsufficientFunds,
        ErrorKind::InsufficientQuantity,
        ErrorKind::PriceTooHigh,
        ErrorKind::PriceTooLow,
        ErrorKind::DuplicateOrderId,
        ErrorKind::DuplicateCustomOrderId,
        ErrorKind::InvalidOrderId,
        ErrorKind::InstrumentMismatch,
        ErrorKind::InstrumentExpired,
        ErrorKind::InstrumentNoMarketPrice,
        ErrorKind::AccountMismatch,
        ErrorKind::InvalidAccount,
        ErrorKind::AccountSuspended,
        ErrorKind::PermissionDenied,
        ErrorKind::InvalidType,
        ErrorKind::RequestTimeout,
        ErrorKind::ExcessDailyQuota,
        ErrorKind::CancelPending,
        ErrorKind::ExchangeError,
    ];

    /// Snake-case wire code.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidOrder => "invalid_order",
            ErrorKind::OrderNotFound => "order_not_exist",
            ErrorKind::InsertTooFast => "insert_order_too_fast",
            ErrorKind::CancelTooFast => "cancel_order_too_fast",
            // quantity ceilings are reported to strategies as an insufficient quantity
            ErrorKind::QuantityExcessLimit => "insufficient_qty",
            ErrorKind::PriceExcessLimit => "price_excess_limit",
            ErrorKind::InvalidSymbol => "invalid_symbol",
            ErrorKind::InvalidStateTransition => "invalid_state_transition",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::InsufficientFunds => "insufficient_fund",
            ErrorKind::InsufficientQuantity => "insufficient_qty",
            ErrorKind::PriceTooHigh => "price_too_high",
            ErrorKind::PriceTooLow => "price_too_low",
            ErrorKind::DuplicateOrderId => "duplicate_orderid",
            ErrorKind::DuplicateCustomOrderId => "duplicate_custom_orderid",
            ErrorKind::InvalidOrderId => "invalid_orderid",
            ErrorKind::InstrumentMismatch => "instrument_do_not_match",
            ErrorKind::InstrumentExpired => "instrument_expired",
            ErrorKind::InstrumentNoMarketPrice => "instrument_has_no_market_price",
            ErrorKind::AccountMismatch => "accounts_do_not_match",
            ErrorKind::InvalidAccount => "invalid_account",
            ErrorKind::AccountSuspended => "account_suspended",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::InvalidType => "invalid_type",
            ErrorKind::RequestTimeout => "request_timeout",
            ErrorKind::ExcessDailyQuota => "excess_daily_quota",
            ErrorKind::CancelPending => "cancel_pending",
            ErrorKind::ExchangeError => "unknown",
        }
    }

    /// True when the broker never accepted, or never will accept, the referenced order,
    /// so it must leave the active set.
    pub fn retires_order(self) -> bool {
        use ErrorKind::*;
        matches!(
            self,
            AuthFailed
                | InsufficientFunds
                | InsufficientQuantity
                | QuantityExcessLimit
                | PriceTooLow
                | PriceTooHigh
                | PriceExcessLimit
                | DuplicateOrderId
                | DuplicateCustomOrderId
                | InvalidOrderId
                | InvalidSymbol
                | InstrumentMismatch
                | InstrumentExpired
                | InstrumentNoMarketPrice
                | AccountMismatch
                | InvalidAccount
                | AccountSuspended
                | PermissionDenied
                | InvalidType
                | InvalidOrder
                | RequestTimeout
                | ExcessDailyQuota
                | InsertTooFast
                | OrderNotFound
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Order model failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: OrderState, to: OrderState },
    #[error("quantity must be a positive whole number of trade units, got {0}")]
    InvalidQuantity(Decimal),
    #[error("limit price must be positive, got {0}")]
    InvalidPrice(Decimal),
    #[error("fill of {requested} exceeds remaining {remaining}")]
    OverFill { requested: Decimal, remaining: Decimal },
    #[error("action {0} is not a limit order action")]
    UnsupportedAction(String),
    #[error("strategy order ref already set to {0}")]
    RefAlreadySet(String),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            _ => ErrorKind::InvalidOrder,
        }
    }
}

/// A tagged error value correlated to an order when one is known.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
    pub strategy_ref: Option<StrategyRef>,
    pub exchange_ref: Option<ExchangeRef>,
    /// False for rejections raised before the request touched the registry.
    pub retire: bool,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            strategy_ref: None,
            exchange_ref: None,
            retire: true,
        }
    }

    /// Mark as a pre-registration rejection: reported, but never retires an order.
    pub fn before_registration(mut self) -> Self {
        self.retire = false;
        self
    }

    /// Whether reporting this error must remove the referenced order from the active set.
    pub fn retires_order(&self) -> bool {
        self.retire && self.kind.retires_order()
    }

    pub fn for_order(mut self, strategy_ref: &StrategyRef) -> Self {
        self.strategy_ref = Some(strategy_ref.clone());
        self
    }

    pub fn with_exchange_ref(mut self, exchange_ref: Option<ExchangeRef>) -> Self {
        self.exchange_ref = exchange_ref;
        self
    }
}

impl From<OrderError> for GatewayError {
    fn from(e: OrderError) -> Self {
        GatewayError::new(e.kind(), e.to_string())
    }
}

/// Failure returned by a broker adapter call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("broker {kind}: {message}")]
pub struct BrokerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BrokerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
