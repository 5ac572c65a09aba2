//! Identifiers and enums shared by the order model and the wire envelopes.
//!
//! References are newtype wrappers around the strings strategies and brokers hand us.
//! [`OrderState`] owns the lifecycle transition table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy order reference: the strategy's durable handle to an order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StrategyRef(pub String);

/// Exchange order reference, assigned by the broker once it acknowledges an order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExchangeRef(pub String);

/// Adapter-local correlation id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustId(pub String);

/// Owning strategy id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicId(pub String);

impl LogicId {
    pub fn unknown() -> Self {
        LogicId("unknown".to_string())
    }
}

macro_rules! string_ref {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

string_ref!(StrategyRef);
string_ref!(ExchangeRef);
string_ref!(CustId);
string_ref!(LogicId);

/// Trading instruction direction. The ETF variants are creation/redemption instructions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderAction {
    Buy,
    Sell,
    BuyToCover,
    SellShort,
    EtfCreate,
    EtfRedeem,
}

impl OrderAction {
    pub fn is_buy(self) -> bool {
        matches!(self, OrderAction::Buy | OrderAction::BuyToCover)
    }

    pub fn is_sell(self) -> bool {
        matches!(self, OrderAction::Sell | OrderAction::SellShort)
    }

    pub fn is_etf_convert(self) -> bool {
        matches!(self, OrderAction::EtfCreate | OrderAction::EtfRedeem)
    }
}

/// Order lifecycle state. Initial is [`OrderState::Initial`]; terminal are
/// [`OrderState::Filled`] and [`OrderState::Canceled`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    Initial,
    Submitted,
    Accepted,
    PartiallyFilled,
    Filled,
    Canceling,
    Canceled,
    ToBeCanceled,
}

impl OrderState {
    pub const ALL: [OrderState; 8] = [
        OrderState::Initial,
        OrderState::Submitted,
        OrderState::Accepted,
        OrderState::PartiallyFilled,
        OrderState::Filled,
        OrderState::Canceling,
        OrderState::Canceled,
        OrderState::ToBeCanceled,
    ];

    /// Allowed targets from this state.
    pub fn allowed_targets(self) -> &'static [OrderState] {
        use OrderState::*;
        match self {
            Initial => &[Submitted, Canceled, ToBeCanceled],
            Submitted => &[Accepted, Canceling, Canceled, ToBeCanceled],
            Accepted => &[PartiallyFilled, Filled, Canceling, Canceled, ToBeCanceled],
            PartiallyFilled => &[PartiallyFilled, Filled, Canceling, Canceled, ToBeCanceled],
            Canceling => &[Filled, Canceled, PartiallyFilled, Accepted, ToBeCanceled],
            ToBeCanceled => &[Canceled, Filled, Canceling, PartiallyFilled],
            Filled | Canceled => &[],
        }
    }

    pub fn can_transition_to(self, to: OrderState) -> bool {
        self.allowed_targets().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderState::Filled | OrderState::Canceled)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderState::Initial => "INITIAL",
            OrderState::Submitted => "SUBMITTED",
            OrderState::Accepted => "ACCEPTED",
            OrderState::PartiallyFilled => "PARTIALLY_FILLED",
            OrderState::Filled => "FILLED",
            OrderState::Canceling => "CANCELING",
            OrderState::Canceled => "CANCELED",
            OrderState::ToBeCanceled => "TO_BE_CANCELED",
        };
        f.write_str(s)
    }
}
