//! # Order Gateway
//!
//! Order management and execution gateway between trading strategies and a broker
//! connection. Strategies send framed requests (insert, batch insert, cancel, queries); the
//! gateway validates them against a risk gate, tracks each order through its lifecycle,
//! forwards them to a [`BrokerAdapter`] and publishes responses (trades, state changes,
//! query results, errors).
//!
//! ## Entry point
//!
//! Build a [`GatewayContext`], a [`ResponseEmitter`] and an adapter, then drive an
//! [`Engine`] with [`Engine::run`]. Everything touching engine state goes through the
//! [`LoopHandle`] in the context.
//!
//! ```rust
//! use order_gateway::{Engine, GatewayConfig, GatewayContext, ResponseEmitter, SystemClock};
//! use order_gateway::audit::InMemoryAuditSink;
//! use order_gateway::broker::RecordingBroker;
//! use order_gateway::emitter::InMemoryResponseSink;
//! use std::sync::Arc;
//!
//! let (ctx, _events) = GatewayContext::new(GatewayConfig::default(), Arc::new(SystemClock));
//! let emitter = ResponseEmitter::new(
//!     &ctx,
//!     Arc::new(InMemoryResponseSink::new()),
//!     Arc::new(InMemoryAuditSink::new()),
//! );
//! let engine = Engine::new(&ctx, Arc::new(RecordingBroker::new()), emitter);
//! assert!(engine.registry().is_empty());
//! ```

pub mod account;
pub mod api;
pub mod audit;
pub mod broker;
pub mod clock;
pub mod config;
pub mod context;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod instrument;
pub mod order;
pub mod paper;
pub mod registry;
pub mod risk;
pub mod scheduler;
pub mod types;
pub mod wire;

pub use broker::{BrokerAdapter, BrokerEvent, OrderLocator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GatewayConfig;
pub use context::GatewayContext;
pub use emitter::{ResponseEmitter, ResponseSink};
pub use engine::{Engine, HealthReport};
pub use error::{BrokerError, ErrorKind, GatewayError, OrderError};
pub use order::{BatchOrder, EtfConvertRequest, Order, OrderExecutionInfo};
pub use registry::OrderRegistry;
pub use scheduler::{EngineEvent, Job, LoopHandle, Scheduler, StopFlag};
pub use types::{CustId, ExchangeRef, LogicId, OrderAction, OrderState, StrategyRef};
