//! The order lifecycle engine.
//!
//! One [`Engine`] owns the registry, risk gate, account snapshots and sweep bookkeeping, and
//! is driven from a single event loop ([`Engine::run`]). Handlers never block: broker calls
//! are spawned off the loop and report back as [`EngineEvent::Broker`] events.
//!
//! Request routing lives in `dispatch`, adapter callbacks in `callbacks`, periodic
//! reconciliation in `reconcile`.

mod callbacks;
mod dispatch;
mod reconcile;
#[cfg(test)]
mod testing;

pub use reconcile::HealthReport;

use crate::account::{AccountBalance, AccountHolding, QryOrderResult, Snapshot};
use crate::broker::{BrokerAdapter, OrderLocator};
use crate::clock::Clock;
use crate::config::GatewayConfig;
use crate::context::GatewayContext;
use crate::emitter::ResponseEmitter;
use crate::instrument::InstrumentCatalog;
use crate::registry::{EtfConvertRegistry, OrderRegistry};
use crate::risk::RiskGate;
use crate::scheduler::{EngineEvent, EventReceiver, LoopHandle};
use crate::types::{ExchangeRef, StrategyRef};
use chrono::{DateTime, Utc};
use log::info;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct Engine {
    config: Arc<GatewayConfig>,
    clock: Arc<dyn Clock>,
    handle: LoopHandle,
    broker: Arc<dyn BrokerAdapter>,
    emitter: ResponseEmitter,
    catalog: InstrumentCatalog,
    registry: OrderRegistry,
    etf_converts: EtfConvertRegistry,
    risk: RiskGate,
    holdings: Snapshot<Vec<AccountHolding>>,
    balances: Snapshot<Vec<AccountBalance>>,
    broker_orders: Snapshot<Vec<QryOrderResult>>,
    // orders the expiry sweep already issued a cancel for
    expiry_cancels: HashSet<StrategyRef>,
    // orphans already sent for cancel, with the time they were sent
    orphan_cancels: HashMap<ExchangeRef, DateTime<Utc>>,
    started_at: DateTime<Utc>,
}

impl Engine {
    pub fn new(
        ctx: &GatewayContext,
        broker: Arc<dyn BrokerAdapter>,
        emitter: ResponseEmitter,
    ) -> Self {
        let started_at = ctx.clock.now();
        info!(
            "engine created account={} started_at={} max_order_life={:?}",
            ctx.config.account_name, started_at, ctx.config.max_order_life
        );
        Self {
            catalog: ctx.config.catalog(),
            risk: RiskGate::new(ctx.config.risk_limits()),
            config: ctx.config.clone(),
            clock: ctx.clock.clone(),
            handle: ctx.handle.clone(),
            broker,
            emitter,
            registry: OrderRegistry::new(),
            etf_converts: EtfConvertRegistry::new(),
            holdings: Snapshot::default(),
            balances: Snapshot::default(),
            broker_orders: Snapshot::default(),
            expiry_cancels: HashSet::new(),
            orphan_cancels: HashMap::new(),
            started_at,
        }
    }

    /// Replace the instrument catalogue (defaults to the configured prefix rules).
    pub fn with_catalog(mut self, catalog: InstrumentCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Drain events until [`EngineEvent::Shutdown`] arrives or every sender is gone.
    pub async fn run(mut self, mut events: EventReceiver) {
        info!("engine loop started account={}", self.emitter.account_name());
        while let Some(event) = events.recv().await {
            if matches!(event, EngineEvent::Shutdown) {
                break;
            }
            self.handle_event(event);
        }
        info!(
            "engine loop stopped account={} active_orders={}",
            self.emitter.account_name(),
            self.registry.len()
        );
    }

    /// Process one event to completion.
    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Request(bytes) => self.handle_request_bytes(&bytes),
            EngineEvent::Broker(event) => self.handle_broker_event(event),
            EngineEvent::Job(job) => self.run_job(job),
            EngineEvent::Health(reply) => {
                let _ = reply.send(self.health_report());
            }
            EngineEvent::Shutdown => {}
        }
    }

    pub fn registry(&self) -> &OrderRegistry {
        &self.registry
    }

    pub fn etf_converts(&self) -> &EtfConvertRegistry {
        &self.etf_converts
    }

    pub fn risk(&self) -> &RiskGate {
        &self.risk
    }

    pub fn catalog(&self) -> &InstrumentCatalog {
        &self.catalog
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn broker_orders(&self) -> &[QryOrderResult] {
        self.broker_orders.value()
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn locate(strategy_ref: &StrategyRef) -> Vec<OrderLocator> {
        vec![OrderLocator::Strategy(strategy_ref.clone())]
    }
}
