//! Shared engine fixture for the unit tests in this module tree.

use super::Engine;
use crate::audit::InMemoryAuditSink;
use crate::broker::{BrokerEvent, OrderLocator, RecordingBroker};
use crate::clock::ManualClock;
use crate::config::GatewayConfig;
use crate::context::GatewayContext;
use crate::emitter::{InMemoryResponseSink, ResponseEmitter};
use crate::scheduler::{EngineEvent, EventReceiver};
use crate::types::{ExchangeRef, OrderAction, StrategyRef};
use crate::wire::message::{InsertOrder, RequestBody, RequestEnvelope, ResponseBody};
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct Harness {
    pub engine: Engine,
    pub clock: ManualClock,
    pub broker: RecordingBroker,
    pub sink: InMemoryResponseSink,
    pub audit: InMemoryAuditSink,
    pub events: EventReceiver,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(GatewayConfig::default())
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap());
        let (ctx, events) = GatewayContext::new(config, Arc::new(clock.clone()));
        let broker = RecordingBroker::new();
        let sink = InMemoryResponseSink::new();
        let audit = InMemoryAuditSink::new();
        let emitter = ResponseEmitter::new(&ctx, Arc::new(sink.clone()), Arc::new(audit.clone()));
        let engine = Engine::new(&ctx, Arc::new(broker.clone()), emitter);
        Self {
            engine,
            clock,
            broker,
            sink,
            audit,
            events,
        }
    }

    pub fn insert(
        &mut self,
        req_id: &str,
        ticker: &str,
        action: OrderAction,
        price: Decimal,
        qty: Decimal,
        expire_secs: u64,
    ) {
        self.engine.dispatch(RequestEnvelope {
            req_id: req_id.to_string(),
            logic_id: "alpha".to_string(),
            timestamp_ms: 0,
            body: RequestBody::InsertOrder(InsertOrder {
                ticker: ticker.to_string(),
                action,
                price,
                quantity: qty,
                expire_secs,
                min_exchange_unit: None,
            }),
        });
    }

    pub fn accept(&mut self, req_id: &str, exchange_ref: &str) {
        let at = self.clock_now();
        self.engine.handle_broker_event(BrokerEvent::OrderAccepted {
            locator: OrderLocator::Strategy(StrategyRef::from(req_id)),
            exchange_ref: ExchangeRef::from(exchange_ref),
            at,
        });
    }

    pub fn clock_now(&self) -> chrono::DateTime<Utc> {
        use crate::clock::Clock;
        self.clock.now()
    }

    /// Let spawned broker calls finish, then feed whatever they reported back into the engine.
    pub async fn settle(&mut self) {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        while let Ok(event) = self.events.try_recv() {
            if let EngineEvent::Broker(e) = event {
                self.engine.handle_broker_event(e);
            }
        }
    }

    pub fn bodies(&self) -> Vec<ResponseBody> {
        self.sink.responses().into_iter().map(|r| r.body).collect()
    }
}
