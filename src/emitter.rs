//! Outbound responses: envelope construction, publication and the audit side channel.
//!
//! [`ResponseEmitter::on_error`] applies [`ErrorKind::retires_order`] to the registry before
//! publishing, so every error path decides order liveness the same way. Errors marked
//! with [`GatewayError::before_registration`] are reported without touching the registry.

use crate::audit::{AuditCategory, AuditRecord, AuditSink};
use crate::clock::{to_millis, Clock};
use crate::context::GatewayContext;
use crate::error::{ErrorKind, GatewayError};
use crate::registry::OrderRegistry;
use crate::types::StrategyRef;
use crate::wire::codec::{decode_response, encode_response};
use crate::wire::message::{ErrorReport, ResponseBody, ResponseEnvelope, ResponseHead};
use log::{debug, error, warn};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Destination for encoded response frames.
pub trait ResponseSink: Send + Sync {
    fn publish(&self, frame: &[u8]) -> anyhow::Result<()>;
}

/// Keeps published frames for tests. Clone shares the same buffer.
#[derive(Clone, Default)]
pub struct InMemoryResponseSink {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl InMemoryResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every published response, decoded.
    pub fn responses(&self) -> Vec<ResponseEnvelope> {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter_map(|f| decode_response(f).ok().map(|(r, _)| r))
            .collect()
    }

    pub fn heads(&self) -> Vec<ResponseHead> {
        self.responses().iter().map(|r| r.head()).collect()
    }

    pub fn clear(&self) {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl ResponseSink for InMemoryResponseSink {
    fn publish(&self, frame: &[u8]) -> anyhow::Result<()> {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).push(frame.to_vec());
        Ok(())
    }
}

pub struct ResponseEmitter {
    account_name: String,
    hostname: String,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ResponseSink>,
    audit: Arc<dyn AuditSink>,
}

impl ResponseEmitter {
    pub fn new(
        ctx: &GatewayContext,
        sink: Arc<dyn ResponseSink>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            account_name: ctx.config.account_name.clone(),
            hostname: ctx.config.hostname.clone(),
            clock: ctx.clock.clone(),
            sink,
            audit,
        }
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// Wrap `body` with a fresh response id and the send time, publish it and audit it.
    pub fn emit(&self, body: ResponseBody) -> ResponseEnvelope {
        let envelope = ResponseEnvelope {
            resp_id: Uuid::new_v4().to_string(),
            timestamp_ms: to_millis(self.clock.now()),
            body,
        };
        match encode_response(&envelope) {
            Ok(frame) => {
                debug!("response emitted head={:?} resp_id={}", envelope.head(), envelope.resp_id);
                if let Err(e) = self.sink.publish(&frame) {
                    error!("response publish failed head={:?} err={:#}", envelope.head(), e);
                }
                self.audit(AuditCategory::Response, frame);
            }
            Err(e) => error!("response encode failed head={:?} err={}", envelope.head(), e),
        }
        envelope
    }

    pub fn audit(&self, category: AuditCategory, payload: Vec<u8>) {
        self.audit.emit(&AuditRecord::new(self.hostname.clone(), category, payload));
    }

    /// Publish `ON_ERROR` for `err`, first retiring the referenced order when the kind says
    /// it can no longer be alive.
    pub fn on_error(&self, registry: &mut OrderRegistry, err: GatewayError) -> ResponseEnvelope {
        let exchange_ref = err.exchange_ref.clone().or_else(|| {
            err.strategy_ref
                .as_ref()
                .and_then(|r| registry.get(r))
                .and_then(|o| o.exchange_ref().cloned())
        });
        if err.retires_order() {
            if let Some(strategy_ref) = &err.strategy_ref {
                registry.unregister(strategy_ref);
            }
        }
        warn!(
            "error reported kind={} strategy_ref={} exchange_ref={} msg={}",
            err.kind,
            err.strategy_ref.as_ref().map(|r| r.as_str()).unwrap_or(""),
            exchange_ref.as_ref().map(|r| r.as_str()).unwrap_or(""),
            err.message
        );
        self.emit(ResponseBody::OnError(ErrorReport {
            account_name: self.account_name.clone(),
            kind: err.kind,
            msg: err.message,
            strategy_order_ref: err.strategy_ref.map(|r| r.0).unwrap_or_default(),
            exchange_order_ref: exchange_ref.map(|r| r.0).unwrap_or_default(),
        }))
    }

    /// Convenience for staleness and other errors with no order attached.
    pub fn exchange_error(
        &self,
        registry: &mut OrderRegistry,
        message: &str,
        strategy_ref: Option<&StrategyRef>,
    ) {
        let mut err = GatewayError::new(ErrorKind::ExchangeError, message);
        err.strategy_ref = strategy_ref.cloned();
        self.on_error(registry, err);
    }
}
