//! Request routing. Each handler returns `Result<(), GatewayError>`; [`Engine::dispatch`]
//! turns every `Err` into exactly one `ON_ERROR`.

use super::Engine;
use crate::audit::AuditCategory;
use crate::broker::OrderLocator;
use crate::clock::to_millis;
use crate::error::{ErrorKind, GatewayError};
use crate::order::{BatchOrder, EtfConvertRequest, Order};
use crate::risk::RiskViolation;
use crate::types::{LogicId, OrderAction, OrderState, StrategyRef};
use crate::wire::codec::decode_request;
use crate::wire::message::{
    BatchChild, InsertOrder, InstrumentEntry, InstrumentReport, PendingOrder, QueryOrderReport,
    RequestBody, RequestEnvelope, ResponseBody,
};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use std::collections::HashSet;

fn rejected(v: RiskViolation, strategy_ref: &StrategyRef) -> GatewayError {
    GatewayError::new(v.kind(), v.to_string()).for_order(strategy_ref)
}

fn invalid_order(e: impl std::fmt::Display, strategy_ref: &StrategyRef) -> GatewayError {
    GatewayError::new(ErrorKind::InvalidOrder, e.to_string()).for_order(strategy_ref)
}

fn not_found(strategy_ref: &StrategyRef) -> GatewayError {
    GatewayError::new(ErrorKind::OrderNotFound, format!("order {} does not exist", strategy_ref))
        .for_order(strategy_ref)
}

impl Engine {
    /// Audit, decode and dispatch one request frame. Undecodable frames are dropped.
    pub fn handle_request_bytes(&mut self, bytes: &[u8]) {
        self.emitter.audit(AuditCategory::Request, bytes.to_vec());
        match decode_request(bytes) {
            Ok((request, _)) => self.dispatch(request),
            Err(e) => error!("request dropped len={} err={}", bytes.len(), e),
        }
    }

    /// Route one decoded request by head.
    pub fn dispatch(&mut self, request: RequestEnvelope) {
        let now = self.now();
        let head = request.head();
        let strategy_ref = StrategyRef(request.req_id);
        let logic_id = if request.logic_id.is_empty() {
            LogicId::unknown()
        } else {
            LogicId(request.logic_id)
        };
        debug!(
            "request received head={:?} req_id={} logic_id={}",
            head, strategy_ref, logic_id
        );

        // insert handlers fail only before anything is registered
        let result = match request.body {
            RequestBody::InsertOrder(body) if body.action.is_etf_convert() => self
                .on_etf_convert(strategy_ref, logic_id, body, now)
                .map_err(GatewayError::before_registration),
            RequestBody::InsertOrder(body) => self
                .on_insert_order(strategy_ref, logic_id, body, now)
                .map_err(GatewayError::before_registration),
            RequestBody::InsertBatchOrder(body) => self
                .on_insert_batch(strategy_ref, logic_id, body.orders, now)
                .map_err(GatewayError::before_registration),
            RequestBody::AlterOrder(body) => {
                self.on_cancel_order(StrategyRef(body.strategy_order_ref), now)
            }
            RequestBody::BatchCancel(body) => {
                let refs = body.strategy_order_refs.into_iter().map(StrategyRef).collect();
                self.on_batch_cancel(refs);
                Ok(())
            }
            RequestBody::QueryPosition | RequestBody::QueryAccount => {
                self.publish_positions(Some(&strategy_ref));
                self.publish_balances(Some(&strategy_ref));
                Ok(())
            }
            RequestBody::QueryOrder => {
                self.publish_pending_orders();
                Ok(())
            }
            RequestBody::QueryInstrument => {
                self.publish_instruments();
                Ok(())
            }
            RequestBody::QueryTrade => {
                warn!("query trade is not supported req_id={}", strategy_ref);
                Ok(())
            }
        };
        if let Err(e) = result {
            self.emitter.on_error(&mut self.registry, e);
        }
    }

    fn on_insert_order(
        &mut self,
        strategy_ref: StrategyRef,
        logic_id: LogicId,
        body: InsertOrder,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        self.ensure_not_active(&strategy_ref)?;
        self.risk.check_insert_rate(now).map_err(|v| rejected(v, &strategy_ref))?;
        self.risk
            .check_volume(&self.registry, &body.ticker)
            .map_err(|v| rejected(v, &strategy_ref))?;

        let mut order = self.build_order(
            &strategy_ref,
            &logic_id,
            &body.ticker,
            body.action,
            body.price,
            body.quantity,
            body.expire_secs,
            now,
        )?;
        self.risk
            .check_self_trade(&self.registry, &order)
            .map_err(|v| rejected(v, &strategy_ref))?;
        order
            .submit(strategy_ref.clone(), now)
            .map_err(|e| invalid_order(e, &strategy_ref))?;

        info!(
            "order submitted strategy_ref={} ticker={} action={:?} price={} qty={} logic_id={}",
            strategy_ref,
            order.ticker(),
            order.action(),
            order.limit_price(),
            order.quantity(),
            logic_id
        );
        self.registry.register(order.clone());
        self.risk.record_insert(now);

        let broker = self.broker.clone();
        self.handle
            .spawn_broker_call("send_limit_order", Self::locate(&strategy_ref), async move {
                broker.send_limit_order(order).await
            });
        Ok(())
    }

    /// A strategy ref may be reused only once its previous order has left the active set.
    fn ensure_not_active(&self, strategy_ref: &StrategyRef) -> Result<(), GatewayError> {
        if self.registry.get(strategy_ref).is_some() {
            return Err(GatewayError::new(
                ErrorKind::DuplicateCustomOrderId,
                format!("order {} is still active", strategy_ref),
            )
            .for_order(strategy_ref));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn build_order(
        &self,
        strategy_ref: &StrategyRef,
        logic_id: &LogicId,
        ticker: &str,
        action: OrderAction,
        price: Decimal,
        quantity: Decimal,
        expire_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<Order, GatewayError> {
        let traits = self.catalog.lookup(ticker).cloned().ok_or_else(|| {
            let message = format!("no instrument traits for {}", ticker);
            GatewayError::new(ErrorKind::InvalidSymbol, message).for_order(strategy_ref)
        })?;
        let mut order = Order::limit(action, ticker, price, quantity, traits, now)
            .map_err(|e| invalid_order(e, strategy_ref))?;
        order.set_logic_id(logic_id.clone());
        order.set_expire_secs(if expire_secs == 0 {
            self.config.max_order_life.as_secs()
        } else {
            expire_secs
        });
        Ok(order)
    }

    /// Children are all built before any is registered, so one bad child rejects the batch.
    fn on_insert_batch(
        &mut self,
        batch_ref: StrategyRef,
        logic_id: LogicId,
        children: Vec<BatchChild>,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        self.risk.check_insert_rate(now).map_err(|v| rejected(v, &batch_ref))?;
        if children.is_empty() {
            return Err(invalid_order("empty batch", &batch_ref));
        }

        let mut orders = Vec::with_capacity(children.len());
        let mut child_refs = HashSet::with_capacity(children.len());
        for child in children {
            let child_ref = StrategyRef(child.strategy_order_ref);
            if self.registry.get(&child_ref).is_some() || !child_refs.insert(child_ref.clone()) {
                return Err(GatewayError::new(
                    ErrorKind::DuplicateCustomOrderId,
                    format!("child {} is duplicated or still active", child_ref),
                )
                .for_order(&batch_ref));
            }
            let mut order = self
                .build_order(
                    &child_ref,
                    &logic_id,
                    &child.ticker,
                    child.action,
                    child.price,
                    child.quantity,
                    child.expire_secs,
                    now,
                )
                .map_err(|mut e| {
                    // the whole batch fails, so report against the batch
                    e.message = format!("{} (child {})", e.message, child_ref);
                    e.strategy_ref = Some(batch_ref.clone());
                    e
                })?;
            order.submit(child_ref, now).map_err(|e| invalid_order(e, &batch_ref))?;
            orders.push(order);
        }

        let batch = BatchOrder::new(logic_id, orders);
        info!(
            "batch submitted batch_ref={} batch_id={} children={} turnover={}",
            batch_ref,
            batch.batch_id(),
            batch.orders().len(),
            batch.turnover()
        );
        let mut locators = Vec::with_capacity(batch.orders().len());
        for order in batch.orders() {
            if let Some(child_ref) = order.strategy_ref() {
                locators.push(OrderLocator::Strategy(child_ref.clone()));
            }
            self.registry.register(order.clone());
        }
        self.risk.record_insert(now);

        // a failed batch call is reported against each child so all of them retire
        let broker = self.broker.clone();
        self.handle
            .spawn_broker_call("send_orders_in_batch", locators, async move {
                broker.send_orders_in_batch(batch).await
            });
        Ok(())
    }

    /// Single cancel. Also the path the expiry sweep goes through.
    pub(super) fn on_cancel_order(
        &mut self,
        strategy_ref: StrategyRef,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let order = self
            .registry
            .get(&strategy_ref)
            .ok_or_else(|| not_found(&strategy_ref))?;
        if let Err(v) = self.risk.check_cancel(now, order) {
            let exchange_ref = order.exchange_ref().cloned();
            return Err(rejected(v, &strategy_ref).with_exchange_ref(exchange_ref));
        }
        let order = self.begin_cancel(&strategy_ref)?;
        info!(
            "order cancel requested strategy_ref={} exchange_ref={}",
            strategy_ref,
            order.exchange_ref().map(|r| r.as_str()).unwrap_or("")
        );
        let broker = self.broker.clone();
        self.handle
            .spawn_broker_call("cancel_order", Self::locate(&strategy_ref), async move {
                broker.cancel_order(order).await
            });
        Ok(())
    }

    /// Move an active order to CANCELING and hand back a copy for the broker.
    fn begin_cancel(&mut self, strategy_ref: &StrategyRef) -> Result<Order, GatewayError> {
        let order = self
            .registry
            .get_mut(strategy_ref)
            .ok_or_else(|| not_found(strategy_ref))?;
        if order.state() != OrderState::Canceling {
            order
                .switch_state(OrderState::Canceling)
                .map_err(|e| GatewayError::from(e).for_order(strategy_ref))?;
        }
        Ok(order.clone())
    }

    fn on_batch_cancel(&mut self, refs: Vec<StrategyRef>) {
        let mut orders = Vec::with_capacity(refs.len());
        for strategy_ref in refs {
            match self.begin_cancel(&strategy_ref) {
                Ok(order) => orders.push(order),
                Err(e) => {
                    warn!("batch cancel skipped strategy_ref={} reason={}", strategy_ref, e)
                }
            }
        }
        if orders.is_empty() {
            return;
        }
        info!("batch cancel requested orders={}", orders.len());
        let broker = self.broker.clone();
        self.handle
            .spawn_broker_call("cancel_orders_in_batch", Vec::new(), async move {
                broker.cancel_orders_in_batch(orders).await
            });
    }

    fn on_etf_convert(
        &mut self,
        strategy_ref: StrategyRef,
        logic_id: LogicId,
        body: InsertOrder,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        self.risk.check_insert_rate(now).map_err(|v| rejected(v, &strategy_ref))?;
        let min_unit = body.min_exchange_unit.unwrap_or(body.quantity);
        let mut request =
            EtfConvertRequest::new(body.action, body.ticker, body.quantity, min_unit, now)
                .map_err(|e| invalid_order(e, &strategy_ref))?;
        request.submission_mut().set_logic_id(logic_id);
        request
            .submission_mut()
            .mark_submitted(strategy_ref.clone(), now)
            .map_err(|e| invalid_order(e, &strategy_ref))?;

        info!(
            "etf convert submitted strategy_ref={} ticker={} action={:?} qty={}",
            strategy_ref,
            request.ticker(),
            request.action(),
            request.quantity()
        );
        self.etf_converts.register(request.clone());
        self.risk.record_insert(now);

        let broker = self.broker.clone();
        self.handle
            .spawn_broker_call("send_etf_convert", Self::locate(&strategy_ref), async move {
                broker.send_etf_convert(request).await
            });
        Ok(())
    }

    /// Active orders plus broker-visible orders the gateway never mapped (`manual`).
    pub(super) fn publish_pending_orders(&mut self) {
        let mut pending: Vec<PendingOrder> = self
            .registry
            .active_orders()
            .map(|o| PendingOrder {
                strategy_order_ref: o.strategy_ref().map(|r| r.0.clone()).unwrap_or_default(),
                exchange_order_ref: o.exchange_ref().map(|r| r.0.clone()).unwrap_or_default(),
                ticker: o.ticker().to_string(),
                action: o.action(),
                price: o.limit_price(),
                quantity: o.quantity(),
                filled: o.filled(),
                state: o.state(),
                create_time_ms: to_millis(o.submission().created_at()),
            })
            .collect();
        pending.extend(
            self.broker_orders
                .value()
                .iter()
                .filter(|q| !self.registry.knows_exchange_ref(&q.exchange_ref))
                .map(|q| PendingOrder {
                    strategy_order_ref: "manual".to_string(),
                    exchange_order_ref: q.exchange_ref.0.clone(),
                    ticker: q.ticker.clone(),
                    action: q.action,
                    price: q.limit_price,
                    quantity: q.quantity,
                    filled: q.filled,
                    state: if q.filled.is_zero() {
                        OrderState::Accepted
                    } else {
                        OrderState::PartiallyFilled
                    },
                    create_time_ms: to_millis(q.create_time),
                }),
        );
        let updated_at = self.broker_orders.updated_at().unwrap_or_else(|| self.now());
        let update_time_ms = to_millis(updated_at);
        self.emitter.emit(ResponseBody::OnQueryOrder(QueryOrderReport {
            account_name: self.emitter.account_name().to_string(),
            update_time_ms,
            pending_orders: pending,
        }));
    }

    fn publish_instruments(&mut self) {
        let instruments = self
            .catalog
            .entries()
            .map(|(ticker, t)| InstrumentEntry {
                ticker: ticker.clone(),
                trade_unit: t.trade_unit,
                price_tick: t.price_tick,
                min_order_volume: t.min_order_volume,
                max_order_volume: t.max_order_volume,
                quote_precision: t.quote_precision,
                base: t.base.clone(),
                quote: t.quote.clone(),
                exchange_name: t.exchange_name.clone(),
            })
            .collect();
        self.emitter
            .emit(ResponseBody::OnQueryInstrument(InstrumentReport { instruments }));
    }
}
