//! Order gateway binary.
//!
//! Binds the request, response and audit sockets, logs the broker in, schedules the periodic
//! reconciliation jobs, serves `GET /health` and drives the engine loop until Ctrl-C.

use order_gateway::audit::AuditSink;
use order_gateway::emitter::ResponseSink;
use order_gateway::paper::PaperBroker;
use order_gateway::wire::transport::{RequestPump, ZmqAuditSink, ZmqResponsePublisher};
use order_gateway::{
    api, BrokerAdapter, Engine, EngineEvent, GatewayConfig, GatewayContext, Job, ResponseEmitter,
    Scheduler, SystemClock,
};
use anyhow::Context as _;
use log::{error, info};
use std::sync::Arc;
use tokio::net::TcpListener;

fn main() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let config = GatewayConfig::from_env();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.broker_workers)
        .thread_name("gateway")
        .build()
        .context("build tokio runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    info!(
        "gateway starting account={} request_addr={} response_addr={} audit_addr={}",
        config.account_name, config.request_addr, config.response_addr, config.audit_addr
    );
    let (ctx, events) = GatewayContext::new(config, Arc::new(SystemClock));

    let zmq_ctx = zmq::Context::new();
    let publisher: Arc<dyn ResponseSink> =
        Arc::new(ZmqResponsePublisher::bind(&zmq_ctx, &ctx.config.response_addr)?);
    let audit: Arc<dyn AuditSink> = Arc::new(ZmqAuditSink::bind(&zmq_ctx, &ctx.config.audit_addr)?);
    let pump = RequestPump::bind(&zmq_ctx, &ctx.config.request_addr)?;

    let broker = Arc::new(PaperBroker::new(ctx.handle.clone(), ctx.clock.clone()));
    broker.login().await.context("broker login")?;
    let broker: Arc<dyn BrokerAdapter> = broker;

    let emitter = ResponseEmitter::new(&ctx, publisher, audit);
    let engine = Engine::new(&ctx, broker, emitter);

    let mut scheduler = Scheduler::new(ctx.handle.clone(), ctx.stop.clone());
    scheduler.every(ctx.config.resync_period(ctx.config.order_resync), Job::ResyncOrders);
    scheduler.every(ctx.config.resync_period(ctx.config.holding_resync), Job::ResyncHoldings);
    scheduler.every(ctx.config.resync_period(ctx.config.balance_resync), Job::ResyncBalance);
    scheduler.every(ctx.config.expiry_sweep, Job::SweepExpired);
    scheduler.every(ctx.config.snapshot_interval, Job::Snapshot);

    let addr = format!("0.0.0.0:{}", ctx.config.health_port);
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("bind {}", addr))?;
    info!("health endpoint listening on http://{}/health", addr);
    let app = api::create_router(ctx.handle.clone());
    scheduler.spawn("health-server", async move {
        axum::serve(listener, app.into_make_service())
            .await
            .context("serve health endpoint")
    });

    let pump = pump.spawn(ctx.handle.clone(), ctx.stop.clone(), ctx.config.warmup)?;

    let stop = ctx.stop.clone();
    let handle = ctx.handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("ctrl-c received, stopping"),
            Err(e) => error!("ctrl-c listener failed err={}", e),
        }
        stop.stop();
        handle.schedule(EngineEvent::Shutdown);
    });

    engine.run(events).await;
    scheduler.shutdown().await;
    if pump.join().is_err() {
        error!("request pump thread panicked");
    }
    info!("gateway stopped");
    Ok(())
}
