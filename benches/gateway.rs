//! Gateway performance benchmarks (Criterion): insert dispatch and frame codec throughput.
//!
//! Run: `cargo bench --bench gateway`.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use order_gateway::audit::InMemoryAuditSink;
use order_gateway::broker::RecordingBroker;
use order_gateway::emitter::InMemoryResponseSink;
use order_gateway::wire::codec::{decode_request, encode_request};
use order_gateway::wire::message::{InsertOrder, RequestBody, RequestEnvelope};
use order_gateway::{
    Engine, GatewayConfig, GatewayContext, OrderAction, ResponseEmitter, SystemClock,
};
use rust_decimal::Decimal;
use std::sync::Arc;

fn insert(n: usize) -> RequestEnvelope {
    RequestEnvelope {
        req_id: format!("s{}", n),
        logic_id: "bench".to_string(),
        timestamp_ms: 1_700_000_000_000,
        body: RequestBody::InsertOrder(InsertOrder {
            ticker: "600000.SH".to_string(),
            action: OrderAction::Buy,
            price: Decimal::new(1025, 2),
            quantity: Decimal::from(100),
            expire_secs: 0,
            min_exchange_unit: None,
        }),
    }
}

fn engine() -> Engine {
    let (ctx, _events) = GatewayContext::new(GatewayConfig::default(), Arc::new(SystemClock));
    let emitter = ResponseEmitter::new(
        &ctx,
        Arc::new(InMemoryResponseSink::new()),
        Arc::new(InMemoryAuditSink::new()),
    );
    Engine::new(&ctx, Arc::new(RecordingBroker::new()), emitter)
}

fn bench_insert_dispatch(c: &mut Criterion) {
    const N: usize = 1000;
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();
    let mut group = c.benchmark_group("gateway");
    group.throughput(Throughput::Elements(N as u64));
    group.bench_function("dispatch_insert_1000", |b| {
        b.iter_batched(
            || (engine(), (0..N).map(insert).collect::<Vec<_>>()),
            |(mut engine, requests)| {
                for request in requests {
                    engine.dispatch(request);
                }
                engine
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let request = insert(1);
    let frame = encode_request(&request).unwrap();
    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("encode_insert", |b| b.iter(|| encode_request(&request).unwrap()));
    group.bench_function("decode_insert", |b| b.iter(|| decode_request(&frame).unwrap()));
    group.finish();
}

criterion_group!(benches, bench_insert_dispatch, bench_codec);
criterion_main!(benches);
