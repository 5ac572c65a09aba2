//! zmq sockets: requests in on PULL, responses out on PUB, audit records out on PUSH.
//!
//! `zmq::Socket` is not `Sync`, so outbound sockets sit behind a `Mutex`. The request
//! socket is owned by its pump thread.

use crate::audit::{AuditRecord, AuditSink};
use crate::emitter::ResponseSink;
use crate::scheduler::{EngineEvent, LoopHandle, StopFlag};
use crate::wire::codec::encode_audit;
use anyhow::Context as _;
use log::{debug, error, info, warn};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

const RECV_TIMEOUT_MS: i32 = 200;

fn bind(ctx: &zmq::Context, kind: zmq::SocketType, addr: &str) -> anyhow::Result<zmq::Socket> {
    let socket = ctx.socket(kind).context("create zmq socket")?;
    socket.set_tcp_keepalive(1).context("enable tcp keepalive")?;
    socket.set_linger(0).context("set linger")?;
    socket.bind(addr).with_context(|| format!("bind {}", addr))?;
    Ok(socket)
}

/// Resolved endpoint of a bound socket, e.g. `tcp://0.0.0.0:53001`.
fn last_endpoint(socket: &zmq::Socket) -> anyhow::Result<String> {
    socket
        .get_last_endpoint()
        .context("read last endpoint")?
        .map_err(|_| anyhow::anyhow!("endpoint is not utf-8"))
}

/// Publishes encoded response frames on a PUB socket.
pub struct ZmqResponsePublisher {
    socket: Mutex<zmq::Socket>,
    endpoint: String,
}

impl ZmqResponsePublisher {
    pub fn bind(ctx: &zmq::Context, addr: &str) -> anyhow::Result<Self> {
        let socket = bind(ctx, zmq::PUB, addr)?;
        let endpoint = last_endpoint(&socket)?;
        info!("response publisher bound endpoint={}", endpoint);
        Ok(Self {
            socket: Mutex::new(socket),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ResponseSink for ZmqResponsePublisher {
    fn publish(&self, frame: &[u8]) -> anyhow::Result<()> {
        let socket = self.socket.lock().map_err(|_| anyhow::anyhow!("publisher lock poisoned"))?;
        socket.send(frame, 0).context("publish response")?;
        Ok(())
    }
}

/// Pushes audit records; never blocks the loop. Dropped records are logged.
pub struct ZmqAuditSink {
    socket: Mutex<zmq::Socket>,
    endpoint: String,
}

impl ZmqAuditSink {
    pub fn bind(ctx: &zmq::Context, addr: &str) -> anyhow::Result<Self> {
        let socket = bind(ctx, zmq::PUSH, addr)?;
        let endpoint = last_endpoint(&socket)?;
        info!("audit sink bound endpoint={}", endpoint);
        Ok(Self {
            socket: Mutex::new(socket),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl AuditSink for ZmqAuditSink {
    fn emit(&self, record: &AuditRecord) {
        let frame = encode_audit(&record.hostname, record.category.as_str(), &record.payload);
        let Ok(socket) = self.socket.lock() else {
            warn!("audit record dropped: lock poisoned category={}", record.category.as_str());
            return;
        };
        if let Err(e) = socket.send(frame, zmq::DONTWAIT) {
            debug!("audit record dropped category={} err={}", record.category.as_str(), e);
        }
    }
}

/// Drains the request PULL socket on its own thread, handing every frame to the loop.
pub struct RequestPump {
    socket: zmq::Socket,
    endpoint: String,
}

impl RequestPump {
    pub fn bind(ctx: &zmq::Context, addr: &str) -> anyhow::Result<Self> {
        let socket = bind(ctx, zmq::PULL, addr)?;
        socket.set_rcvtimeo(RECV_TIMEOUT_MS).context("set receive timeout")?;
        let endpoint = last_endpoint(&socket)?;
        info!("request socket bound endpoint={}", endpoint);
        Ok(Self { socket, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Start draining after `warmup`. The thread exits once `stop` is set or the loop is gone.
    pub fn spawn(
        self,
        handle: LoopHandle,
        stop: StopFlag,
        warmup: Duration,
    ) -> anyhow::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("request-pump".to_string())
            .spawn(move || self.run(handle, stop, warmup))
            .context("spawn request pump")
    }

    fn run(self, handle: LoopHandle, stop: StopFlag, warmup: Duration) {
        let deadline = std::time::Instant::now() + warmup;
        while std::time::Instant::now() < deadline {
            if stop.is_stopped() {
                return;
            }
            std::thread::sleep(Duration::from_millis(50).min(warmup));
        }
        info!("request pump started endpoint={}", self.endpoint);
        let mut received: u64 = 0;
        while !stop.is_stopped() {
            match self.socket.recv_bytes(0) {
                Ok(frame) => {
                    received += 1;
                    if !handle.schedule(EngineEvent::Request(frame)) {
                        warn!("event loop gone, request pump exiting");
                        break;
                    }
                }
                Err(zmq::Error::EAGAIN) => continue,
                Err(zmq::Error::ETERM) => break,
                Err(e) => {
                    error!("request receive failed err={}", e);
                    std::thread::sleep(Duration::from_millis(RECV_TIMEOUT_MS as u64));
                }
            }
        }
        info!("request pump stopped received={}", received);
    }
}
