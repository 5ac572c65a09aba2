//! Event-loop plumbing: the handoff channel into the loop, the stop flag, periodic jobs and
//! one-shot broker calls.
//!
//! All engine state lives on the loop. Anything running elsewhere (transport threads,
//! adapter callbacks, timers, spawned broker calls) talks to it only through [`LoopHandle`].

use crate::broker::{BrokerEvent, OrderLocator};
use crate::engine::HealthReport;
use crate::error::BrokerError;
use log::{debug, error, info};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Periodic reconciliation jobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Job {
    ResyncOrders,
    ResyncHoldings,
    ResyncBalance,
    SweepExpired,
    Snapshot,
}

/// Work handed to the event loop.
#[derive(Debug)]
pub enum EngineEvent {
    /// Raw request frame from the transport.
    Request(Vec<u8>),
    Broker(BrokerEvent),
    Job(Job),
    Health(oneshot::Sender<HealthReport>),
    Shutdown,
}

pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Thread-safe "schedule onto loop" handle. Clone freely; usable from non-runtime threads.
#[derive(Clone, Debug)]
pub struct LoopHandle {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl LoopHandle {
    pub fn channel() -> (LoopHandle, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (LoopHandle { tx }, rx)
    }

    /// Queue `event` for the loop. False once the loop has gone away.
    pub fn schedule(&self, event: EngineEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn broker_event(&self, event: BrokerEvent) -> bool {
        self.schedule(EngineEvent::Broker(event))
    }

    /// Run a broker call off the loop. A failure comes back as one broker error event per
    /// entry of `orders` (or a single unlocated event when `orders` is empty), which the
    /// engine turns into `ON_ERROR`.
    pub fn spawn_broker_call<F>(
        &self,
        call: &'static str,
        orders: Vec<OrderLocator>,
        fut: F,
    ) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), BrokerError>> + Send + 'static,
    {
        let handle = self.clone();
        tokio::spawn(async move {
            if let Err(e) = fut.await {
                error!("broker call failed call={} orders={:?} err={}", call, orders, e);
                if orders.is_empty() {
                    handle.broker_event(BrokerEvent::Error {
                        kind: e.kind,
                        message: e.message,
                        locator: None,
                    });
                    return;
                }
                for locator in orders {
                    handle.broker_event(BrokerEvent::Error {
                        kind: e.kind,
                        message: e.message.clone(),
                        locator: Some(locator),
                    });
                }
            }
        })
    }

    /// Run a broker query off the loop and feed its result back as an event. Failures are logged.
    pub fn spawn_query<F>(&self, call: &'static str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<BrokerEvent, BrokerError>> + Send + 'static,
    {
        let handle = self.clone();
        tokio::spawn(async move {
            match fut.await {
                Ok(event) => {
                    handle.broker_event(event);
                }
                Err(e) => error!("broker query failed call={} err={}", call, e),
            }
        })
    }
}

/// Process-wide stop flag; periodic loops check it at each iteration boundary.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Owns the periodic job timers.
pub struct Scheduler {
    handle: LoopHandle,
    stop: StopFlag,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(handle: LoopHandle, stop: StopFlag) -> Self {
        Self {
            handle,
            stop,
            tasks: Vec::new(),
        }
    }

    /// Queue `job` every `period`, first run immediately.
    pub fn every(&mut self, period: Duration, job: Job) {
        let handle = self.handle.clone();
        let stop = self.stop.clone();
        let period = period.max(Duration::from_millis(1));
        info!("periodic job scheduled job={:?} period={:?}", job, period);
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if stop.is_stopped() || !handle.schedule(EngineEvent::Job(job)) {
                    debug!("periodic job stopped job={:?}", job);
                    break;
                }
            }
        }));
    }

    /// One-shot task. Errors are logged, never propagated.
    pub fn spawn<F>(&mut self, name: &'static str, fut: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = fut.await {
                error!("task failed name={} err={:#}", name, e);
            }
        }));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Set the stop flag, then cancel and reap every task. Timers mid-sleep do not hold
    /// shutdown up for a full period.
    pub async fn shutdown(self) {
        self.stop.stop();
        info!("scheduler stopping tasks={}", self.tasks.len());
        for task in self.tasks {
            task.abort();
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_delivers_from_foreign_thread() {
        let (handle, mut rx) = LoopHandle::channel();
        let remote = handle.clone();
        std::thread::spawn(move || {
            remote.schedule(EngineEvent::Job(Job::Snapshot));
        })
        .join()
        .unwrap();
        assert!(matches!(rx.recv().await, Some(EngineEvent::Job(Job::Snapshot))));
    }

    #[tokio::test]
    async fn periodic_job_stops_on_flag() {
        let (handle, mut rx) = LoopHandle::channel();
        let stop = StopFlag::new();
        let mut scheduler = Scheduler::new(handle, stop.clone());
        scheduler.every(Duration::from_millis(5), Job::SweepExpired);
        assert!(matches!(rx.recv().await, Some(EngineEvent::Job(Job::SweepExpired))));
        assert!(matches!(rx.recv().await, Some(EngineEvent::Job(Job::SweepExpired))));
        scheduler.shutdown().await;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_broker_call_reports_error_event() {
        let (handle, mut rx) = LoopHandle::channel();
        let task = handle.spawn_broker_call(
            "send_limit_order",
            vec![OrderLocator::Strategy("s1".into())],
            async { Err(BrokerError::new(crate::error::ErrorKind::InsufficientFunds, "no cash")) },
        );
        task.await.unwrap();
        match rx.recv().await {
            Some(EngineEvent::Broker(BrokerEvent::Error { kind, locator, .. })) => {
                assert_eq!(kind, crate::error::ErrorKind::InsufficientFunds);
                assert_eq!(locator, Some(OrderLocator::Strategy("s1".into())));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_batch_call_reports_every_order() {
        let (handle, mut rx) = LoopHandle::channel();
        let orders = vec![OrderLocator::Strategy("c1".into()), OrderLocator::Strategy("c2".into())];
        let task = handle.spawn_broker_call("send_orders_in_batch", orders.clone(), async {
            Err(BrokerError::new(crate::error::ErrorKind::InsufficientFunds, "no cash"))
        });
        task.await.unwrap();
        let mut located = Vec::new();
        while let Ok(EngineEvent::Broker(BrokerEvent::Error { locator, .. })) = rx.try_recv() {
            located.push(locator);
        }
        assert_eq!(located, orders.into_iter().map(Some).collect::<Vec<_>>());
    }
}
