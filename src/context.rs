//! Process context created once at startup and handed to every component.

use crate::clock::Clock;
use crate::config::GatewayConfig;
use crate::scheduler::{EventReceiver, LoopHandle, StopFlag};
use std::sync::Arc;

#[derive(Clone)]
pub struct GatewayContext {
    pub config: Arc<GatewayConfig>,
    pub clock: Arc<dyn Clock>,
    pub handle: LoopHandle,
    pub stop: StopFlag,
}

impl GatewayContext {
    /// New context plus the receiving end of its event loop.
    pub fn new(config: GatewayConfig, clock: Arc<dyn Clock>) -> (Self, EventReceiver) {
        let (handle, events) = LoopHandle::channel();
        let ctx = Self {
            config: Arc::new(config),
            clock,
            handle,
            stop: StopFlag::new(),
        };
        (ctx, events)
    }
}
