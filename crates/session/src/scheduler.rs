//! Cooperative yielding between lazy chunks

use async_trait::async_trait;
use std::time::Duration;

/// Yield point used by the lazy restore phase
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Give other work a chance to run
    async fn yield_now(&self);
}

/// Yields to the tokio runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn yield_now(&self) {
        tokio::task::yield_now().await;
    }
}

/// Sleeps for a fixed interval, e.g. one frame
#[derive(Debug, Clone, Copy)]
pub struct SleepScheduler(pub Duration);

impl SleepScheduler {
    /// Roughly one 60 Hz frame
    pub fn frame() -> Self {
        SleepScheduler(Duration::from_millis(16))
    }
}

#[async_trait]
impl Scheduler for SleepScheduler {
    async fn yield_now(&self) {
        tokio::time::sleep(self.0).await;
    }
}

/// Never yields
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScheduler;

#[async_trait]
impl Scheduler for NoopScheduler {
    async fn yield_now(&self) {}
}
