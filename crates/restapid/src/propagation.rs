//! Waits between dependent table writes.
//!
//! Downstream agents consume table changes asynchronously. Where one write
//! must be observed before the next becomes visible (VLAN binding before
//! its prefix, prefix removal before unbinding), the sequencer calls
//! [`PropagationWait::wait`] between the two writes.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Default pause between dependent writes.
pub const DEFAULT_PROPAGATION_INTERVAL: Duration = Duration::from_secs(1);

#[async_trait]
pub trait PropagationWait: Send + Sync {
    /// Blocks until the previous write is assumed to be observed.
    /// `step` names the write about to happen.
    async fn wait(&self, step: &str);
}

/// Fixed-interval wait. Not cancellable.
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval {
    interval: Duration,
}

impl FixedInterval {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for FixedInterval {
    fn default() -> Self {
        Self::new(DEFAULT_PROPAGATION_INTERVAL)
    }
}

#[async_trait]
impl PropagationWait for FixedInterval {
    async fn wait(&self, step: &str) {
        if self.interval.is_zero() {
            return;
        }
        debug!(step, interval_ms = self.interval.as_millis() as u64, "Waiting for propagation");
        tokio::time::sleep(self.interval).await;
    }
}
