//! Fixed-interval backoff shared by both loops.
//!
//! Every transient failure is retried forever after the same delay; there
//! is no attempt counter and no escalation.

use std::time::Duration;

use tracing::debug;

/// Default delay after a failed `getUpdates` poll.
pub const INBOUND_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Default delay after any failed outbound stage.
pub const OUTBOUND_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Fixed backoff between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    delay: Duration,
}

impl RetryPolicy {
    /// Retry after a constant `delay`.
    pub const fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    /// The delay applied before each retry.
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleep for the backoff interval. Blocks only the calling loop.
    pub async fn wait(&self) {
        debug!(delay_ms = self.delay.as_millis(), "backing off");
        tokio::time::sleep(self.delay).await;
    }
}
