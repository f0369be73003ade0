//! Inbound receiver -- long-polls Telegram and hands events to one consumer.
//!
//! The receiver owns the offset [`Cursor`]. For every returned update with
//! `update_id >= cursor` it first advances the cursor to `update_id + 1` and
//! then publishes the event on an mpsc channel. Updates below the cursor are
//! skipped. A crash between the two steps can duplicate an event on the next
//! process run but never skip one.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::retry::{RetryPolicy, INBOUND_RETRY_DELAY};
use crate::telegram::{InboundEvent, UpdateSource};

/// Default long-poll timeout for `getUpdates`.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Capacity of the receiver -> consumer handoff. Kept minimal so a slow
/// consumer stalls polling instead of buffering.
pub const HANDOFF_CAPACITY: usize = 1;

/// Smallest update id not yet accepted for delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(i64);

impl Cursor {
    /// Start from an explicit offset.
    pub const fn new(offset: i64) -> Self {
        Self(offset)
    }

    /// Offset to send with the next `getUpdates` call.
    pub const fn offset(self) -> i64 {
        self.0
    }

    /// Accept `update_id` if it is at or past the cursor, advancing the
    /// cursor past it. Returns `false` (cursor untouched) for stale ids.
    pub fn accept(&mut self, update_id: i64) -> bool {
        if update_id < self.0 {
            return false;
        }
        self.0 = update_id.saturating_add(1);
        true
    }
}

/// Receiver loop states.
#[derive(Debug)]
pub enum ReceiverState {
    /// Issue the next long-poll.
    Polling,
    /// Publish a freshly polled batch, in platform order.
    Dispatching(Vec<InboundEvent>),
    /// Sleep after a failed poll.
    Backoff,
    /// The consumer went away; the loop is done.
    Closed,
}

/// Long-poll receiver for chat events.
pub struct InboundReceiver<S> {
    source: S,
    poll_timeout: Duration,
    retry: RetryPolicy,
    cursor: Cursor,
}

impl<S: UpdateSource> InboundReceiver<S> {
    /// Create a receiver starting at offset 0.
    pub fn new(source: S, poll_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            source,
            poll_timeout,
            retry,
            cursor: Cursor::default(),
        }
    }

    /// Receiver with the default 3 second retry delay.
    pub fn with_default_retry(source: S, poll_timeout: Duration) -> Self {
        Self::new(source, poll_timeout, RetryPolicy::fixed(INBOUND_RETRY_DELAY))
    }

    /// Start from a specific cursor instead of 0.
    #[must_use]
    pub fn starting_at(mut self, cursor: Cursor) -> Self {
        self.cursor = cursor;
        self
    }

    /// Current cursor.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Perform one state transition.
    pub async fn step(
        &mut self,
        state: ReceiverState,
        tx: &mpsc::Sender<InboundEvent>,
    ) -> ReceiverState {
        match state {
            ReceiverState::Polling => {
                match self
                    .source
                    .get_updates(self.cursor.offset(), self.poll_timeout)
                    .await
                {
                    Ok(events) => ReceiverState::Dispatching(events),
                    Err(e) => {
                        error!(
                            error = %e,
                            offset = self.cursor.offset(),
                            retry_in_ms = self.retry.delay().as_millis(),
                            "failed to get updates, retrying"
                        );
                        ReceiverState::Backoff
                    }
                }
            }
            ReceiverState::Dispatching(events) => self.dispatch(events, tx).await,
            ReceiverState::Backoff => {
                self.retry.wait().await;
                ReceiverState::Polling
            }
            ReceiverState::Closed => ReceiverState::Closed,
        }
    }

    async fn dispatch(
        &mut self,
        events: Vec<InboundEvent>,
        tx: &mpsc::Sender<InboundEvent>,
    ) -> ReceiverState {
        for event in events {
            let update_id = event.update_id;
            if !self.cursor.accept(update_id) {
                debug!(
                    update_id,
                    offset = self.cursor.offset(),
                    "skipping already-seen update"
                );
                continue;
            }
            if tx.send(event).await.is_err() {
                info!(update_id, "consumer channel closed, stopping receiver");
                return ReceiverState::Closed;
            }
        }
        ReceiverState::Polling
    }

    /// Poll forever. Returns only once every consumer handle is dropped.
    pub async fn run(mut self, tx: mpsc::Sender<InboundEvent>) -> Cursor {
        info!(
            poll_timeout_secs = self.poll_timeout.as_secs(),
            offset = self.cursor.offset(),
            "inbound receiver starting"
        );
        let mut state = ReceiverState::Polling;
        loop {
            state = self.step(state, &tx).await;
            if matches!(state, ReceiverState::Closed) {
                return self.cursor;
            }
        }
    }
}

/// Spawn `receiver` on its own task and return the consumer end.
pub fn spawn<S>(
    receiver: InboundReceiver<S>,
    capacity: usize,
) -> (JoinHandle<Cursor>, mpsc::Receiver<InboundEvent>)
where
    S: UpdateSource + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(receiver.run(tx));
    (handle, rx)
}

/// Drain events into `on_event` until the producer stops.
pub async fn consume<F>(mut rx: mpsc::Receiver<InboundEvent>, mut on_event: F) -> usize
where
    F: FnMut(InboundEvent),
{
    let mut handled: usize = 0;
    while let Some(event) = rx.recv().await {
        on_event(event);
        handled = handled.saturating_add(1);
    }
    handled
}

/// Default consumer: record the event in the log.
pub fn log_event(event: &InboundEvent) {
    info!(
        update_id = event.update_id,
        kind = event.kind().unwrap_or("unknown"),
        chat_id = event.chat_id(),
        text = event.text(),
        "received update"
    );
    debug!(payload = %serde_json::Value::Object(event.payload.clone()), "update payload");
}
