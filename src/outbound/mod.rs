//! Outbound bridge -- drains the work queue into chat messages.
//!
//! One item is in flight at a time. An item is deleted only after its
//! handler succeeded; every failure (receive, decode, handle, delete) backs
//! off and leaves the item leased so the queue redelivers it once the
//! visibility timeout expires. Malformed bodies are never dropped. Entering
//! backoff also releases the rest of a multi-item batch, so no item is
//! handled after its lease has lapsed.

use std::collections::VecDeque;

use tracing::{error, info, info_span, warn, Instrument};

use crate::queue::{QueueItem, ReceiveRequest, WorkQueue};
use crate::retry::{RetryPolicy, OUTBOUND_RETRY_DELAY};

pub mod handler;
pub mod payload;

use handler::PayloadHandler;
use payload::OutboundPayload;

/// Bridge loop states.
#[derive(Debug)]
pub enum BridgeState {
    /// Lease the next batch from the queue.
    Receiving,
    /// Decode a leased item's body.
    Deserializing(QueueItem),
    /// Run the handler on a decoded payload.
    Handling {
        /// The leased item.
        item: QueueItem,
        /// Its decoded body.
        payload: OutboundPayload,
    },
    /// Delete a handled item.
    Acknowledging(QueueItem),
    /// Sleep after any failed stage.
    Backoff,
}

/// Sequential queue consumer.
pub struct OutboundBridge<Q, H> {
    queue: Q,
    handler: H,
    request: ReceiveRequest,
    retry: RetryPolicy,
    pending: VecDeque<QueueItem>,
}

impl<Q: WorkQueue, H: PayloadHandler> OutboundBridge<Q, H> {
    /// Create a bridge over `queue` that feeds `handler`.
    pub fn new(queue: Q, handler: H, request: ReceiveRequest, retry: RetryPolicy) -> Self {
        Self {
            queue,
            handler,
            request,
            retry,
            pending: VecDeque::new(),
        }
    }

    /// Bridge with default receive parameters and a 60 second backoff.
    pub fn with_defaults(queue: Q, handler: H) -> Self {
        Self::new(
            queue,
            handler,
            ReceiveRequest::default(),
            RetryPolicy::fixed(OUTBOUND_RETRY_DELAY),
        )
    }

    /// Items received but not yet processed.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn next_item(&mut self) -> BridgeState {
        match self.pending.pop_front() {
            Some(item) => BridgeState::Deserializing(item),
            None => BridgeState::Receiving,
        }
    }

    /// Enter backoff. Items still pending from the current batch are released
    /// locally: their leases would run out during the sleep, so they are left
    /// for the queue to redeliver.
    fn back_off(&mut self) -> BridgeState {
        if !self.pending.is_empty() {
            warn!(
                released = self.pending.len(),
                "releasing unprocessed batch items for redelivery"
            );
            self.pending.clear();
        }
        BridgeState::Backoff
    }

    /// Perform one state transition.
    pub async fn step(&mut self, state: BridgeState) -> BridgeState {
        match state {
            BridgeState::Receiving => match self.queue.receive(&self.request).await {
                Ok(items) => {
                    self.pending.extend(items);
                    self.next_item()
                }
                Err(e) => {
                    error!(error = %e, "failed to receive messages");
                    self.back_off()
                }
            },
            BridgeState::Deserializing(item) => {
                info!(
                    message_id = item.message_id.as_deref(),
                    receive_count = item.receive_count,
                    "received on queue"
                );
                match OutboundPayload::decode(&item.body) {
                    Ok(payload) => BridgeState::Handling { item, payload },
                    Err(e) => {
                        error!(
                            error = %e,
                            body = %item.body,
                            receipt_handle = %item.receipt_handle,
                            receive_count = item.receive_count,
                            "failed to parse payload, leaving for redelivery"
                        );
                        self.back_off()
                    }
                }
            }
            BridgeState::Handling { item, payload } => {
                let span = info_span!(
                    "handle_payload",
                    receipt_handle = %item.receipt_handle,
                    chat_id = payload.chat_id,
                );
                match self.handler.handle(&payload).instrument(span).await {
                    Ok(()) => BridgeState::Acknowledging(item),
                    Err(e) => {
                        error!(
                            error = %e,
                            receipt_handle = %item.receipt_handle,
                            "failed to handle message"
                        );
                        self.back_off()
                    }
                }
            }
            BridgeState::Acknowledging(item) => {
                match self.queue.delete(&item.receipt_handle).await {
                    Ok(()) => {
                        info!(receipt_handle = %item.receipt_handle, "message acknowledged");
                        self.next_item()
                    }
                    Err(e) => {
                        error!(
                            error = %e,
                            receipt_handle = %item.receipt_handle,
                            "failed to delete message, it will be redelivered"
                        );
                        self.back_off()
                    }
                }
            }
            BridgeState::Backoff => {
                self.retry.wait().await;
                BridgeState::Receiving
            }
        }
    }

    /// Run forever.
    pub async fn run(mut self) {
        info!(
            max_messages = self.request.max_messages,
            visibility_timeout_secs = self.request.visibility_timeout.as_secs(),
            wait_time_secs = self.request.wait_time.as_secs(),
            "beginning queue loop"
        );
        let mut state = BridgeState::Receiving;
        loop {
            state = self.step(state).await;
        }
    }
}
