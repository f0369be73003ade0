//! Durable work queue abstraction.
//!
//! The outbound bridge only needs two operations from the queue: lease a
//! batch of items for a visibility window, and delete an item by its
//! receipt handle. [`sqs::SqsQueue`] implements them on AWS SQS.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod sqs;

pub use sqs::SqsQueue;

/// Maximum number of items leased per receive call.
pub const DEFAULT_MAX_MESSAGES: u32 = 1;

/// How long a received item stays invisible to other consumers.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(60);

/// Long-poll wait for a receive call.
pub const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(20);

/// Queue client errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The receive call failed.
    #[error("failed to receive messages: {0}")]
    Receive(String),
    /// The delete (acknowledge) call failed.
    #[error("failed to delete message: {0}")]
    Delete(String),
}

/// A leased queue item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    /// Queue-assigned message id.
    pub message_id: Option<String>,
    /// Lease token; required to delete the item.
    pub receipt_handle: String,
    /// Opaque serialized payload.
    pub body: String,
    /// How many times the queue has handed this item out.
    pub receive_count: Option<u32>,
    /// When the producer enqueued the item.
    pub sent_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// Item with just a receipt handle and body.
    pub fn new(receipt_handle: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: None,
            receipt_handle: receipt_handle.into(),
            body: body.into(),
            receive_count: None,
            sent_at: None,
        }
    }
}

/// Parameters of a single receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// Upper bound on items returned.
    pub max_messages: u32,
    /// Lease duration for returned items.
    pub visibility_timeout: Duration,
    /// Long-poll wait when the queue is empty.
    pub wait_time: Duration,
}

impl Default for ReceiveRequest {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            wait_time: DEFAULT_WAIT_TIME,
        }
    }
}

/// A queue that hands out leased items and accepts acknowledgements.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Lease up to `request.max_messages` items.
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<QueueItem>, QueueError>;

    /// Acknowledge (delete) a leased item.
    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError>;
}

#[async_trait]
impl<T: WorkQueue + ?Sized> WorkQueue for Arc<T> {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<QueueItem>, QueueError> {
        (**self).receive(request).await
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        (**self).delete(receipt_handle).await
    }
}
