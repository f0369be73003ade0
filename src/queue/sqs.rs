//! AWS SQS implementation of [`WorkQueue`].

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{Message, MessageSystemAttributeName};
use chrono::DateTime;
use tracing::warn;

use super::{QueueError, QueueItem, ReceiveRequest, WorkQueue};

/// Request all user-defined message attributes.
const ALL_MESSAGE_ATTRIBUTES: &str = "All";

/// Standard SQS queue URL for an account-scoped queue name.
pub fn queue_url(region: &str, account_id: &str, queue_name: &str) -> String {
    format!("https://sqs.{region}.amazonaws.com/{account_id}/{queue_name}")
}

/// SQS-backed work queue bound to a single queue URL.
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    /// Wrap an existing SDK client.
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    /// Build a client from the default AWS credential chain for `region`.
    pub async fn connect(region: impl Into<String>, queue_url: impl Into<String>) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.into()))
            .load()
            .await;
        Self::new(aws_sdk_sqs::Client::new(&sdk_config), queue_url)
    }

    /// The queue this client consumes.
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

/// SQS takes whole seconds as `i32`.
fn secs_i32(duration: std::time::Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

/// Convert an SDK message into a [`QueueItem`].
///
/// Returns `None` when the message has no receipt handle, since such an
/// item could never be acknowledged.
pub(crate) fn to_queue_item(message: &Message) -> Option<QueueItem> {
    let receipt_handle = message.receipt_handle()?.to_owned();
    let attributes = message.attributes();
    let attribute = |name: MessageSystemAttributeName| {
        attributes.and_then(|attrs| attrs.get(&name)).map(String::as_str)
    };

    Some(QueueItem {
        message_id: message.message_id().map(str::to_owned),
        receipt_handle,
        body: message.body().unwrap_or_default().to_owned(),
        receive_count: attribute(MessageSystemAttributeName::ApproximateReceiveCount)
            .and_then(|v| v.parse().ok()),
        sent_at: attribute(MessageSystemAttributeName::SentTimestamp)
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis),
    })
}

#[async_trait]
impl WorkQueue for SqsQueue {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<QueueItem>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .message_system_attribute_names(MessageSystemAttributeName::SentTimestamp)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .message_attribute_names(ALL_MESSAGE_ATTRIBUTES)
            .max_number_of_messages(i32::try_from(request.max_messages).unwrap_or(1))
            .visibility_timeout(secs_i32(request.visibility_timeout))
            .wait_time_seconds(secs_i32(request.wait_time))
            .send()
            .await
            .map_err(|e| QueueError::Receive(DisplayErrorContext(e).to_string()))?;

        Ok(output
            .messages()
            .iter()
            .filter_map(|message| {
                let item = to_queue_item(message);
                if item.is_none() {
                    warn!(
                        message_id = message.message_id().unwrap_or("?"),
                        "skipping SQS message without receipt handle"
                    );
                }
                item
            })
            .collect())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete(DisplayErrorContext(e).to_string()))?;
        Ok(())
    }
}
