//! In-memory doubles for the queue, the handler and the chat sender.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use tgbridge::outbound::handler::{HandlerError, PayloadHandler};
use tgbridge::outbound::payload::OutboundPayload;
use tgbridge::queue::{QueueError, QueueItem, ReceiveRequest, WorkQueue};
use tgbridge::telegram::{ChatMessage, ChatSender, TelegramError};

#[derive(Default)]
struct QueueState {
    visible: VecDeque<QueueItem>,
    in_flight: Vec<QueueItem>,
    deleted: Vec<String>,
    receive_calls: usize,
    delete_calls: usize,
    fail_receives: usize,
    fail_deletes: usize,
}

/// Queue with lease semantics: received items stay in flight until deleted
/// or until the test expires their visibility window.
#[derive(Clone, Default)]
pub struct FakeQueue {
    state: Arc<Mutex<QueueState>>,
}

impl FakeQueue {
    pub fn with_items(items: Vec<QueueItem>) -> Self {
        let queue = Self::default();
        queue.lock().visible.extend(items);
        queue
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().expect("queue state lock")
    }

    pub fn fail_next_receives(&self, n: usize) {
        self.lock().fail_receives = n;
    }

    pub fn fail_next_deletes(&self, n: usize) {
        self.lock().fail_deletes = n;
    }

    /// Visibility timeout elapsed: undeleted items become receivable again.
    pub fn expire_leases(&self) {
        let mut state = self.lock();
        let expired: Vec<QueueItem> = state.in_flight.drain(..).collect();
        for item in expired.into_iter().rev() {
            state.visible.push_front(item);
        }
    }

    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    pub fn in_flight(&self) -> Vec<String> {
        self.lock()
            .in_flight
            .iter()
            .map(|item| item.receipt_handle.clone())
            .collect()
    }

    pub fn receive_calls(&self) -> usize {
        self.lock().receive_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.lock().delete_calls
    }
}

#[async_trait]
impl WorkQueue for FakeQueue {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<QueueItem>, QueueError> {
        let leased = {
            let mut state = self.lock();
            state.receive_calls += 1;
            if state.fail_receives > 0 {
                state.fail_receives -= 1;
                return Err(QueueError::Receive("connection reset by peer".to_owned()));
            }
            let take = usize::try_from(request.max_messages)
                .unwrap_or(1)
                .min(state.visible.len());
            let leased: Vec<QueueItem> = state.visible.drain(..take).collect();
            state.in_flight.extend(leased.iter().cloned());
            leased
        };
        if leased.is_empty() {
            // Long poll on an empty queue.
            tokio::time::sleep(request.wait_time).await;
        }
        Ok(leased)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let mut state = self.lock();
        state.delete_calls += 1;
        if state.fail_deletes > 0 {
            state.fail_deletes -= 1;
            return Err(QueueError::Delete("service unavailable".to_owned()));
        }
        let Some(pos) = state
            .in_flight
            .iter()
            .position(|item| item.receipt_handle == receipt_handle)
        else {
            return Err(QueueError::Delete("receipt handle is invalid".to_owned()));
        };
        state.in_flight.remove(pos);
        state.deleted.push(receipt_handle.to_owned());
        Ok(())
    }
}

/// Handler that records every payload and can reject chosen texts.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    calls: Arc<Mutex<Vec<OutboundPayload>>>,
    failures: Arc<Mutex<usize>>,
    reject_text: Option<String>,
}

impl RecordingHandler {
    pub fn rejecting(text: &str) -> Self {
        Self {
            reject_text: Some(text.to_owned()),
            ..Self::default()
        }
    }

    pub fn fail_next(&self, n: usize) {
        *self.failures.lock().expect("failures lock") = n;
    }

    pub fn calls(&self) -> Vec<OutboundPayload> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl PayloadHandler for RecordingHandler {
    async fn handle(&self, payload: &OutboundPayload) -> Result<(), HandlerError> {
        self.calls.lock().expect("calls lock").push(payload.clone());
        {
            let mut failures = self.failures.lock().expect("failures lock");
            if *failures > 0 {
                *failures -= 1;
                return Err(HandlerError::Rejected("scripted failure".to_owned()));
            }
        }
        if self.reject_text.as_deref() == Some(payload.text.as_str()) {
            return Err(HandlerError::Rejected(payload.text.clone()));
        }
        Ok(())
    }
}

/// Chat sender that records messages and can fail every call with a
/// given Bot API error code.
#[derive(Clone, Default)]
pub struct FakeSender {
    sent: Arc<Mutex<Vec<ChatMessage>>>,
    fail_code: Option<i64>,
}

impl FakeSender {
    pub fn failing(code: i64) -> Self {
        Self {
            fail_code: Some(code),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<ChatMessage> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl ChatSender for FakeSender {
    async fn send_message(&self, message: &ChatMessage) -> Result<(), TelegramError> {
        if let Some(code) = self.fail_code {
            let description = match code {
                400 => "Bad Request: chat not found",
                403 => "Forbidden: bot was kicked from the group chat",
                _ => "Bad Gateway",
            };
            return Err(TelegramError::Api {
                code,
                description: description.to_owned(),
            });
        }
        self.sent.lock().expect("sent lock").push(message.clone());
        Ok(())
    }
}

pub fn item(receipt_handle: &str, body: &str) -> QueueItem {
    QueueItem::new(receipt_handle, body)
}

pub fn valid_item(receipt_handle: &str, chat_id: i64, text: &str) -> QueueItem {
    let body = OutboundPayload::new(chat_id, text)
        .encode()
        .expect("payload encodes");
    QueueItem::new(receipt_handle, body)
}
