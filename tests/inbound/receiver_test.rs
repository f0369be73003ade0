//! Tests for the inbound receiver: cursor handling, skip rule, backoff.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use tgbridge::inbound::{self, Cursor, InboundReceiver, ReceiverState};
use tgbridge::retry::RetryPolicy;
use tgbridge::telegram::{InboundEvent, TelegramError, UpdateSource};

const POLL_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY: Duration = Duration::from_secs(3);

/// Scripted `getUpdates`: replays queued responses, then either long-polls
/// empty or keeps failing.
#[derive(Clone, Default)]
struct ScriptedSource {
    responses: Arc<Mutex<VecDeque<Result<Vec<i64>, ()>>>>,
    offsets: Arc<Mutex<Vec<i64>>>,
    fail_when_exhausted: bool,
}

impl ScriptedSource {
    fn new(responses: Vec<Result<Vec<i64>, ()>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            ..Self::default()
        }
    }

    fn always_failing() -> Self {
        Self {
            fail_when_exhausted: true,
            ..Self::default()
        }
    }

    fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().expect("offsets lock").clone()
    }
}

fn event(update_id: i64) -> InboundEvent {
    let mut payload = serde_json::Map::new();
    payload.insert(
        "message".to_owned(),
        serde_json::json!({"chat": {"id": 1}, "text": format!("update {update_id}")}),
    );
    InboundEvent::new(update_id, payload)
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<InboundEvent>, TelegramError> {
        self.offsets.lock().expect("offsets lock").push(offset);
        let next = self.responses.lock().expect("responses lock").pop_front();
        match next {
            Some(Ok(ids)) => Ok(ids.into_iter().map(event).collect()),
            Some(Err(())) => Err(TelegramError::Api {
                code: 502,
                description: "Bad Gateway".to_owned(),
            }),
            None if self.fail_when_exhausted => Err(TelegramError::Api {
                code: 502,
                description: "Bad Gateway".to_owned(),
            }),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
        }
    }
}

fn receiver(source: ScriptedSource) -> InboundReceiver<ScriptedSource> {
    InboundReceiver::new(source, POLL_TIMEOUT, RetryPolicy::fixed(RETRY))
}

fn drain(rx: &mut mpsc::Receiver<InboundEvent>) -> Vec<i64> {
    let mut ids = Vec::new();
    while let Ok(event) = rx.try_recv() {
        ids.push(event.update_id);
    }
    ids
}

#[tokio::test]
async fn dispatches_batch_and_advances_cursor() {
    let source = ScriptedSource::new(vec![Ok(vec![5, 6])]);
    let mut receiver = receiver(source).starting_at(Cursor::new(5));
    let (tx, mut rx) = mpsc::channel(8);

    let state = receiver.step(ReceiverState::Polling, &tx).await;
    assert!(matches!(state, ReceiverState::Dispatching(ref events) if events.len() == 2));

    let state = receiver.step(state, &tx).await;
    assert!(matches!(state, ReceiverState::Polling));
    assert_eq!(drain(&mut rx), vec![5, 6]);
    assert_eq!(receiver.cursor(), Cursor::new(7));
}

#[tokio::test]
async fn events_below_cursor_are_not_redispatched() {
    let source = ScriptedSource::new(vec![Ok(vec![8, 9, 10, 11])]);
    let mut receiver = receiver(source).starting_at(Cursor::new(10));
    let (tx, mut rx) = mpsc::channel(8);

    let state = receiver.step(ReceiverState::Polling, &tx).await;
    receiver.step(state, &tx).await;

    assert_eq!(drain(&mut rx), vec![10, 11]);
    assert_eq!(receiver.cursor().offset(), 12);
}

#[tokio::test]
async fn redelivered_batch_is_skipped_entirely() {
    let source = ScriptedSource::new(vec![Ok(vec![1, 2]), Ok(vec![1, 2])]);
    let mut receiver = receiver(source);
    let (tx, mut rx) = mpsc::channel(8);

    for _ in 0..2 {
        let state = receiver.step(ReceiverState::Polling, &tx).await;
        receiver.step(state, &tx).await;
    }

    assert_eq!(drain(&mut rx), vec![1, 2]);
    assert_eq!(receiver.cursor().offset(), 3);
}

#[tokio::test]
async fn cursor_is_last_id_plus_one_for_increasing_ids() {
    let batches = vec![vec![1_i64], vec![2, 3, 7], vec![8], vec![20, 21]];
    let source = ScriptedSource::new(batches.iter().cloned().map(Ok).collect());
    let mut receiver = receiver(source);
    let (tx, mut rx) = mpsc::channel(16);

    let mut dispatched = Vec::new();
    for batch in &batches {
        let state = receiver.step(ReceiverState::Polling, &tx).await;
        receiver.step(state, &tx).await;
        dispatched.extend(drain(&mut rx));
        let last = *batch.last().expect("non-empty batch");
        assert_eq!(receiver.cursor().offset(), last + 1);
    }
    assert_eq!(dispatched, vec![1, 2, 3, 7, 8, 20, 21]);
}

#[tokio::test]
async fn each_poll_sends_current_offset() {
    let source = ScriptedSource::new(vec![Ok(vec![41, 42]), Ok(vec![43])]);
    let mut receiver = receiver(source.clone());
    let (tx, _rx) = mpsc::channel(8);

    for _ in 0..2 {
        let state = receiver.step(ReceiverState::Polling, &tx).await;
        receiver.step(state, &tx).await;
    }
    assert_eq!(source.offsets(), vec![0, 43]);
}

#[tokio::test(start_paused = true)]
async fn poll_failure_backs_off_then_polls_again() {
    let source = ScriptedSource::new(vec![Err(()), Ok(vec![3])]);
    let mut receiver = receiver(source.clone());
    let (tx, mut rx) = mpsc::channel(8);

    let state = receiver.step(ReceiverState::Polling, &tx).await;
    assert!(matches!(state, ReceiverState::Backoff));
    assert_eq!(receiver.cursor().offset(), 0, "failure never moves the cursor");

    let start = tokio::time::Instant::now();
    let state = receiver.step(state, &tx).await;
    assert!(matches!(state, ReceiverState::Polling));
    assert!(start.elapsed() >= RETRY);

    let state = receiver.step(state, &tx).await;
    receiver.step(state, &tx).await;
    assert_eq!(drain(&mut rx), vec![3]);
    assert_eq!(source.offsets(), vec![0, 0]);
}

#[tokio::test(start_paused = true)]
async fn keeps_retrying_under_repeated_poll_failures() {
    let source = ScriptedSource::always_failing();
    let (tx, _rx) = mpsc::channel(1);

    let outcome =
        tokio::time::timeout(Duration::from_secs(60), receiver(source.clone()).run(tx)).await;

    assert!(outcome.is_err(), "receiver must not exit on poll failures");
    assert!(source.offsets().len() >= 20);
}

#[tokio::test]
async fn run_stops_when_consumer_is_gone() {
    let source = ScriptedSource::new(vec![Ok(vec![1, 2, 3])]);
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let cursor = receiver(source).run(tx).await;
    // The cursor moves before the publish attempt.
    assert_eq!(cursor.offset(), 2);
}

#[tokio::test(start_paused = true)]
async fn spawned_receiver_feeds_single_consumer_in_order() {
    let source = ScriptedSource::new(vec![Err(()), Ok(vec![1, 2]), Ok(vec![2, 3])]);
    let (handle, mut rx) = inbound::spawn(receiver(source), inbound::HANDOFF_CAPACITY);

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let event = tokio::time::timeout(Duration::from_secs(120), rx.recv())
            .await
            .expect("event within timeout")
            .expect("channel open");
        seen.push(event.update_id);
    }
    handle.abort();

    assert_eq!(seen, vec![1, 2, 3]);
}

#[tokio::test]
async fn consume_counts_until_channel_closes() {
    let (tx, rx) = mpsc::channel(4);
    for id in [1, 2, 3] {
        tx.send(event(id)).await.expect("send");
    }
    drop(tx);

    let mut ids = Vec::new();
    let handled = inbound::consume(rx, |e| ids.push(e.update_id)).await;
    assert_eq!(handled, 3);
    assert_eq!(ids, vec![1, 2, 3]);
}
