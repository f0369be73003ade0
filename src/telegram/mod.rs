//! Telegram Bot API surface used by both loops.
//!
//! Defines the two capabilities the core needs from the chat platform:
//! - [`UpdateSource`] -- long-poll `getUpdates` from a given offset
//! - [`ChatSender`] -- deliver a [`ChatMessage`] via `sendMessage`
//!
//! [`client::TelegramClient`] implements both over plain HTTP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod client;

pub use client::TelegramClient;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Telegram client errors.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// The Bot API answered with `ok: false`.
    #[error("Telegram API error ({code}): {description}")]
    Api {
        /// Telegram `error_code`, or 0 when absent.
        code: i64,
        /// Telegram `description`.
        description: String,
    },
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// JSON (de)serialization failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single update returned by `getUpdates`.
///
/// Only `update_id` is interpreted; everything else is carried opaquely
/// for the downstream consumer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InboundEvent {
    /// Monotonic update identifier assigned by Telegram.
    pub update_id: i64,
    /// Remaining fields of the update object (`message`, `callback_query`, ...).
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl InboundEvent {
    /// Build an event from an id and an opaque payload.
    pub fn new(update_id: i64, payload: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { update_id, payload }
    }

    /// Update kind, i.e. the name of the first payload field (`"message"`).
    pub fn kind(&self) -> Option<&str> {
        self.payload.keys().next().map(String::as_str)
    }

    /// Chat the update belongs to, when it carries a message.
    pub fn chat_id(&self) -> Option<i64> {
        self.message()?.get("chat")?.get("id")?.as_i64()
    }

    /// Message text, when present.
    pub fn text(&self) -> Option<&str> {
        self.message()?.get("text")?.as_str()
    }

    fn message(&self) -> Option<&serde_json::Value> {
        self.payload
            .get("message")
            .or_else(|| self.payload.get("edited_message"))
            .or_else(|| self.payload.get("channel_post"))
    }
}

/// An outgoing chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Destination chat (user, group or channel id).
    pub chat_id: i64,
    /// Message text.
    pub text: String,
}

/// The bot account behind a token, as reported by `getMe`.
#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    /// Bot user id.
    pub id: i64,
    /// Display name.
    pub first_name: String,
    /// `@username`, without the `@`.
    pub username: Option<String>,
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Long-poll source of inbound chat events.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetch updates with `update_id >= offset`, waiting up to `timeout`.
    async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<InboundEvent>, TelegramError>;
}

/// Outbound chat delivery.
#[async_trait]
pub trait ChatSender: Send + Sync {
    /// Send a single message.
    async fn send_message(&self, message: &ChatMessage) -> Result<(), TelegramError>;
}

#[async_trait]
impl<T: UpdateSource + ?Sized> UpdateSource for Arc<T> {
    async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<InboundEvent>, TelegramError> {
        (**self).get_updates(offset, timeout).await
    }
}

#[async_trait]
impl<T: ChatSender + ?Sized> ChatSender for Arc<T> {
    async fn send_message(&self, message: &ChatMessage) -> Result<(), TelegramError> {
        (**self).send_message(message).await
    }
}
