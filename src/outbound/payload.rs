//! Versioned contract for queue item bodies.
//!
//! ```json
//! {"version": 1, "chat_id": -1001234567890, "text": "hello"}
//! ```
//!
//! `version` may be omitted. Older producers send `GroupID` / `Message`;
//! those names are accepted as aliases.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::telegram::ChatMessage;

/// Current payload contract version.
pub const PAYLOAD_VERSION: u32 = 1;

/// Why a queue body could not be turned into a payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Body is not valid JSON for the contract.
    #[error("invalid payload JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Body declares a version this build does not understand.
    #[error("unsupported payload version {0} (expected {PAYLOAD_VERSION})")]
    UnsupportedVersion(u32),
    /// Text is empty or whitespace; Telegram rejects those.
    #[error("payload text is empty")]
    EmptyText,
}

/// A chat delivery request read from the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPayload {
    /// Contract version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Destination chat id.
    #[serde(alias = "group_id", alias = "GroupID")]
    pub chat_id: i64,
    /// Message text.
    #[serde(alias = "message", alias = "Message")]
    pub text: String,
}

fn default_version() -> u32 {
    PAYLOAD_VERSION
}

impl OutboundPayload {
    /// Current-version payload.
    pub fn new(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            version: PAYLOAD_VERSION,
            chat_id,
            text: text.into(),
        }
    }

    /// Parse and validate a raw queue body.
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] for malformed JSON, an unknown version,
    /// or empty text.
    pub fn decode(body: &str) -> Result<Self, PayloadError> {
        let payload: Self = serde_json::from_str(body)?;
        if payload.version != PAYLOAD_VERSION {
            return Err(PayloadError::UnsupportedVersion(payload.version));
        }
        if payload.text.trim().is_empty() {
            return Err(PayloadError::EmptyText);
        }
        Ok(payload)
    }

    /// Serialize for a producer.
    ///
    /// # Errors
    ///
    /// Only fails if serde_json does.
    pub fn encode(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The chat message this payload asks for.
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            chat_id: self.chat_id,
            text: self.text.clone(),
        }
    }
}
