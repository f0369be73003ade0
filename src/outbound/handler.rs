//! Payload handler capability.
//!
//! The bridge does not send messages itself; it hands each decoded payload
//! to a [`PayloadHandler`]. Handlers may run more than once for the same
//! logical item when the queue redelivers it.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error};

use super::payload::OutboundPayload;
use crate::telegram::{ChatSender, TelegramError};

/// Handler failure. Any error leaves the queue item for redelivery.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The chat send failed.
    #[error("failed to send chat message: {0}")]
    Send(TelegramError),
    /// The payload was refused outright, e.g. Telegram answered 400
    /// "chat not found" or 403 "bot was blocked". Redelivery will not help
    /// until the chat or bot changes, but the item is still kept.
    #[error("payload rejected: {0}")]
    Rejected(String),
}

impl From<TelegramError> for HandlerError {
    fn from(e: TelegramError) -> Self {
        match e {
            TelegramError::Api {
                code: 400 | 403,
                description,
            } => Self::Rejected(description),
            other => Self::Send(other),
        }
    }
}

/// Turns a payload into its side effect.
#[async_trait]
pub trait PayloadHandler: Send + Sync {
    /// Handle one payload. `Ok` means the item may be acknowledged.
    async fn handle(&self, payload: &OutboundPayload) -> Result<(), HandlerError>;
}

#[async_trait]
impl<T: PayloadHandler + ?Sized> PayloadHandler for Arc<T> {
    async fn handle(&self, payload: &OutboundPayload) -> Result<(), HandlerError> {
        (**self).handle(payload).await
    }
}

/// Default handler: send the payload as a Telegram message.
#[derive(Debug, Clone)]
pub struct TelegramSendHandler<S> {
    sender: S,
}

impl<S: ChatSender> TelegramSendHandler<S> {
    /// Wrap a chat sender.
    pub fn new(sender: S) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl<S: ChatSender> PayloadHandler for TelegramSendHandler<S> {
    async fn handle(&self, payload: &OutboundPayload) -> Result<(), HandlerError> {
        let message = payload.to_chat_message();
        if let Err(e) = self.sender.send_message(&message).await {
            error!(
                error = %e,
                chat_id = payload.chat_id,
                text = %payload.text,
                "failed to send message to chat"
            );
            return Err(e.into());
        }
        debug!(chat_id = payload.chat_id, "payload delivered");
        Ok(())
    }
}
