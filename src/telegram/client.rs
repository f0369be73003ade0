//! HTTP client for the Telegram Bot API.
//!
//! Talks to `getMe`, `getUpdates` and `sendMessage` with `reqwest`.
//! The underlying `reqwest::Client` is reference-counted, so a single
//! [`TelegramClient`] can be cloned into both loops.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{BotUser, ChatMessage, ChatSender, InboundEvent, TelegramError, UpdateSource};

/// Base URL for the Telegram Bot API.
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Extra seconds added to the HTTP timeout beyond the long-poll timeout,
/// so the TCP socket stays open while Telegram holds the request.
const POLL_TIMEOUT_MARGIN_SECS: u64 = 10;

/// Generic Telegram Bot API response wrapper.
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

impl<T> TelegramResponse<T> {
    fn into_result(self, fallback: &str) -> Result<Option<T>, TelegramError> {
        if !self.ok {
            return Err(TelegramError::Api {
                code: self.error_code.unwrap_or_default(),
                description: self.description.unwrap_or_else(|| fallback.to_owned()),
            });
        }
        Ok(self.result)
    }
}

/// Telegram Bot API client bound to one bot token.
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl TelegramClient {
    /// Create a client for the public Bot API.
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, TELEGRAM_API_BASE)
    }

    /// Create a client against a custom API root (self-hosted Bot API server).
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
        }
    }

    /// Build the URL for a Bot API method.
    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// Validate the token by calling `getMe`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is rejected or the API is unreachable.
    pub async fn get_me(&self) -> Result<BotUser, TelegramError> {
        let resp = self.client.post(self.method_url("getMe")).send().await?;
        let response: TelegramResponse<BotUser> = resp.json().await?;
        response
            .into_result("getMe failed")?
            .ok_or_else(|| TelegramError::Api {
                code: 0,
                description: "getMe returned no result".to_owned(),
            })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<Option<T>, TelegramError> {
        let mut req = self.client.post(self.method_url(method)).json(body);
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }
        let resp = req.send().await?;
        let response: TelegramResponse<T> = resp.json().await?;
        response.into_result(&format!("{method} failed"))
    }
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<InboundEvent>, TelegramError> {
        let params = serde_json::json!({
            "offset": offset,
            "timeout": timeout.as_secs(),
        });
        let http_timeout = timeout.saturating_add(Duration::from_secs(POLL_TIMEOUT_MARGIN_SECS));

        let updates: Option<Vec<InboundEvent>> = self
            .call("getUpdates", &params, Some(http_timeout))
            .await?;
        Ok(updates.unwrap_or_default())
    }
}

#[async_trait]
impl ChatSender for TelegramClient {
    async fn send_message(&self, message: &ChatMessage) -> Result<(), TelegramError> {
        let body = serde_json::to_value(message)?;
        let _sent: Option<serde_json::Value> = self.call("sendMessage", &body, None).await?;
        debug!(chat_id = message.chat_id, "sent Telegram message");
        Ok(())
    }
}
