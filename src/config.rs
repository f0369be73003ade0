//! Configuration loading and validation.
//!
//! Loads `tgbridge.toml` (or `$TGBRIDGE_CONFIG`, or an explicit `--config`
//! path), then applies environment overrides. CLI flags are applied last by
//! the binary.
//!
//! Precedence: CLI flags > env vars > config file > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::queue::{sqs, ReceiveRequest, DEFAULT_MAX_MESSAGES};
use crate::retry::RetryPolicy;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "tgbridge.toml";

/// Env var naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "TGBRIDGE_CONFIG";

/// Env var overriding `telegram.poll_timeout_secs`.
pub const POLL_TIMEOUT_ENV: &str = "TGBRIDGE_POLL_TIMEOUT_SECS";

/// Configuration failures. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config at {path}: {source}")]
    Read {
        /// File that was requested.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Config file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// No Telegram API key from flag or environment.
    #[error("no Telegram API key: pass --key or set {0}")]
    MissingCredential(String),
    /// Queue URL cannot be derived without an account id.
    #[error("no SQS account id: set queue.account_id, SQS_ACCOUNT_ID or queue.url")]
    MissingAccountId,
    /// Queue name is unusable in a queue URL.
    #[error("invalid queue name {0:?}")]
    InvalidQueueName(String),
    /// A duration argument could not be parsed.
    #[error("invalid duration {0:?} (expected e.g. 60, 60s, 2m, 500ms)")]
    InvalidDuration(String),
    /// The long-poll timeout must be a whole number of seconds, at least 1.
    #[error("invalid poll timeout {0:?} (expected whole seconds, at least 1s)")]
    InvalidPollTimeout(String),
}

/// An env override that was present but unusable, and therefore skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredOverride {
    /// Variable name.
    pub var: &'static str,
    /// Raw value found in the environment.
    pub value: String,
}

// ── Top-level config ────────────────────────────────────────────

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Telegram settings (`[telegram]`).
    pub telegram: TelegramSettings,
    /// Queue settings (`[queue]`).
    pub queue: QueueSettings,
    /// Logging settings (`[logging]`).
    pub logging: LoggingSettings,
    /// Env overrides skipped by [`BridgeConfig::apply_overrides`]. Reported
    /// by [`BridgeConfig::log_ignored_overrides`] once logging is up.
    #[serde(skip)]
    pub ignored_overrides: Vec<IgnoredOverride>,
}

/// `[telegram]` section.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    /// Env var holding the bot token.
    pub api_key_env: String,
    /// Resolved bot token. Never read from the file.
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Long-poll timeout for `getUpdates`, in seconds.
    pub poll_timeout_secs: u64,
    /// Delay after a failed poll, in seconds.
    pub retry_delay_secs: u64,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            api_key: None,
            poll_timeout_secs: 60,
            retry_delay_secs: 3,
        }
    }
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("api_key_env", &self.api_key_env)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .finish()
    }
}

/// `[queue]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Queue name.
    pub name: String,
    /// AWS account owning the queue.
    pub account_id: Option<String>,
    /// AWS region.
    pub region: String,
    /// Explicit queue URL; overrides name/account/region derivation.
    pub url: Option<String>,
    /// Lease duration per received item, in seconds.
    pub visibility_timeout_secs: u64,
    /// Long-poll wait per receive, in seconds.
    pub wait_time_secs: u64,
    /// Delay after any failed stage, in seconds.
    pub retry_delay_secs: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            account_id: None,
            region: default_region(),
            url: None,
            visibility_timeout_secs: 60,
            wait_time_secs: 20,
            retry_delay_secs: 60,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// JSON output instead of human-readable console output.
    pub production: bool,
    /// Debug level and console format regardless of `production`.
    pub debug: bool,
    /// Directory for daily-rotated JSON logs (production only).
    pub dir: Option<PathBuf>,
}

fn default_api_key_env() -> String {
    "TELEGRAM_API_KEY".to_owned()
}
fn default_queue_name() -> String {
    "telegram-bot-template".to_owned()
}
fn default_region() -> String {
    "us-east-1".to_owned()
}

impl BridgeConfig {
    /// Load with precedence: env vars > TOML file > defaults.
    ///
    /// `explicit` is the `--config` flag. A missing file is only an error
    /// when it was asked for explicitly.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(explicit, |key| std::env::var(key).ok())
    }

    /// Same as [`BridgeConfig::load`] with a custom env resolver (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting poll timeout is zero.
    pub fn load_with(
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let (path, required) = match explicit {
            Some(p) => (p.to_path_buf(), true),
            None => match env(CONFIG_PATH_ENV) {
                Some(p) => (PathBuf::from(p), true),
                None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
            },
        };

        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::debug!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!("no config file found, using defaults");
                Self::default()
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        config.apply_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break the polling loops.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPollTimeout`] for a zero poll timeout,
    /// which would turn the long poll into a busy loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.poll_timeout_secs == 0 {
            return Err(ConfigError::InvalidPollTimeout(
                self.telegram.poll_timeout_secs.to_string(),
            ));
        }
        Ok(())
    }

    /// Parse TOML without env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid TOML or mistyped fields.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function for testability (avoids `set_var` in tests).
    /// Unusable values are recorded in `ignored_overrides` rather than logged,
    /// since this runs before the log subscriber exists.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(key) = env(&self.telegram.api_key_env).filter(|k| !k.is_empty()) {
            self.telegram.api_key = Some(key);
        }
        if let Some(v) = env(POLL_TIMEOUT_ENV) {
            match v.parse::<u64>() {
                Ok(n) if n > 0 => self.telegram.poll_timeout_secs = n,
                _ => self.ignored_overrides.push(IgnoredOverride {
                    var: POLL_TIMEOUT_ENV,
                    value: v,
                }),
            }
        }

        if let Some(v) = env("SQS_ACCOUNT_ID").filter(|v| !v.is_empty()) {
            self.queue.account_id = Some(v);
        }
        if let Some(v) = env("SQS_QUEUE_NAME") {
            self.queue.name = v;
        }
        if let Some(v) = env("SQS_QUEUE_URL").filter(|v| !v.is_empty()) {
            self.queue.url = Some(v);
        }
        if let Some(v) = env("SQS_REGION") {
            self.queue.region = v;
        }

        if let Some(v) = env("TGBRIDGE_ENV") {
            self.logging.production = v.eq_ignore_ascii_case("production");
        }
        if let Some(v) = env("TGBRIDGE_LOG_DIR") {
            self.logging.dir = Some(PathBuf::from(v));
        }
    }

    /// Warn about every skipped env override.
    pub fn log_ignored_overrides(&self) {
        for ignored in &self.ignored_overrides {
            tracing::warn!(
                var = ignored.var,
                value = %ignored.value,
                "ignoring invalid env override"
            );
        }
    }

    /// The bot token, or a configuration error naming where to put it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] when no key was supplied.
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.telegram
            .api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingCredential(self.telegram.api_key_env.clone()))
    }

    /// Resolve the queue URL: explicit `url`, else derived from
    /// region/account/name.
    ///
    /// # Errors
    ///
    /// Returns an error for a missing account id or an unusable queue name.
    pub fn queue_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = &self.queue.url {
            return Ok(url.clone());
        }
        let name = self.queue.name.trim();
        if name.is_empty() || name.contains('/') {
            return Err(ConfigError::InvalidQueueName(self.queue.name.clone()));
        }
        let account_id = self
            .queue
            .account_id
            .as_deref()
            .ok_or(ConfigError::MissingAccountId)?;
        Ok(sqs::queue_url(&self.queue.region, account_id, name))
    }

    /// Long-poll timeout for the receiver.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.telegram.poll_timeout_secs)
    }

    /// Backoff for the receiver.
    pub fn inbound_retry(&self) -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_secs(self.telegram.retry_delay_secs))
    }

    /// Backoff for the bridge.
    pub fn outbound_retry(&self) -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_secs(self.queue.retry_delay_secs))
    }

    /// Parameters for each queue receive call.
    pub fn receive_request(&self) -> ReceiveRequest {
        ReceiveRequest {
            max_messages: DEFAULT_MAX_MESSAGES,
            visibility_timeout: Duration::from_secs(self.queue.visibility_timeout_secs),
            wait_time: Duration::from_secs(self.queue.wait_time_secs),
        }
    }
}

/// Parse a CLI duration: bare seconds, or a number with `ms`, `s`, `m` or `h`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDuration`] for anything else.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(input.to_owned());
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let value: u64 = digits.parse().map_err(|_| invalid())?;

    let duration = match unit {
        "" | "s" => Duration::from_secs(value),
        "ms" => Duration::from_millis(value),
        "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(invalid)?),
        "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };
    Ok(duration)
}

/// Parse the CLI long-poll timeout. Same syntax as [`parse_duration`], but
/// the result must be a whole number of seconds, at least one.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDuration`] for unparseable input and
/// [`ConfigError::InvalidPollTimeout`] for zero or sub-second values.
pub fn parse_poll_timeout(input: &str) -> Result<Duration, ConfigError> {
    let duration = parse_duration(input)?;
    if duration.is_zero() || duration.subsec_nanos() != 0 {
        return Err(ConfigError::InvalidPollTimeout(input.to_owned()));
    }
    Ok(duration)
}
