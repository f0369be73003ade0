//! tgbridge CLI entry point.
//!
//! Provides `receive` and `send` subcommands: the Telegram update listener
//! and the SQS-to-Telegram sender. Exits 2 on configuration failure, 1 on
//! runtime failure, 0 on Ctrl-C.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, error, info, info_span, Instrument};

use tgbridge::config::{parse_poll_timeout, BridgeConfig};
use tgbridge::inbound::{self, InboundReceiver, HANDOFF_CAPACITY};
use tgbridge::logging;
use tgbridge::outbound::handler::TelegramSendHandler;
use tgbridge::outbound::OutboundBridge;
use tgbridge::queue::SqsQueue;
use tgbridge::telegram::TelegramClient;

/// Exit code for configuration failures.
const EXIT_CONFIG: u8 = 2;

/// Telegram bot receiver and SQS-backed sender.
#[derive(Parser)]
#[command(name = "tgbridge", version, about)]
struct Cli {
    /// Telegram API key (default: TELEGRAM_API_KEY environment variable).
    #[arg(short = 'k', long = "key", global = true)]
    key: Option<String>,

    /// Long-poll timeout for receiving updates in whole seconds, e.g. 60, 60s, 2m.
    #[arg(short = 't', long = "timeout", global = true, value_parser = parse_poll_timeout)]
    timeout: Option<Duration>,

    /// Enable debug mode.
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    /// Config file (default: $TGBRIDGE_CONFIG or ./tgbridge.toml).
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Consume queued messages and send them to Telegram chats.
    Send,
    /// Listen for Telegram updates.
    Receive,
}

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let _logging_guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialise logging: {e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Ok(path) = &dotenv {
        debug!(path = %path.display(), "loaded .env");
    }
    config.log_ignored_overrides();

    let result = match cli.command {
        Command::Receive => match prepare_receive(&config).await {
            Ok(receiver) => run_receive(receiver).await,
            Err(e) => return config_failure(&e),
        },
        Command::Send => match prepare_send(&config).await {
            Ok(bridge) => run_send(bridge, &config.queue.name).await,
            Err(e) => return config_failure(&e),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "runtime error");
            ExitCode::FAILURE
        }
    }
}

fn config_failure(e: &anyhow::Error) -> ExitCode {
    error!(error = ?e, "startup failed");
    ExitCode::from(EXIT_CONFIG)
}

/// Load the config file and env, then apply CLI flags on top.
fn resolve_config(cli: &Cli) -> anyhow::Result<BridgeConfig> {
    let mut config = BridgeConfig::load(cli.config.as_deref())?;
    if let Some(key) = &cli.key {
        config.telegram.api_key = Some(key.clone());
    }
    if let Some(timeout) = cli.timeout {
        config.telegram.poll_timeout_secs = timeout.as_secs();
    }
    if cli.debug {
        config.logging.debug = true;
    }
    Ok(config)
}

/// Validate the token and build the inbound receiver.
async fn prepare_receive(
    config: &BridgeConfig,
) -> anyhow::Result<InboundReceiver<TelegramClient>> {
    let client = TelegramClient::new(config.api_key()?);
    let me = client
        .get_me()
        .await
        .context("failed to validate Telegram API key")?;
    info!(bot_id = me.id, username = me.username.as_deref(), "authorized on Telegram");

    Ok(InboundReceiver::new(
        client,
        config.poll_timeout(),
        config.inbound_retry(),
    ))
}

/// Run the receiver and drain its events until Ctrl-C.
async fn run_receive(receiver: InboundReceiver<TelegramClient>) -> anyhow::Result<()> {
    let (producer, rx) = inbound::spawn(receiver, HANDOFF_CAPACITY);
    let consumer = inbound::consume(rx, |event| inbound::log_event(&event));

    tokio::select! {
        handled = consumer => {
            let cursor = producer.await.context("receiver task failed")?;
            Err(anyhow::anyhow!(
                "receiver stopped after {handled} updates at offset {}",
                cursor.offset()
            ))
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("received Ctrl-C, shutting down receiver");
            Ok(())
        }
    }
}

/// Validate the token and queue identity, then build the bridge.
async fn prepare_send(
    config: &BridgeConfig,
) -> anyhow::Result<OutboundBridge<SqsQueue, TelegramSendHandler<TelegramClient>>> {
    let api_key = config.api_key()?;
    let queue_url = config.queue_url()?;

    let client = TelegramClient::new(api_key);
    let me = client
        .get_me()
        .await
        .context("failed to validate Telegram API key")?;
    info!(bot_id = me.id, username = me.username.as_deref(), "authorized on Telegram");

    let queue = SqsQueue::connect(config.queue.region.clone(), queue_url).await;
    info!(queue_url = queue.queue_url(), "connected to SQS");

    Ok(OutboundBridge::new(
        queue,
        TelegramSendHandler::new(client),
        config.receive_request(),
        config.outbound_retry(),
    ))
}

/// Run the bridge until Ctrl-C.
async fn run_send(
    bridge: OutboundBridge<SqsQueue, TelegramSendHandler<TelegramClient>>,
    queue_name: &str,
) -> anyhow::Result<()> {
    let span = info_span!("queue", queue_name = %queue_name);
    tokio::select! {
        () = bridge.run().instrument(span) => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("received Ctrl-C, shutting down sender");
            Ok(())
        }
    }
}
