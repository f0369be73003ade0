//! tgbridge: bridges a Telegram bot to an SQS work queue.
//!
//! Two independent loops:
//! - [`inbound`] long-polls Telegram `getUpdates` and hands each new update
//!   to a single consumer, tracking the offset cursor.
//! - [`outbound`] drains an SQS queue, turning each item into a Telegram
//!   message and deleting it only after a successful send.
//!
//! See `DESIGN.md` for the delivery guarantees of each loop.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod retry;

pub mod queue;
pub mod telegram;

pub mod inbound;
pub mod outbound;
