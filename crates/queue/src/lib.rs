//! Queue plumbing around the scoring engine.
//!
//! - `QueueConsumer` trait and its SQS backend for the inbound event queue
//! - Gateway-event parser and the guild-join listener with its recency filter
//! - `run_consumer` poll loop feeding the dispatcher's entity channel
//! - `AlertPublisher` trait and its SQS backend for the detection queue

pub mod consumer;
pub mod error;
pub mod listener;
pub mod parser;
pub mod producer;
pub mod runner;
pub mod sqs;

pub use consumer::{QueueConsumer, QueueHealth, QueueMessage};
pub use error::QueueError;
pub use listener::{within_join_window, Disposition, GuildJoinListener};
pub use parser::parse_guild_create;
pub use producer::AlertPublisher;
pub use runner::{run_consumer, ConsumerLoopConfig, ConsumerStats};
pub use sqs::{build_client, SqsAlertPublisher, SqsConsumer};
