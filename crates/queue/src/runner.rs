//! Background poll loop: queue → listener → entity channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::consumer::{QueueConsumer, QueueMessage};
use crate::error::QueueError;
use crate::listener::{wait_for_shutdown, Disposition, GuildJoinListener};

#[derive(Debug, Clone)]
pub struct ConsumerLoopConfig {
    pub max_batch_size: u32,
    /// Pause between polls, and before retrying after a poll error.
    pub poll_interval: Duration,
}

/// Counters accumulated over the lifetime of one consumer loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub forwarded: u64,
    pub ignored: u64,
    pub stale: u64,
    pub malformed: u64,
    pub requeued: u64,
}

enum Step {
    Continue,
    Stop,
}

/// Poll `consumer` until shutdown is signalled or the entity channel closes.
///
/// Malformed messages are logged and acked so they are not redelivered.
/// Messages that could not be handed over (shutdown mid-send, channel
/// closed) are nacked.
pub async fn run_consumer(
    consumer: Arc<dyn QueueConsumer>,
    listener: GuildJoinListener,
    config: ConsumerLoopConfig,
    mut shutdown: watch::Receiver<bool>,
) -> ConsumerStats {
    let mut stats = ConsumerStats::default();
    info!(
        max_batch_size = config.max_batch_size,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "Queue consumer started"
    );

    'poll: loop {
        let polled = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break 'poll,
            polled = consumer.poll_batch(config.max_batch_size) => polled,
        };

        match polled {
            Ok(messages) => {
                stats.received += messages.len() as u64;
                for msg in &messages {
                    if let Step::Stop = process_message(consumer.as_ref(), &listener, msg, &mut stats).await {
                        break 'poll;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Queue poll error, retrying in {:?}", config.poll_interval);
            }
        }

        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break 'poll,
            _ = tokio::time::sleep(config.poll_interval) => {}
        }
    }

    info!(
        received = stats.received,
        forwarded = stats.forwarded,
        stale = stats.stale,
        malformed = stats.malformed,
        "Queue consumer stopped"
    );
    stats
}

async fn process_message(
    consumer: &dyn QueueConsumer,
    listener: &GuildJoinListener,
    msg: &QueueMessage,
    stats: &mut ConsumerStats,
) -> Step {
    let (ack, step) = match listener.handle_message(&msg.body, Utc::now()).await {
        Ok(Disposition::Forwarded) => {
            stats.forwarded += 1;
            (true, Step::Continue)
        }
        Ok(Disposition::IgnoredEventType) => {
            stats.ignored += 1;
            (true, Step::Continue)
        }
        Ok(Disposition::Stale) => {
            stats.stale += 1;
            (true, Step::Continue)
        }
        Ok(Disposition::Dropped) => {
            stats.requeued += 1;
            (false, Step::Stop)
        }
        Err(QueueError::ChannelClosed) => {
            warn!(message_id = %msg.id, "Entity channel closed, stopping consumer");
            stats.requeued += 1;
            (false, Step::Stop)
        }
        Err(e) => {
            warn!(message_id = %msg.id, error = %e, "Dropping malformed message");
            stats.malformed += 1;
            (true, Step::Continue)
        }
    };

    let result = if ack {
        consumer.ack(&msg.receipt_handle).await
    } else {
        consumer.nack(&msg.receipt_handle).await
    };
    match result {
        Ok(()) => debug!(message_id = %msg.id, ack, "Message settled"),
        Err(e) => warn!(message_id = %msg.id, error = %e, "Failed to settle message"),
    }

    step
}
