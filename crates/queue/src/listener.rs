//! Forward freshly joined guilds onto the dispatcher's entity channel.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use tripwire_core::Guild;

use crate::error::QueueError;
use crate::parser::parse_guild_create;

/// What the listener did with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handed to the dispatcher.
    Forwarded,
    /// Not a guild-join event.
    IgnoredEventType,
    /// Joined before the recency window; left over from a backlog.
    Stale,
    /// Shutdown was signalled while waiting for channel capacity.
    Dropped,
}

/// `true` when `joined_at` falls inside `[now - window, ∞)`.
pub fn within_join_window(joined_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    let Ok(window) = chrono::Duration::from_std(window) else {
        return true;
    };
    match now.checked_sub_signed(window) {
        Some(cutoff) => joined_at >= cutoff,
        None => true,
    }
}

/// Filters inbound events down to recent guild joins and feeds the entity channel.
pub struct GuildJoinListener {
    tx: mpsc::Sender<Guild>,
    join_window: Duration,
    shutdown: watch::Receiver<bool>,
}

impl GuildJoinListener {
    pub fn new(tx: mpsc::Sender<Guild>, join_window: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            tx,
            join_window,
            shutdown,
        }
    }

    /// Decode one message body and forward it if it is a recent guild join.
    ///
    /// Waits for channel capacity, but gives up once shutdown is signalled.
    pub async fn handle_message(&self, body: &str, now: DateTime<Utc>) -> Result<Disposition, QueueError> {
        let guild = match parse_guild_create(body)? {
            Some(guild) => guild,
            None => return Ok(Disposition::IgnoredEventType),
        };

        if !within_join_window(guild.joined_at, now, self.join_window) {
            debug!(
                guild_id = guild.id,
                joined_at = %guild.joined_at,
                "Ignoring guild, as we joined it too long ago"
            );
            return Ok(Disposition::Stale);
        }

        debug!(guild_id = guild.id, "Received guild applicable for scanning");

        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow_and_update() {
            return Ok(Disposition::Dropped);
        }

        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => Ok(Disposition::Dropped),
            sent = self.tx.send(guild) => match sent {
                Ok(()) => Ok(Disposition::Forwarded),
                Err(_) => Err(QueueError::ChannelClosed),
            },
        }
    }
}

/// Resolve once the watch value is `true` or the sender is gone.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
