//! Decode forwarded gateway events into domain entities.
//!
//! Message bodies are envelopes produced by the gateway forwarder:
//!
//! ```json
//! { "bot_id": 1, "shard_id": 0, "event": { "op": 0, "s": 12, "t": "GUILD_CREATE", "d": { ... } } }
//! ```
//!
//! Only `GUILD_CREATE` dispatches are relevant; every other event name is
//! skipped without error.

use serde::Deserialize;
use serde_json::Value;

use tripwire_core::Guild;

use crate::error::QueueError;

/// Gateway dispatch name for a guild becoming available to the bot.
pub const GUILD_CREATE: &str = "GUILD_CREATE";

/// Envelope wrapping a raw gateway payload.
#[derive(Debug, Deserialize)]
pub struct ForwardedEvent {
    #[serde(default)]
    pub bot_id: Option<u64>,
    #[serde(default)]
    pub shard_id: Option<u32>,
    pub event: Value,
}

/// A single gateway payload.
#[derive(Debug, Deserialize)]
pub struct GatewayPayload {
    #[serde(rename = "op")]
    pub opcode: u8,
    #[serde(rename = "s", default)]
    pub sequence: Option<u64>,
    #[serde(rename = "t", default)]
    pub event_name: Option<String>,
    #[serde(rename = "d", default)]
    pub data: Value,
}

/// Parse a message body, returning the joined guild for `GUILD_CREATE`
/// events and `None` for any other event.
pub fn parse_guild_create(body: &str) -> Result<Option<Guild>, QueueError> {
    let wrapped: ForwardedEvent = serde_json::from_str(body)
        .map_err(|e| QueueError::Parse(format!("invalid event envelope: {e}")))?;

    let payload: GatewayPayload = serde_json::from_value(wrapped.event)
        .map_err(|e| QueueError::Parse(format!("invalid gateway payload: {e}")))?;

    if payload.event_name.as_deref() != Some(GUILD_CREATE) {
        return Ok(None);
    }

    let guild: Guild = serde_json::from_value(payload.data)
        .map_err(|e| QueueError::Parse(format!("invalid guild: {e}")))?;

    Ok(Some(guild))
}
