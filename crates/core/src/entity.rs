use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Discord-style 64-bit identifier with an embedded creation timestamp.
pub type Snowflake = u64;

/// Milliseconds between the Unix epoch and the first second of 2015.
pub const SNOWFLAKE_EPOCH_MS: u64 = 1_420_070_400_000;

/// Recover the creation time encoded in the upper 42 bits of a snowflake.
pub fn snowflake_timestamp(id: Snowflake) -> DateTime<Utc> {
    let millis = (id >> 22) + SNOWFLAKE_EPOCH_MS;
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// The subject being scored: a guild the bot has just joined.
///
/// Immutable for the duration of one evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guild {
    #[serde(with = "snowflake_string")]
    pub id: Snowflake,
    pub name: String,
    #[serde(with = "snowflake_string")]
    pub owner_id: Snowflake,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub member_count: Option<u64>,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Account metadata resolved through the rule context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(with = "snowflake_string")]
    pub id: Snowflake,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    /// When the account was registered.
    pub fn created_at(&self) -> DateTime<Utc> {
        snowflake_timestamp(self.id)
    }

    pub fn has_default_avatar(&self) -> bool {
        self.avatar.as_deref().map_or(true, str::is_empty)
    }
}

/// Snowflakes travel as JSON strings but older payloads use bare numbers.
pub mod snowflake_string {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(id: &Snowflake, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Snowflake, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
