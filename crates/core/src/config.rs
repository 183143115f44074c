use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Profile-aware view over a key/value source.
///
/// When a profile is active (e.g. `PROD`), every key is first looked up as
/// `{PROFILE}_{KEY}`, falling back to `{KEY}`. Empty values count as unset.
struct Source<'a> {
    profile: &'a str,
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl<'a> Source<'a> {
    fn opt(&self, key: &str) -> Option<String> {
        if !self.profile.is_empty() {
            let prefixed = format!("{}_{}", self.profile, key);
            if let Some(v) = (self.lookup)(&prefixed).filter(|s| !s.is_empty()) {
                return Some(v);
            }
        }
        (self.lookup)(key).filter(|s| !s.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.opt(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.opt(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        match self.opt(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(false),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(v) => Err(ConfigError::Invalid {
                key: key.to_string(),
                value: v,
                reason: "expected a boolean".to_string(),
            }),
        }
    }

    fn duration(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.opt(key) {
            None => Ok(default),
            Some(raw) => humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::Invalid {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub log: LogConfig,
    pub detector: DetectorConfig,
    pub queue: QueueConfig,
    pub discord: DiscordConfig,
    pub cache: CacheConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TRIPWIRE_PROFILE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = lookup("TRIPWIRE_PROFILE")
            .unwrap_or_default()
            .to_uppercase();
        let src = Source {
            profile: &profile,
            lookup: &lookup,
        };

        Ok(Self {
            profile: profile.clone(),
            log: LogConfig::load(&src)?,
            detector: DetectorConfig::load(&src)?,
            queue: QueueConfig::load(&src)?,
            discord: DiscordConfig::load(&src)?,
            cache: CacheConfig::load(&src)?,
            metrics: MetricsConfig::load(&src),
        })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  logging:     json={}, sentry={}",
            self.log.json,
            if self.log.sentry_dsn.is_some() { "enabled" } else { "disabled" }
        );
        tracing::info!(
            "  detector:    workers={}, task_timeout={:?}, join_window={:?}",
            self.detector.concurrent_tasks,
            self.detector.task_timeout,
            self.detector.join_window
        );
        tracing::info!(
            "  queue:       region={}, events={}, detections={}",
            self.queue.aws.region,
            self.queue.events_queue_url,
            self.queue.detection_queue_url
        );
        tracing::info!(
            "  discord:     api_base={}, proxy={}",
            self.discord.api_base,
            self.discord.proxy_url.as_deref().unwrap_or("(none)")
        );
        tracing::info!("  cache:       max_connections={}", self.cache.max_connections);
        tracing::info!(
            "  metrics:     addr={}",
            self.metrics.addr.as_deref().unwrap_or("(disabled)")
        );
    }
}

// ── Logging ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub json: bool,
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Sentry DSN; `error!` events are reported to Sentry when set.
    #[serde(skip_serializing)]
    pub sentry_dsn: Option<String>,
}

impl LogConfig {
    fn load(src: &Source<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            json: src.flag("JSON_LOGS")?,
            level: src.or("LOG_LEVEL", "info"),
            sentry_dsn: src.opt("SENTRY_DSN"),
        })
    }
}

// ── Detector ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Deadline applied to one evaluation pass, alert publication included.
    pub task_timeout: Duration,
    /// Number of dispatcher workers.
    pub concurrent_tasks: usize,
    /// Guilds joined longer ago than this are skipped by the listener.
    pub join_window: Duration,
    /// How long shutdown waits for workers before giving up.
    pub shutdown_grace: Duration,
    pub channel_capacity: usize,
}

impl DetectorConfig {
    fn load(src: &Source<'_>) -> Result<Self, ConfigError> {
        let concurrent_tasks = src.parsed("CONCURRENT_TASKS", 3usize)?;
        if concurrent_tasks == 0 {
            return Err(ConfigError::Invalid {
                key: "CONCURRENT_TASKS".to_string(),
                value: "0".to_string(),
                reason: "at least one worker is required".to_string(),
            });
        }

        Ok(Self {
            task_timeout: src.duration("TASK_TIMEOUT", Duration::from_secs(10))?,
            concurrent_tasks,
            join_window: src.duration("JOIN_DETECTION_WINDOW", Duration::from_secs(60 * 60))?,
            shutdown_grace: src.duration("SHUTDOWN_GRACE", Duration::from_secs(10))?,
            channel_capacity: src.parsed("ENTITY_CHANNEL_CAPACITY", 10usize)?.max(1),
        })
    }
}

// ── AWS / SQS ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn load(src: &Source<'_>) -> Self {
        Self {
            region: src.or("AWS_REGION", "us-east-1"),
            access_key_id: src.opt("AWS_ACCESS_KEY_ID"),
            secret_access_key: src.opt("AWS_SECRET_ACCESS_KEY"),
            session_token: src.opt("AWS_SESSION_TOKEN"),
            endpoint_url: src.opt("QUEUE_AWS_ENDPOINT_URL"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub aws: AwsConfig,
    /// Inbound gateway-event queue.
    pub events_queue_url: String,
    /// Outbound alert queue.
    pub detection_queue_url: String,
    pub visibility_timeout_secs: u32,
    pub poll_interval_ms: u64,
    pub max_batch_size: u32,
}

impl QueueConfig {
    fn load(src: &Source<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            aws: AwsConfig::load(src),
            events_queue_url: src.required("EVENTS_QUEUE_URL")?,
            detection_queue_url: src.required("DETECTION_QUEUE_URL")?,
            visibility_timeout_secs: src.parsed("QUEUE_VISIBILITY_TIMEOUT_SECS", 30)?,
            poll_interval_ms: src.parsed("QUEUE_POLL_INTERVAL_MS", 100)?,
            max_batch_size: src.parsed("QUEUE_MAX_BATCH_SIZE", 10)?,
        })
    }
}

// ── Discord REST ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(skip_serializing)]
    pub token: String,
    /// `host[:port]` of an HTTP proxy that API requests are rewritten to.
    pub proxy_url: Option<String>,
    pub api_base: String,
}

impl DiscordConfig {
    fn load(src: &Source<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            token: src.required("DISCORD_TOKEN")?,
            proxy_url: src.opt("DISCORD_PROXY_URL"),
            api_base: src.or("DISCORD_API_BASE", "https://discord.com/api/v10"),
        })
    }
}

// ── User cache (PostgreSQL) ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(skip_serializing)]
    pub uri: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl CacheConfig {
    fn load(src: &Source<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            uri: src.required("CACHE_URI")?,
            max_connections: src.parsed("CACHE_MAX_CONNECTIONS", 10)?,
            connect_timeout: src.duration("CACHE_CONNECT_TIMEOUT", Duration::from_secs(15))?,
        })
    }
}

// ── Metrics endpoint ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// `host:port` to serve `GET /metrics` on; disabled when unset.
    pub addr: Option<String>,
}

impl MetricsConfig {
    fn load(src: &Source<'_>) -> Self {
        Self {
            addr: src.opt("METRICS_ADDR"),
        }
    }
}
