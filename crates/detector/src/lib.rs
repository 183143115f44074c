//! Guild-join risk scoring.
//!
//! A [`WorkerPool`] runs N [`Dispatcher`]s over one entity channel. Each pass
//! evaluates the ruleset against a guild, clamps the aggregate score and
//! publishes a misconduct alert when it crosses [`ACTION_THRESHOLD`].

pub mod dispatcher;
pub mod metrics;
pub mod pool;

pub use dispatcher::{
    aggregate_score, exceeds_threshold, Dispatcher, DispatcherSettings, ACTION_THRESHOLD,
    MAX_SCORE,
};
pub use metrics::{spawn_metrics_server, DetectorMetrics, MetricsSnapshot};
pub use pool::{ShutdownOutcome, WorkerPool};
