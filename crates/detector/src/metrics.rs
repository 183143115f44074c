//! Detector metrics and their HTTP exposure.
//!
//! Per-rule evaluation counts, execution-time histograms and score
//! contributions, plus process-wide totals, served as JSON via `GET /metrics`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{watch, Mutex};

use tripwire_queue::listener::wait_for_shutdown;

/// Upper bounds (seconds) of the execution-time histogram buckets.
pub const EXECUTION_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

// ── Histogram ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Histogram {
    /// One slot per bucket plus a trailing `+Inf` slot. Not cumulative.
    counts: [u64; EXECUTION_BUCKETS.len() + 1],
    count: u64,
    sum_secs: f64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            counts: [0; EXECUTION_BUCKETS.len() + 1],
            count: 0,
            sum_secs: 0.0,
        }
    }
}

impl Histogram {
    fn observe(&mut self, secs: f64) {
        let slot = EXECUTION_BUCKETS
            .iter()
            .position(|le| secs <= *le)
            .unwrap_or(EXECUTION_BUCKETS.len());
        self.counts[slot] += 1;
        self.count += 1;
        self.sum_secs += secs;
    }

    fn snapshot(&self) -> HistogramSnapshot {
        let mut cumulative = 0;
        let buckets = EXECUTION_BUCKETS
            .iter()
            .zip(self.counts.iter())
            .map(|(le, count)| {
                cumulative += count;
                BucketCount {
                    le: *le,
                    count: cumulative,
                }
            })
            .collect();

        HistogramSnapshot {
            buckets,
            count: self.count,
            sum_secs: self.sum_secs,
        }
    }
}

/// A bucket in cumulative form: observations `<= le`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BucketCount {
    pub le: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramSnapshot {
    pub buckets: Vec<BucketCount>,
    /// All observations, including those above the last bucket.
    pub count: u64,
    pub sum_secs: f64,
}

// ── Per-rule stats ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct RuleStats {
    evaluations: u64,
    failures: u64,
    score_total: u64,
    execution: Histogram,
}

/// Serialized under the `tickets_misconduct_detector_rule_*` series names
/// existing dashboards query.
#[derive(Debug, Clone, Serialize)]
pub struct RuleMetrics {
    #[serde(rename = "tickets_misconduct_detector_rule_evaluations")]
    pub evaluations: u64,
    pub failures: u64,
    /// Sum of every score this rule contributed.
    #[serde(rename = "tickets_misconduct_detector_rule_score")]
    pub score_total: u64,
    #[serde(rename = "tickets_misconduct_detector_rule_execution_time")]
    pub execution_time: HistogramSnapshot,
}

/// JSON body of `GET /metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub rules: BTreeMap<String, RuleMetrics>,
    pub guilds_evaluated: u64,
    pub alerts_published: u64,
    pub alert_failures: u64,
    pub rule_failures: u64,
    pub uptime_secs: f64,
}

// ── Collector ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Inner {
    rules: HashMap<String, RuleStats>,
    guilds_evaluated: u64,
    alerts_published: u64,
    alert_failures: u64,
    rule_failures: u64,
}

impl Inner {
    fn rule(&mut self, rule: &str) -> &mut RuleStats {
        self.rules.entry(rule.to_string()).or_default()
    }
}

/// Shared metrics registry. Clones record into the same state.
#[derive(Debug, Clone)]
pub struct DetectorMetrics {
    inner: Arc<Mutex<Inner>>,
    start: Instant,
}

impl DetectorMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            start: Instant::now(),
        }
    }

    pub async fn record_evaluation(&self, rule: &str) {
        self.inner.lock().await.rule(rule).evaluations += 1;
    }

    pub async fn record_execution(&self, rule: &str, elapsed: Duration) {
        self.inner
            .lock()
            .await
            .rule(rule)
            .execution
            .observe(elapsed.as_secs_f64());
    }

    pub async fn record_score(&self, rule: &str, score: u32) {
        self.inner.lock().await.rule(rule).score_total += u64::from(score);
    }

    pub async fn record_rule_failure(&self, rule: &str) {
        let mut inner = self.inner.lock().await;
        inner.rule_failures += 1;
        inner.rule(rule).failures += 1;
    }

    pub async fn record_guild_evaluated(&self) {
        self.inner.lock().await.guilds_evaluated += 1;
    }

    pub async fn record_alert_published(&self) {
        self.inner.lock().await.alerts_published += 1;
    }

    pub async fn record_alert_failure(&self) {
        self.inner.lock().await.alert_failures += 1;
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().await;

        let rules = inner
            .rules
            .iter()
            .map(|(name, stats)| {
                (
                    name.clone(),
                    RuleMetrics {
                        evaluations: stats.evaluations,
                        failures: stats.failures,
                        score_total: stats.score_total,
                        execution_time: stats.execution.snapshot(),
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            rules,
            guilds_evaluated: inner.guilds_evaluated,
            alerts_published: inner.alerts_published,
            alert_failures: inner.alert_failures,
            rule_failures: inner.rule_failures,
            uptime_secs: self.start.elapsed().as_secs_f64(),
        }
    }
}

impl Default for DetectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ── HTTP server ──────────────────────────────────────────────────────

/// Serve `GET /metrics` on `addr` until shutdown is signalled.
pub fn spawn_metrics_server(
    addr: String,
    metrics: DetectorMetrics,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = axum::Router::new()
            .route("/metrics", axum::routing::get(metrics_handler))
            .with_state(metrics);

        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(%addr, error = %e, "failed to bind metrics HTTP server");
                return;
            }
        };

        tracing::info!(%addr, "metrics HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut rx = shutdown;
                wait_for_shutdown(&mut rx).await;
            })
            .await
            .ok();

        tracing::info!("metrics HTTP server stopped");
    })
}

async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<DetectorMetrics>,
) -> axum::Json<MetricsSnapshot> {
    axum::Json(metrics.snapshot().await)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_buckets_are_cumulative() {
        let mut h = Histogram::default();
        h.observe(0.001);
        h.observe(0.02);
        h.observe(0.02);
        h.observe(30.0);

        let snap = h.snapshot();
        assert_eq!(snap.count, 4);
        assert_eq!(snap.buckets[0], BucketCount { le: 0.005, count: 1 });
        assert_eq!(snap.buckets[2], BucketCount { le: 0.025, count: 3 });
        // 30s lands past the last bucket: counted, but not in any `le`.
        assert_eq!(snap.buckets.last().unwrap().count, 3);
        assert!((snap.sum_secs - 30.041).abs() < 1e-9);
    }

    #[test]
    fn boundary_value_lands_in_its_bucket() {
        let mut h = Histogram::default();
        h.observe(0.1);
        let snap = h.snapshot();
        let at = snap.buckets.iter().find(|b| b.le == 0.1).unwrap();
        assert_eq!(at.count, 1);
        let below = snap.buckets.iter().find(|b| b.le == 0.05).unwrap();
        assert_eq!(below.count, 0);
    }

    #[tokio::test]
    async fn records_per_rule_and_totals() {
        let metrics = DetectorMetrics::new();
        metrics.record_evaluation("Account age").await;
        metrics.record_evaluation("Account age").await;
        metrics.record_score("Account age", 80).await;
        metrics.record_score("Account age", 20).await;
        metrics.record_execution("Account age", Duration::from_millis(3)).await;
        metrics.record_rule_failure("Owner has default avatar").await;
        metrics.record_guild_evaluated().await;
        metrics.record_alert_published().await;
        metrics.record_alert_failure().await;

        let snap = metrics.snapshot().await;
        let age = &snap.rules["Account age"];
        assert_eq!(age.evaluations, 2);
        assert_eq!(age.score_total, 100);
        assert_eq!(age.execution_time.count, 1);
        assert_eq!(snap.rules["Owner has default avatar"].failures, 1);
        assert_eq!(snap.rule_failures, 1);
        assert_eq!(snap.guilds_evaluated, 1);
        assert_eq!(snap.alerts_published, 1);
        assert_eq!(snap.alert_failures, 1);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let metrics = DetectorMetrics::new();
        let clone = metrics.clone();
        clone.record_guild_evaluated().await;
        assert_eq!(metrics.snapshot().await.guilds_evaluated, 1);
    }

    #[tokio::test]
    async fn snapshot_serializes() {
        let metrics = DetectorMetrics::new();
        metrics.record_evaluation("r").await;
        let json = serde_json::to_value(metrics.snapshot().await).unwrap();
        let rule = &json["rules"]["r"];
        assert_eq!(rule["tickets_misconduct_detector_rule_evaluations"], 1);
        assert_eq!(rule["tickets_misconduct_detector_rule_score"], 0);
        assert_eq!(rule["failures"], 0);
        assert_eq!(
            rule["tickets_misconduct_detector_rule_execution_time"]["buckets"]
                .as_array()
                .unwrap()
                .len(),
            EXECUTION_BUCKETS.len()
        );
    }
}
