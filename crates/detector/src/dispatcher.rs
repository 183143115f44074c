//! The scoring engine: one dispatcher per worker, one pass per guild.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info};

use tripwire_core::{Guild, MisconductAlert, ScoreMap};
use tripwire_queue::listener::wait_for_shutdown;
use tripwire_queue::AlertPublisher;
use tripwire_rules::{Evaluator, RuleContext, RuleError};

use crate::metrics::DetectorMetrics;

/// An alert is raised only when the aggregate is strictly greater than this.
pub const ACTION_THRESHOLD: u32 = 25;

/// Aggregate scores are clamped to this value.
pub const MAX_SCORE: u32 = 100;

/// Sum of all rule scores, clamped to [`MAX_SCORE`].
pub fn aggregate_score(scores: &ScoreMap) -> u32 {
    scores
        .values()
        .fold(0u32, |total, score| total.saturating_add(*score))
        .min(MAX_SCORE)
}

pub fn exceeds_threshold(score: u32) -> bool {
    score > ACTION_THRESHOLD
}

/// Everything a pass needs. Shared by all workers of a pool.
#[derive(Clone)]
pub struct DispatcherSettings {
    pub evaluators: Arc<[Arc<dyn Evaluator>]>,
    pub context: RuleContext,
    pub publisher: Arc<dyn AlertPublisher>,
    pub metrics: DetectorMetrics,
    /// Deadline for one pass: every rule and the alert publish.
    pub task_timeout: Duration,
}

impl DispatcherSettings {
    pub fn new(
        evaluators: Vec<Arc<dyn Evaluator>>,
        context: RuleContext,
        publisher: Arc<dyn AlertPublisher>,
        metrics: DetectorMetrics,
        task_timeout: Duration,
    ) -> Self {
        Self {
            evaluators: evaluators.into(),
            context,
            publisher,
            metrics,
            task_timeout,
        }
    }

    /// Score one guild and publish an alert if it crosses the threshold.
    ///
    /// Rule failures, timeouts and publish failures are logged and counted;
    /// none of them abort the pass.
    pub async fn handle_guild(&self, guild: Guild) {
        info!(guild_id = guild.id, "Evaluating guild");

        let deadline = Instant::now() + self.task_timeout;
        let scores = self.score_guild(&guild, deadline).await;
        let total_score = aggregate_score(&scores);
        self.metrics.record_guild_evaluated().await;

        debug!(guild_id = guild.id, total_score, ?scores, "Evaluated guild");

        if !exceeds_threshold(total_score) {
            return;
        }

        info!(
            guild_id = guild.id,
            total_score,
            ?scores,
            "Guild is above alert threshold, publishing"
        );

        let guild_id = guild.id;
        let alert = MisconductAlert {
            guild,
            score: total_score,
            rule_scores: scores,
        };

        match timeout_at(deadline, self.publisher.publish_alert(&alert)).await {
            Ok(Ok(())) => self.metrics.record_alert_published().await,
            Ok(Err(e)) => {
                error!(guild_id, error = %e, "Failed to publish alert");
                self.metrics.record_alert_failure().await;
            }
            Err(_) => {
                error!(guild_id, "Timed out publishing alert");
                self.metrics.record_alert_failure().await;
            }
        }
    }

    /// Run every rule against `guild` and collect the scores that succeeded.
    ///
    /// Inline rules run in registration order on the caller's task; parallel
    /// rules are spawned as they are reached and joined at the end.
    pub async fn score_guild(&self, guild: &Guild, deadline: Instant) -> ScoreMap {
        let scores = Arc::new(Mutex::new(ScoreMap::new()));
        let shared_guild = Arc::new(guild.clone());
        let mut tasks = Vec::new();

        for evaluator in self.evaluators.iter() {
            let rule = evaluator.properties().rule_name;
            self.metrics.record_evaluation(rule).await;

            if evaluator.properties().parallel {
                let evaluator = Arc::clone(evaluator);
                let ctx = self.context.clone();
                let guild = Arc::clone(&shared_guild);
                let scores = Arc::clone(&scores);
                let metrics = self.metrics.clone();
                let timeout = self.task_timeout;

                tasks.push(tokio::spawn(async move {
                    match run_rule(evaluator.as_ref(), &ctx, &guild, deadline, timeout, &metrics).await {
                        Ok(score) => {
                            scores.lock().await.insert(rule.to_string(), score);
                            metrics.record_score(rule, score).await;
                            Ok(())
                        }
                        Err(e) => Err((rule, e)),
                    }
                }));
            } else {
                match run_rule(
                    evaluator.as_ref(),
                    &self.context,
                    guild,
                    deadline,
                    self.task_timeout,
                    &self.metrics,
                )
                .await
                {
                    Ok(score) => {
                        scores.lock().await.insert(rule.to_string(), score);
                        self.metrics.record_score(rule, score).await;
                    }
                    Err(e) => {
                        error!(guild_id = guild.id, rule, error = %e, "Failed to evaluate guild");
                        self.metrics.record_rule_failure(rule).await;
                    }
                }
            }
        }

        // Scores already collected stand even if some tasks failed.
        for joined in join_all(tasks).await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err((rule, e))) => {
                    error!(guild_id = guild.id, rule, error = %e, "Failed to evaluate guild");
                    self.metrics.record_rule_failure(rule).await;
                }
                Err(e) => {
                    error!(guild_id = guild.id, error = %e, "Rule task panicked");
                }
            }
        }

        let mut collected = scores.lock().await;
        std::mem::take(&mut *collected)
    }
}

async fn run_rule(
    evaluator: &dyn Evaluator,
    ctx: &RuleContext,
    guild: &Guild,
    deadline: Instant,
    timeout: Duration,
    metrics: &DetectorMetrics,
) -> Result<u32, RuleError> {
    let rule = evaluator.properties().rule_name;
    let started = Instant::now();

    // A panicking rule fails like any other; it must not take the worker down.
    let evaluation = AssertUnwindSafe(timeout_at(deadline, evaluator.evaluate(ctx, guild)));
    let result = match evaluation.catch_unwind().await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(RuleError::Timeout {
            rule: rule.to_string(),
            after: timeout,
        }),
        Err(payload) => Err(RuleError::Panicked {
            rule: rule.to_string(),
            message: panic_message(&*payload),
        }),
    };

    metrics.record_execution(rule, started.elapsed()).await;
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A worker: pulls guilds off the shared channel until shutdown.
pub struct Dispatcher {
    id: usize,
    settings: DispatcherSettings,
    receiver: Arc<Mutex<mpsc::Receiver<Guild>>>,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    pub fn new(
        id: usize,
        settings: DispatcherSettings,
        receiver: Arc<Mutex<mpsc::Receiver<Guild>>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            settings,
            receiver,
            shutdown,
        }
    }

    /// Loop until shutdown is signalled or the channel closes.
    ///
    /// Shutdown is only observed between passes: a pass that has started
    /// always runs to completion.
    pub async fn run(mut self) {
        debug!(worker = self.id, "Dispatcher started");

        loop {
            let next = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => break,
                guild = next_guild(&self.receiver) => guild,
            };

            match next {
                Some(guild) => self.settings.handle_guild(guild).await,
                None => {
                    debug!(worker = self.id, "Entity channel closed");
                    break;
                }
            }
        }

        info!(worker = self.id, "Shutting down dispatcher");
    }
}

async fn next_guild(receiver: &Mutex<mpsc::Receiver<Guild>>) -> Option<Guild> {
    receiver.lock().await.recv().await
}
