//! Hand-written test doubles shared by the detector integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use tripwire_core::{Guild, MisconductAlert, Snowflake, User};
use tripwire_detector::{DetectorMetrics, DispatcherSettings};
use tripwire_queue::{AlertPublisher, QueueError};
use tripwire_rules::{
    ApiError, Evaluator, EvaluatorProperties, MemoryUserCache, RuleContext, RuleError, RuleType,
    UserApi,
};

pub fn guild(id: u64, name: &str) -> Guild {
    Guild {
        id,
        name: name.to_string(),
        // Registered in 2015: too old for the account-age rule.
        owner_id: 80351110224678912,
        joined_at: Utc::now(),
        icon: None,
        description: None,
        member_count: Some(3),
        features: Vec::new(),
    }
}

// ── Rules ────────────────────────────────────────────────────────────

/// Returns a fixed score, optionally after a delay.
pub struct FixedRule {
    pub name: &'static str,
    pub score: u32,
    pub parallel: bool,
    pub delay: Duration,
    pub started: Option<Arc<Notify>>,
}

impl FixedRule {
    pub fn inline(name: &'static str, score: u32) -> Arc<dyn Evaluator> {
        Arc::new(Self {
            name,
            score,
            parallel: false,
            delay: Duration::ZERO,
            started: None,
        })
    }

    pub fn parallel(name: &'static str, score: u32) -> Arc<dyn Evaluator> {
        Self::delayed(name, score, true, Duration::ZERO)
    }

    pub fn delayed(name: &'static str, score: u32, parallel: bool, delay: Duration) -> Arc<dyn Evaluator> {
        Arc::new(Self {
            name,
            score,
            parallel,
            delay,
            started: None,
        })
    }
}

#[async_trait]
impl Evaluator for FixedRule {
    async fn evaluate(&self, _ctx: &RuleContext, _guild: &Guild) -> Result<u32, RuleError> {
        if let Some(started) = &self.started {
            started.notify_one();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.score)
    }

    fn properties(&self) -> EvaluatorProperties {
        EvaluatorProperties {
            rule_name: self.name,
            rule_type: RuleType::General,
            parallel: self.parallel,
        }
    }
}

/// Always fails.
pub struct FailingRule {
    pub name: &'static str,
    pub parallel: bool,
}

impl FailingRule {
    pub fn new(name: &'static str, parallel: bool) -> Arc<dyn Evaluator> {
        Arc::new(Self { name, parallel })
    }
}

#[async_trait]
impl Evaluator for FailingRule {
    async fn evaluate(&self, _ctx: &RuleContext, _guild: &Guild) -> Result<u32, RuleError> {
        Err(RuleError::Evaluation("heuristic exploded".into()))
    }

    fn properties(&self) -> EvaluatorProperties {
        EvaluatorProperties {
            rule_name: self.name,
            rule_type: RuleType::General,
            parallel: self.parallel,
        }
    }
}

/// Panics when asked to score a guild with the given name, scores the rest.
pub struct PanicsOnName {
    pub name: &'static str,
    pub trigger: &'static str,
    pub score: u32,
    pub parallel: bool,
}

impl PanicsOnName {
    pub fn new(name: &'static str, trigger: &'static str, score: u32, parallel: bool) -> Arc<dyn Evaluator> {
        Arc::new(Self {
            name,
            trigger,
            score,
            parallel,
        })
    }
}

#[async_trait]
impl Evaluator for PanicsOnName {
    async fn evaluate(&self, _ctx: &RuleContext, guild: &Guild) -> Result<u32, RuleError> {
        if guild.name == self.trigger {
            panic!("cannot score {}", guild.name);
        }
        Ok(self.score)
    }

    fn properties(&self) -> EvaluatorProperties {
        EvaluatorProperties {
            rule_name: self.name,
            rule_type: RuleType::General,
            parallel: self.parallel,
        }
    }
}

// ── Publisher ────────────────────────────────────────────────────────

/// Records every alert; can be told to fail, stall or panic.
#[derive(Default)]
pub struct RecordingPublisher {
    pub alerts: Mutex<Vec<MisconductAlert>>,
    pub fail: bool,
    pub panic: bool,
    pub delay: Duration,
    pub attempts: AtomicUsize,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Default::default()
        }
    }

    pub fn stalling(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn published(&self) -> Vec<MisconductAlert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlertPublisher for RecordingPublisher {
    async fn publish_alert(&self, alert: &MisconductAlert) -> Result<(), QueueError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panic {
            panic!("publisher crashed on guild {}", alert.guild.id);
        }
        if self.fail {
            return Err(QueueError::Publish("broker unavailable".into()));
        }
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

// ── Rule context ─────────────────────────────────────────────────────

/// Serves users from a fixed list, 404 for anything else.
#[derive(Default)]
pub struct StaticUserApi {
    pub users: Vec<User>,
}

#[async_trait]
impl UserApi for StaticUserApi {
    async fn get_user(&self, user_id: Snowflake) -> Result<User, ApiError> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or(ApiError::Status {
                status: 404,
                body: "Unknown User".into(),
            })
    }
}

pub fn context_with_users(users: Vec<User>) -> RuleContext {
    RuleContext::new(
        Arc::new(MemoryUserCache::new(64)),
        Arc::new(StaticUserApi { users }),
    )
}

pub fn settings(
    evaluators: Vec<Arc<dyn Evaluator>>,
    publisher: Arc<RecordingPublisher>,
    task_timeout: Duration,
) -> (DispatcherSettings, DetectorMetrics) {
    let metrics = DetectorMetrics::new();
    let settings = DispatcherSettings::new(
        evaluators,
        context_with_users(Vec::new()),
        publisher,
        metrics.clone(),
        task_timeout,
    );
    (settings, metrics)
}
