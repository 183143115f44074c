//! detector-worker: scores newly joined guilds and publishes misconduct alerts.
//!
//! Consumes forwarded `GUILD_CREATE` events from the events queue, runs the
//! ruleset on a pool of workers and sends alerts to the detection queue.

use std::env;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use tripwire_core::config::{Config, LogConfig};
use tripwire_detector::{
    spawn_metrics_server, DetectorMetrics, DispatcherSettings, ShutdownOutcome, WorkerPool,
};
use tripwire_queue::{
    build_client, run_consumer, ConsumerLoopConfig, GuildJoinListener, QueueConsumer,
    SqsAlertPublisher, SqsConsumer,
};
use tripwire_rules::{default_ruleset, DiscordClient, PgUserCache, RuleContext};

// ── CLI ─────────────────────────────────────────────────────────────

/// Guild-join risk scoring worker.
#[derive(Parser, Debug)]
#[command(name = "detector-worker", version, about)]
struct Cli {
    /// Env file loaded before reading configuration.
    #[arg(long, env = "TRIPWIRE_ENV_FILE")]
    env_file: Option<String>,

    /// Config profile; keys are looked up as `{PROFILE}_{KEY}` first.
    #[arg(long, env = "TRIPWIRE_PROFILE")]
    profile: Option<String>,

    /// Override the number of dispatcher workers.
    #[arg(long, env = "TRIPWIRE_WORKERS")]
    workers: Option<usize>,

    /// Load and print the configuration, then exit.
    #[arg(long)]
    check_config: bool,
}

/// Start the Sentry client when a DSN is configured. The guard flushes
/// pending events on drop, so it must live until `main` returns.
fn init_sentry(log: &LogConfig) -> anyhow::Result<Option<sentry::ClientInitGuard>> {
    let Some(dsn) = log.sentry_dsn.as_deref() else {
        return Ok(None);
    };
    let dsn: sentry::types::Dsn = dsn.parse().context("invalid SENTRY_DSN")?;

    Ok(Some(sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        release: sentry::release_name!(),
        ..Default::default()
    })))
}

/// Install the subscriber: plain or JSON output, plus a Sentry layer that
/// reports `error!` events when Sentry is enabled.
fn init_tracing(log: &LogConfig, sentry_enabled: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log.level));

    let output = if log.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .with(sentry_enabled.then(sentry_tracing::layer))
        .init();
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl_c");
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path).with_context(|| format!("failed to load env file {path}"))?;
        }
        None => tripwire_core::config::load_dotenv(),
    }

    let mut config = Config::from_lookup(|key| match (key, &cli.profile) {
        ("TRIPWIRE_PROFILE", Some(profile)) => Some(profile.clone()),
        _ => env::var(key).ok(),
    })
    .context("invalid configuration")?;

    if let Some(workers) = cli.workers {
        anyhow::ensure!(workers > 0, "--workers must be at least 1");
        config.detector.concurrent_tasks = workers;
    }

    let sentry_guard = init_sentry(&config.log)?;
    init_tracing(&config.log, sentry_guard.is_some());
    config.log_summary();

    if cli.check_config {
        return Ok(());
    }

    // Rule context: Postgres user cache in front of the Discord API.
    let cache = PgUserCache::connect(&config.cache)
        .await
        .context("failed to connect to user cache")?;
    let api = DiscordClient::new(&config.discord).context("failed to build Discord client")?;
    let context = RuleContext::new(Arc::new(cache), Arc::new(api));

    // Queues.
    let sqs = build_client(&config.queue.aws);
    let consumer = Arc::new(SqsConsumer::new(sqs.clone(), &config.queue));
    let health = consumer
        .health_check()
        .await
        .context("events queue is unreachable")?;
    info!(%health, "Events queue reachable");
    let publisher = Arc::new(SqsAlertPublisher::new(sqs, &config.queue));

    // Workers.
    let evaluators = default_ruleset();
    let rules: Vec<&str> = evaluators.iter().map(|e| e.properties().rule_name).collect();
    info!(?rules, "Ruleset loaded");

    let metrics = DetectorMetrics::new();
    let settings = DispatcherSettings::new(
        evaluators,
        context,
        publisher,
        metrics.clone(),
        config.detector.task_timeout,
    );

    let (tx, rx) = mpsc::channel(config.detector.channel_capacity);
    let pool = WorkerPool::start(settings, config.detector.concurrent_tasks, rx);

    let listener = GuildJoinListener::new(tx, config.detector.join_window, pool.subscribe());
    let consumer_handle = tokio::spawn(run_consumer(
        consumer,
        listener,
        ConsumerLoopConfig {
            max_batch_size: config.queue.max_batch_size,
            poll_interval: std::time::Duration::from_millis(config.queue.poll_interval_ms),
        },
        pool.subscribe(),
    ));

    let metrics_handle = config
        .metrics
        .addr
        .clone()
        .map(|addr| spawn_metrics_server(addr, metrics.clone(), pool.subscribe()));

    info!(workers = pool.worker_count(), "detector-worker running");
    os_signal().await;
    info!("Shutdown signal received, stopping workers");

    pool.shutdown();

    // One grace period covers the consumer and the workers together.
    let deadline = Instant::now() + config.detector.shutdown_grace;

    match tokio::time::timeout_at(deadline, consumer_handle).await {
        Ok(Ok(stats)) => info!(?stats, "Queue consumer stopped"),
        Ok(Err(e)) => warn!(error = %e, "Queue consumer task failed"),
        Err(_) => warn!("Queue consumer did not stop within the grace period"),
    }

    match pool.wait_until(deadline).await {
        ShutdownOutcome::Clean => {}
        ShutdownOutcome::TimedOut { pending } => {
            warn!(pending, "Exiting with workers still running")
        }
        ShutdownOutcome::Crashed { failed } => warn!(failed, "Some workers had crashed"),
    }

    if let Some(handle) = metrics_handle {
        handle.await.ok();
    }

    let snapshot = metrics.snapshot().await;
    info!(
        guilds = snapshot.guilds_evaluated,
        alerts = snapshot.alerts_published,
        "detector-worker exited"
    );
    drop(sentry_guard);
    Ok(())
}
