//! End-to-end: forwarded gateway events → listener → pool → alerts,
//! scored by the built-in ruleset.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};

use common::{context_with_users, RecordingPublisher};
use tripwire_core::User;
use tripwire_detector::{DetectorMetrics, DispatcherSettings, ShutdownOutcome, WorkerPool};
use tripwire_queue::{Disposition, GuildJoinListener};
use tripwire_rules::default_ruleset;

const OWNER: u64 = 80351110224678912;

fn event(id: u64, name: &str, joined_minutes_ago: i64) -> String {
    let joined_at = Utc::now() - chrono::Duration::minutes(joined_minutes_ago);
    serde_json::json!({
        "bot_id": 1,
        "shard_id": 0,
        "event": {
            "op": 0,
            "s": 7,
            "t": "GUILD_CREATE",
            "d": {
                "id": id.to_string(),
                "name": name,
                "owner_id": OWNER.to_string(),
                "joined_at": joined_at.to_rfc3339(),
            }
        }
    })
    .to_string()
}

fn owner_without_avatar() -> User {
    User {
        id: OWNER,
        username: "owner".into(),
        discriminator: None,
        global_name: None,
        avatar: None,
        bot: false,
    }
}

#[tokio::test]
async fn recent_scam_guild_raises_one_alert() {
    let publisher = Arc::new(RecordingPublisher::default());
    let metrics = DetectorMetrics::new();
    let settings = DispatcherSettings::new(
        default_ruleset(),
        context_with_users(vec![owner_without_avatar()]),
        publisher.clone(),
        metrics.clone(),
        Duration::from_secs(10),
    );

    let (tx, rx) = mpsc::channel(10);
    let pool = WorkerPool::start(settings, 2, rx);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = GuildJoinListener::new(tx, Duration::from_secs(3600), shutdown_rx);

    let now = Utc::now();
    assert_eq!(
        listener
            .handle_message(&event(100, "Crypto Support Ticket", 2), now)
            .await
            .unwrap(),
        Disposition::Forwarded
    );
    // Backlog join two hours past the window: dropped before any worker sees it.
    assert_eq!(
        listener
            .handle_message(&event(200, "Crypto Support Ticket", 180), now)
            .await
            .unwrap(),
        Disposition::Stale
    );
    assert_eq!(
        listener
            .handle_message(&event(300, "Knitting Circle", 1), now)
            .await
            .unwrap(),
        Disposition::Forwarded
    );
    drop(listener);

    assert_eq!(pool.wait(Duration::from_secs(5)).await, ShutdownOutcome::Clean);

    let alerts = publisher.published();
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.guild.id, 100);
    // 70 for "support ticket" + 15 for the default avatar.
    assert_eq!(alert.score, 85);
    assert_eq!(alert.rule_scores["Guild name contains \"ticket\""], 70);
    assert_eq!(alert.rule_scores["Owner has default avatar"], 15);
    assert_eq!(alert.rule_scores["Account age"], 0);
    assert_eq!(alert.rule_scores["Guild name advertises cheats"], 0);

    let snap = metrics.snapshot().await;
    assert_eq!(snap.guilds_evaluated, 2);
    assert_eq!(snap.rules["Account age"].evaluations, 2);
    assert_eq!(snap.alerts_published, 1);
}
