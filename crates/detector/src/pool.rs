//! Fixed-size pool of dispatchers sharing one entity channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

use tripwire_core::Guild;

use crate::dispatcher::{Dispatcher, DispatcherSettings};

/// How [`WorkerPool::wait`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every worker returned within the grace period.
    Clean,
    /// The grace period expired with `pending` workers still running.
    TimedOut { pending: usize },
    /// Every worker returned, but `failed` of them ended in a panic.
    Crashed { failed: usize },
}

pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `concurrency` dispatchers competing for guilds on `receiver`.
    pub fn start(
        settings: DispatcherSettings,
        concurrency: usize,
        receiver: mpsc::Receiver<Guild>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..concurrency)
            .map(|id| {
                let dispatcher = Dispatcher::new(
                    id,
                    settings.clone(),
                    Arc::clone(&receiver),
                    shutdown_rx.clone(),
                );
                tokio::spawn(dispatcher.run())
            })
            .collect::<Vec<_>>();

        info!(workers = handles.len(), "Worker pool started");
        Self {
            shutdown_tx,
            handles,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// A receiver that observes this pool's shutdown signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Signal every worker to stop after its current pass. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Wait for all workers to return, giving up after `grace`.
    ///
    /// Workers still running when the grace period expires are left behind.
    pub async fn wait(self, grace: Duration) -> ShutdownOutcome {
        self.wait_until(Instant::now() + grace).await
    }

    /// Like [`WorkerPool::wait`], with an absolute deadline shared with
    /// other shutdown steps.
    pub async fn wait_until(self, deadline: Instant) -> ShutdownOutcome {
        let mut pending = 0;
        let mut failed = 0;

        for mut handle in self.handles {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Worker task failed");
                    failed += 1;
                }
                Err(_) => pending += 1,
            }
        }

        if pending > 0 {
            warn!(pending, "Workers did not stop within the grace period, exiting anyway");
            ShutdownOutcome::TimedOut { pending }
        } else if failed > 0 {
            warn!(failed, "Some workers stopped after a panic");
            ShutdownOutcome::Crashed { failed }
        } else {
            info!("All workers stopped");
            ShutdownOutcome::Clean
        }
    }
}
