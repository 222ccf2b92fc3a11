//! Worker pools: per-queue tasks that claim jobs, run a handler, and report
//! the terminal outcome back to the manager.

use std::{collections::HashSet, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    tokio::{sync::Mutex, task::JoinHandle},
    tracing::{debug, error, info, warn},
};

use crate::{
    error::Result,
    manager::QueueManager,
    types::{Job, now_ms},
};

/// Longest a worker parks with no wake signal before re-checking its queue.
const IDLE_PARK_MS: u64 = 1_000;

/// Executes one job. Returning `Err` counts the attempt as failed and
/// triggers the queue's retry/backoff policy.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> anyhow::Result<serde_json::Value>;
}

/// Spawns and owns worker tasks for handled queues.
pub struct WorkerPool {
    manager: Arc<QueueManager>,
    shutdown: tokio_util::sync::CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    handled: Mutex<HashSet<String>>,
}

impl WorkerPool {
    pub fn new(manager: Arc<QueueManager>) -> Self {
        Self {
            manager,
            shutdown: tokio_util::sync::CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
            handled: Mutex::new(HashSet::new()),
        }
    }

    /// Spawn `workers` tasks pulling from `queue` through `handler`.
    pub async fn start(
        &self,
        queue: &str,
        handler: Arc<dyn JobHandler>,
        workers: usize,
    ) -> Result<()> {
        // Validate the queue name up front so a typo fails at wiring time.
        self.manager.stats(queue).await?;

        let mut handles = self.handles.lock().await;
        for n in 0..workers.max(1) {
            let manager = Arc::clone(&self.manager);
            let handler = Arc::clone(&handler);
            let token = self.shutdown.clone();
            let queue = queue.to_string();
            handles.push(tokio::spawn(async move {
                worker_loop(&manager, &queue, n, handler, token).await;
            }));
        }
        self.handled.lock().await.insert(queue.to_string());
        info!(queue, workers = workers.max(1), "queue workers started");
        Ok(())
    }

    /// Queues that have at least one worker attached.
    pub async fn handled_queues(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handled.lock().await.iter().cloned().collect();
        names.sort();
        names
    }

    /// Stop all workers and wait for them to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task join failed");
            }
        }
        info!("worker pool stopped");
    }
}

async fn worker_loop(
    manager: &Arc<QueueManager>,
    queue: &str,
    worker_id: usize,
    handler: Arc<dyn JobHandler>,
    token: tokio_util::sync::CancellationToken,
) {
    let notify = manager.notify_handle(queue);
    debug!(queue, worker_id, "worker started");

    while !token.is_cancelled() {
        let job = match manager.claim(queue).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                // Park until new work arrives, a delayed job comes due, or
                // shutdown. The fallback tick bounds clock drift.
                let due_in = manager
                    .next_delayed_due_ms(queue)
                    .await
                    .ok()
                    .flatten()
                    .map(|due| due.saturating_sub(now_ms()))
                    .unwrap_or(IDLE_PARK_MS)
                    .min(IDLE_PARK_MS)
                    .max(10);
                match notify {
                    Some(ref n) => {
                        tokio::select! {
                            () = token.cancelled() => break,
                            () = n.notified() => {},
                            () = tokio::time::sleep(Duration::from_millis(due_in)) => {},
                        }
                    },
                    None => {
                        tokio::select! {
                            () = token.cancelled() => break,
                            () = tokio::time::sleep(Duration::from_millis(due_in)) => {},
                        }
                    },
                }
                continue;
            },
            Err(e) => {
                error!(queue, error = %e, "claim failed, worker exiting");
                break;
            },
        };

        let job_id = job.id.clone();
        match handler.handle(&job).await {
            Ok(result) => {
                if let Err(e) = manager.complete(&job_id, Some(result)).await {
                    warn!(queue, job_id = %job_id, error = %e, "complete failed");
                }
            },
            Err(e) => {
                debug!(queue, job_id = %job_id, error = %e, "handler failed");
                if let Err(e) = manager.fail(&job_id, &e.to_string()).await {
                    warn!(queue, job_id = %job_id, error = %e, "fail transition failed");
                }
            },
        }
    }

    debug!(queue, worker_id, "worker stopped");
}
