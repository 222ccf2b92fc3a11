//! The queue manager: job storage, status transitions, claim mutual
//! exclusion, and statistics.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::Arc,
};

use {
    tokio::sync::{Mutex, Notify, RwLock},
    tracing::{debug, info},
};

use convoy_config::QueueConfig;

use crate::{
    backoff::BackoffPolicy,
    error::{QueueError, Result},
    types::{EnqueueOptions, Job, JobId, JobStatus, QueueCounts, now_ms},
};

/// The fixed, operator-visible queue set.
pub const REGISTERED_QUEUES: &[&str] = &[
    "message-processing",
    "whatsapp-sending",
    "telegram-sending",
    "email-sending",
    "webhook-processing",
    "document-processing",
    "analytics",
    "notifications",
];

// ── Per-queue state ──────────────────────────────────────────────────────────

struct QueueState {
    policy: BackoffPolicy,
    max_waiting: usize,
    jobs: HashMap<JobId, Job>,
    /// Claim order. Invariant: ordered by `created_at_ms` ascending.
    waiting: VecDeque<JobId>,
    delayed: Vec<JobId>,
}

impl QueueState {
    /// Move due delayed jobs into the waiting deque, preserving the
    /// by-creation-time claim order.
    fn promote_due(&mut self, now: u64) {
        let mut due: Vec<JobId> = Vec::new();
        self.delayed.retain(|id| {
            let is_due = self
                .jobs
                .get(id)
                .and_then(|j| j.delayed_until_ms)
                .is_some_and(|t| t <= now);
            if is_due {
                due.push(id.clone());
            }
            !is_due
        });

        due.sort_by_key(|id| self.jobs.get(id).map(|j| j.created_at_ms).unwrap_or(0));
        for id in due {
            let created = match self.jobs.get_mut(&id) {
                Some(job) => {
                    job.status = JobStatus::Waiting;
                    job.delayed_until_ms = None;
                    job.created_at_ms
                },
                None => continue,
            };
            // A retried job keeps its original creation time and therefore
            // re-enters ahead of jobs enqueued while it was delayed.
            let pos = self.waiting.partition_point(|other| {
                self.jobs
                    .get(other)
                    .map(|j| j.created_at_ms <= created)
                    .unwrap_or(true)
            });
            self.waiting.insert(pos, id);
        }
    }

    fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for job in self.jobs.values() {
            match job.status {
                JobStatus::Waiting => counts.waiting += 1,
                JobStatus::Active => counts.active += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Delayed => counts.delayed += 1,
            }
            counts.total += 1;
        }
        counts
    }

    fn next_delayed_due_ms(&self) -> Option<u64> {
        self.delayed
            .iter()
            .filter_map(|id| self.jobs.get(id).and_then(|j| j.delayed_until_ms))
            .min()
    }
}

// ── Manager ──────────────────────────────────────────────────────────────────

/// Owns every registered queue. Queues are independent lock domains: a
/// claim in one queue never contends with another queue's workers.
pub struct QueueManager {
    queues: HashMap<String, Mutex<QueueState>>,
    notifiers: HashMap<String, Arc<Notify>>,
    /// job id → queue name, so terminal transitions need only the id.
    index: RwLock<HashMap<JobId, String>>,
}

impl QueueManager {
    /// Build the manager with the standard queue set, resolving per-queue
    /// settings from config.
    pub fn from_config(cfg: &QueueConfig) -> Arc<Self> {
        Self::with_queues(REGISTERED_QUEUES.iter().map(|name| {
            let resolved = cfg.resolve(name);
            (
                (*name).to_string(),
                BackoffPolicy::new(
                    resolved.base_backoff_ms,
                    resolved.backoff_cap_ms,
                    resolved.max_attempts,
                ),
                resolved.max_waiting,
            )
        }))
    }

    /// Build a manager with an explicit queue set (used by tests).
    pub fn with_queues(
        queues: impl IntoIterator<Item = (String, BackoffPolicy, usize)>,
    ) -> Arc<Self> {
        let mut states = HashMap::new();
        let mut notifiers = HashMap::new();
        for (name, policy, max_waiting) in queues {
            notifiers.insert(name.clone(), Arc::new(Notify::new()));
            states.insert(
                name,
                Mutex::new(QueueState {
                    policy,
                    max_waiting,
                    jobs: HashMap::new(),
                    waiting: VecDeque::new(),
                    delayed: Vec::new(),
                }),
            );
        }
        Arc::new(Self {
            queues: states,
            notifiers,
            index: RwLock::new(HashMap::new()),
        })
    }

    pub fn contains(&self, queue: &str) -> bool {
        self.queues.contains_key(queue)
    }

    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Wake handle for workers parked on this queue.
    pub fn notify_handle(&self, queue: &str) -> Option<Arc<Notify>> {
        self.notifiers.get(queue).cloned()
    }

    // ── Producer side ───────────────────────────────────────────────────

    /// Add a job. Returns its id, or `QueueUnknown`/`QueueSaturated`.
    pub async fn enqueue(
        &self,
        queue: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        let state_lock = self
            .queues
            .get(queue)
            .ok_or_else(|| QueueError::unknown(queue))?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = now_ms();

        {
            let mut state = state_lock.lock().await;
            if state.waiting.len() >= state.max_waiting {
                return Err(QueueError::saturated(queue, state.waiting.len()));
            }

            let max_attempts = options.max_attempts.unwrap_or(state.policy.max_attempts);
            let (status, delayed_until_ms) = match options.delay_ms {
                Some(delay) if delay > 0 => (JobStatus::Delayed, Some(now + delay)),
                _ => (JobStatus::Waiting, None),
            };

            let job = Job {
                id: id.clone(),
                queue: queue.to_string(),
                payload,
                status,
                attempts_made: 0,
                max_attempts,
                created_at_ms: now,
                processed_at_ms: None,
                finished_at_ms: None,
                failure_reason: None,
                result: None,
                delayed_until_ms,
            };

            match status {
                JobStatus::Delayed => state.delayed.push(id.clone()),
                _ => state.waiting.push_back(id.clone()),
            }
            state.jobs.insert(id.clone(), job);
        }

        self.index
            .write()
            .await
            .insert(id.clone(), queue.to_string());
        debug!(queue, job_id = %id, "job enqueued");

        if let Some(notify) = self.notifiers.get(queue) {
            notify.notify_one();
        }
        Ok(id)
    }

    // ── Worker side ─────────────────────────────────────────────────────

    /// Claim the next claimable job, if any.
    ///
    /// The whole promotion + pop + mark-active step runs under the queue
    /// lock, so a job can never be handed to two workers.
    pub async fn claim(&self, queue: &str) -> Result<Option<Job>> {
        let state_lock = self
            .queues
            .get(queue)
            .ok_or_else(|| QueueError::unknown(queue))?;
        let mut state = state_lock.lock().await;
        let now = now_ms();
        state.promote_due(now);

        let Some(id) = state.waiting.pop_front() else {
            return Ok(None);
        };
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| QueueError::job_not_found(&id))?;
        job.status = JobStatus::Active;
        job.attempts_made += 1;
        job.processed_at_ms = Some(now);
        debug!(queue, job_id = %id, attempt = job.attempts_made, "job claimed");
        Ok(Some(job.clone()))
    }

    /// Mark an active job completed. Idempotent for already-completed jobs.
    pub async fn complete(&self, job_id: &str, result: Option<serde_json::Value>) -> Result<()> {
        let queue = self.queue_of(job_id).await?;
        let state_lock = self
            .queues
            .get(&queue)
            .ok_or_else(|| QueueError::unknown(&queue))?;
        let mut state = state_lock.lock().await;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::job_not_found(job_id))?;

        match job.status {
            JobStatus::Completed => Ok(()),
            JobStatus::Active => {
                job.status = JobStatus::Completed;
                job.finished_at_ms = Some(now_ms());
                job.result = result;
                debug!(queue = %queue, job_id, "job completed");
                Ok(())
            },
            other => Err(QueueError::invalid_transition(
                job_id,
                format!("complete from {other:?}"),
            )),
        }
    }

    /// Record a failed attempt: schedule a delayed retry while attempts
    /// remain, otherwise mark the job terminally failed.
    pub async fn fail(&self, job_id: &str, reason: &str) -> Result<()> {
        let queue = self.queue_of(job_id).await?;
        let state_lock = self
            .queues
            .get(&queue)
            .ok_or_else(|| QueueError::unknown(&queue))?;
        let mut state = state_lock.lock().await;
        let state = &mut *state;
        let policy = state.policy;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::job_not_found(job_id))?;

        if job.status != JobStatus::Active {
            return Err(QueueError::invalid_transition(
                job_id,
                format!("fail from {:?}", job.status),
            ));
        }

        job.failure_reason = Some(reason.to_string());
        let retry_policy = BackoffPolicy {
            max_attempts: job.max_attempts,
            ..policy
        };
        if retry_policy.retriable(job.attempts_made) {
            let delay = retry_policy.delay_ms(job.attempts_made);
            job.status = JobStatus::Delayed;
            job.delayed_until_ms = Some(now_ms() + delay);
            let id = job.id.clone();
            state.delayed.push(id);
            debug!(queue = %queue, job_id, delay_ms = delay, "job scheduled for retry");
        } else {
            job.status = JobStatus::Failed;
            job.finished_at_ms = Some(now_ms());
            info!(queue = %queue, job_id, attempts = job.attempts_made, reason, "job exhausted retries");
        }

        if let Some(notify) = self.notifiers.get(&queue) {
            notify.notify_one();
        }
        Ok(())
    }

    // ── Observability ───────────────────────────────────────────────────

    /// Counts for one queue, taken under its lock (no mid-transition reads).
    pub async fn stats(&self, queue: &str) -> Result<QueueCounts> {
        let state_lock = self
            .queues
            .get(queue)
            .ok_or_else(|| QueueError::unknown(queue))?;
        let state = state_lock.lock().await;
        Ok(state.counts())
    }

    /// Per-queue counts for every registered queue.
    pub async fn stats_all(&self) -> BTreeMap<String, QueueCounts> {
        let mut all = BTreeMap::new();
        for (name, state_lock) in &self.queues {
            let state = state_lock.lock().await;
            all.insert(name.clone(), state.counts());
        }
        all
    }

    /// Sum of per-queue counts.
    pub async fn stats_aggregate(&self) -> QueueCounts {
        let mut total = QueueCounts::default();
        for counts in self.stats_all().await.values() {
            total.absorb(counts);
        }
        total
    }

    pub async fn waiting_count(&self, queue: &str) -> Result<usize> {
        Ok(self.stats(queue).await?.waiting)
    }

    /// Earliest due time among this queue's delayed jobs.
    pub async fn next_delayed_due_ms(&self, queue: &str) -> Result<Option<u64>> {
        let state_lock = self
            .queues
            .get(queue)
            .ok_or_else(|| QueueError::unknown(queue))?;
        let state = state_lock.lock().await;
        Ok(state.next_delayed_due_ms())
    }

    /// Purge terminal jobs across all queues. In-flight jobs are untouched.
    pub async fn reset_statistics(&self) -> usize {
        let mut cleared = 0;
        for (name, state_lock) in &self.queues {
            let removed: Vec<JobId> = {
                let mut state = state_lock.lock().await;
                let ids: Vec<JobId> = state
                    .jobs
                    .values()
                    .filter(|j| j.status.is_terminal())
                    .map(|j| j.id.clone())
                    .collect();
                for id in &ids {
                    state.jobs.remove(id);
                }
                ids
            };
            cleared += removed.len();
            if !removed.is_empty() {
                let mut index = self.index.write().await;
                for id in &removed {
                    index.remove(id);
                }
                debug!(queue = %name, cleared = removed.len(), "terminal jobs purged");
            }
        }
        info!(cleared, "queue statistics reset");
        cleared
    }

    /// Fetch a snapshot of one job.
    pub async fn get(&self, job_id: &str) -> Result<Job> {
        let queue = self.queue_of(job_id).await?;
        let state_lock = self
            .queues
            .get(&queue)
            .ok_or_else(|| QueueError::unknown(&queue))?;
        let state = state_lock.lock().await;
        state
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| QueueError::job_not_found(job_id))
    }

    async fn queue_of(&self, job_id: &str) -> Result<String> {
        self.index
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| QueueError::job_not_found(job_id))
    }
}
