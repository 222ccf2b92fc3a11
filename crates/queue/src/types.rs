use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub type JobId = String;

/// Lifecycle of a job. Transitions only move
/// `Waiting → Active → (Completed | Failed | Delayed)`; a `Delayed` job
/// rejoins `Waiting` once its due time passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One unit of background work.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub created_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// When a delayed retry becomes claimable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delayed_until_ms: Option<u64>,
}

/// Options accepted by `enqueue`.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Delay before the job first becomes claimable.
    pub delay_ms: Option<u64>,
    /// Override the queue's configured attempt budget.
    pub max_attempts: Option<u32>,
}

/// Per-queue counts by status, plus the total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
    pub total: usize,
}

impl QueueCounts {
    pub fn absorb(&mut self, other: &QueueCounts) {
        self.waiting += other.waiting;
        self.active += other.active;
        self.completed += other.completed;
        self.failed += other.failed;
        self.delayed += other.delayed;
        self.total += other.total;
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
