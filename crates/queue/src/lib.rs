//! Background job queues: named FIFO queues with delayed retry, a
//! compare-and-swap claim discipline, worker pools, and statistics safe for
//! concurrent polling.
//!
//! Producers enqueue opaque JSON payloads onto a fixed, operator-visible set
//! of queues. Workers claim one job at a time; failures are retried with
//! exponential backoff until attempts are exhausted, after which the job is
//! terminal and visible only through stats. Jobs are never silently dropped.

pub mod backoff;
pub mod error;
pub mod manager;
pub mod types;
pub mod worker;

pub use {
    backoff::BackoffPolicy,
    error::{QueueError, Result},
    manager::{QueueManager, REGISTERED_QUEUES},
    types::{EnqueueOptions, Job, JobId, JobStatus, QueueCounts},
    worker::{JobHandler, WorkerPool},
};
