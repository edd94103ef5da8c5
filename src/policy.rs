//! Rejection policies, invoked when a task finds neither a free worker slot nor queue space.

use crate::pool::{ExecutorService, ThreadPoolExecutor};
use crate::sync::CancellationToken;
use crate::task::Task;
use std::fmt::{Debug, Formatter};
use thiserror::Error;
use tracing::{debug, warn};

/// Decides what happens to a task the executor could not accept.
///
/// Called synchronously on the submitting thread, exactly once per rejected task. Implementations
/// must not block. Returning an error makes [`submit`](crate::ExecutorService::submit) fail with
/// [`PoolError::Rejected`](crate::PoolError::Rejected).
pub trait RejectionPolicy: Send + Sync {
    fn rejected(&self, task: Task, executor: &ThreadPoolExecutor) -> Result<(), RejectedError>;
}

impl Debug for dyn RejectionPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RejectionPolicy").finish()
    }
}

impl<F> RejectionPolicy for F
where
    F: Fn(Task, &ThreadPoolExecutor) -> Result<(), RejectedError> + Send + Sync,
{
    fn rejected(&self, task: Task, executor: &ThreadPoolExecutor) -> Result<(), RejectedError> {
        (self)(task, executor)
    }
}

/// A rejection policy chose to fail the submission
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("task rejected: {reason}")]
pub struct RejectedError {
    reason: String,
}

impl RejectedError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Logs and drops the task. The default policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardPolicy;

impl RejectionPolicy for DiscardPolicy {
    fn rejected(&self, task: Task, executor: &ThreadPoolExecutor) -> Result<(), RejectedError> {
        warn!(
            active = executor.active_workers(),
            queued = executor.queue_len(),
            "thread pool is saturated, discarding task"
        );
        drop(task);
        Ok(())
    }
}

/// Fails the submission with a [`RejectedError`]
#[derive(Debug, Default, Clone, Copy)]
pub struct AbortPolicy;

impl RejectionPolicy for AbortPolicy {
    fn rejected(&self, _task: Task, executor: &ThreadPoolExecutor) -> Result<(), RejectedError> {
        Err(RejectedError::new(format!(
            "pool of {} workers and queue of {} tasks are full",
            executor.pool_size(),
            executor.queue_capacity()
        )))
    }
}

/// Runs the task on the submitting thread, unless the executor has been shut down
#[derive(Debug, Default, Clone, Copy)]
pub struct CallerRunsPolicy;

impl RejectionPolicy for CallerRunsPolicy {
    fn rejected(&self, task: Task, executor: &ThreadPoolExecutor) -> Result<(), RejectedError> {
        if executor.is_shutdown() {
            warn!("thread pool is shut down, discarding task");
            return Ok(());
        }
        debug!("running rejected task on the caller's thread");
        task.run(&CancellationToken::new());
        Ok(())
    }
}

/// Drops the oldest queued task and admits the rejected one once more. If the pool is still
/// saturated the rejected task is dropped as well.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardOldestPolicy;

impl RejectionPolicy for DiscardOldestPolicy {
    fn rejected(&self, task: Task, executor: &ThreadPoolExecutor) -> Result<(), RejectedError> {
        if executor.is_shutdown() {
            warn!("thread pool is shut down, discarding task");
            return Ok(());
        }
        if executor.queue().poll().is_some() {
            debug!("discarded the oldest queued task");
        }
        if executor.readmit(task).is_err() {
            warn!("thread pool is still saturated, discarding task");
        }
        Ok(())
    }
}
