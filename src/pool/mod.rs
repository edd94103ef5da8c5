//! The bounded, elastic thread pool.
//!
//! Tasks submitted to a [`ThreadPoolExecutor`] are handed straight to a new worker while fewer
//! than `pool_size` workers are registered, buffered in a bounded FIFO once the pool is full, and
//! passed to the [`RejectionPolicy`] when the buffer is full as well.

use crate::policy::{RejectedError, RejectionPolicy};
use crate::pool::inner_thread_pool::{Admission, InnerThreadPool};
use crate::pool::queue::TaskQueue;
use crate::sync::CancellationToken;
use crate::task::Task;
use static_assertions::assert_impl_all;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

pub use builder::ThreadPoolBuilder;
pub use settings::{ConfigError, ThreadPoolSettings, MAX_POOL_SIZE};

mod builder;
mod inner_thread_pool;
mod queue;
mod settings;
mod worker;

/// The executor abstraction
pub trait ExecutorService {
    /// Submits a task for execution. Fire and forget.
    ///
    /// # Errors
    /// [`PoolError::MissingTask`] if `task` is `None`, [`PoolError::Shutdown`] once the executor has
    /// been shut down, and [`PoolError::Rejected`] if the rejection policy refuses the task.
    fn submit(&self, task: Option<Task>) -> Result<(), PoolError>;

    /// Stops accepting tasks and interrupts idle workers. Tasks still queued may never run.
    fn shutdown(&self);

    /// The number of registered workers. This is *not* the configured pool size.
    fn active_workers(&self) -> usize;

    /// Removes the next queued task, waiting up to the keep-alive time (or forever if none is
    /// configured).
    fn get_task(&self) -> Option<Task>;
}

/// Errors visible to a submitter
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no task was given")]
    MissingTask,
    #[error("thread pool has been shut down, no more tasks are accepted")]
    Shutdown,
    #[error(transparent)]
    Rejected(#[from] RejectedError),
}

/// Default [`ExecutorService`] implementation. Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct ThreadPoolExecutor {
    inner: Arc<InnerThreadPool>,
}

assert_impl_all!(ThreadPoolExecutor: Send, Sync);

impl Default for ThreadPoolExecutor {
    fn default() -> Self {
        Self::with_parts(ThreadPoolSettings::default(), Box::new(crate::policy::DiscardPolicy))
    }
}

impl ThreadPoolExecutor {
    /// Creates a thread pool with the default rejection policy
    pub fn new(
        pool_size: usize,
        queue_capacity: usize,
        keep_alive: Duration,
    ) -> Result<Self, ConfigError> {
        Self::builder()
            .with_pool_size(pool_size)
            .with_queue_capacity(queue_capacity)
            .with_keep_alive(keep_alive)
            .build()
    }

    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::new()
    }

    fn with_parts(settings: ThreadPoolSettings, policy: Box<dyn RejectionPolicy>) -> Self {
        Self {
            inner: InnerThreadPool::new(settings, policy),
        }
    }

    /// Wraps `f` in a [`Task`] and submits it
    pub fn execute<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Some(Task::from_fn(f)))
    }

    /// Submits a closure that receives its worker's [`CancellationToken`]
    pub fn execute_cancellable<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: FnOnce(&CancellationToken) + Send + 'static,
    {
        self.submit(Some(Task::new(f)))
    }

    pub fn pool_size(&self) -> usize {
        self.inner.settings().pool_size()
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner.queue().capacity()
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        self.inner.settings().keep_alive()
    }

    /// Tasks waiting in the queue
    pub fn queue_len(&self) -> usize {
        self.inner.queue().len()
    }

    /// Registered workers currently running a task
    pub fn busy_workers(&self) -> usize {
        self.inner.busy_workers()
    }

    /// Tasks run by workers that have exited. Work done by live workers is not counted yet.
    pub fn completed_task_count(&self) -> u64 {
        self.inner.completed_task_count()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown()
    }

    /// Whether the pool is shut down and every worker has exited
    pub fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }

    /// Blocks until the pool has terminated or `timeout` elapses. Returns whether it terminated.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        self.inner.await_termination(timeout)
    }

    /// Shuts down and hands back every task that was still queued
    pub fn shutdown_now(&self) -> Vec<Task> {
        self.inner.shutdown_now()
    }

    pub(crate) fn queue(&self) -> &TaskQueue {
        self.inner.queue()
    }

    /// Runs `task` through admission once more, without consulting the rejection policy. Hands
    /// the task back if the pool is still saturated.
    pub(crate) fn readmit(&self, task: Task) -> Result<(), Task> {
        match self.inner.admit(task) {
            Admission::Saturated(task) => Err(task),
            Admission::Dispatched | Admission::Queued => Ok(()),
        }
    }
}

impl ExecutorService for ThreadPoolExecutor {
    fn submit(&self, task: Option<Task>) -> Result<(), PoolError> {
        let task = task.ok_or(PoolError::MissingTask)?;
        if self.inner.is_shutdown() {
            return Err(PoolError::Shutdown);
        }

        match self.inner.admit(task) {
            Admission::Dispatched => {
                trace!("task dispatched to a new worker");
                Ok(())
            }
            Admission::Queued => {
                trace!(queued = self.queue_len(), "task queued");
                Ok(())
            }
            Admission::Saturated(task) => {
                self.inner.policy().rejected(task, self)?;
                Ok(())
            }
        }
    }

    fn shutdown(&self) {
        self.inner.shutdown()
    }

    fn active_workers(&self) -> usize {
        self.inner.active()
    }

    fn get_task(&self) -> Option<Task> {
        self.inner.get_task()
    }
}

impl Debug for ThreadPoolExecutor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPoolExecutor")
            .field("pool_size", &self.pool_size())
            .field("active_workers", &self.active_workers())
            .field("queued", &self.queue_len())
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}
