//! The unit of work accepted by a [`ThreadPoolExecutor`](crate::ThreadPoolExecutor).

use crate::sync::CancellationToken;
use static_assertions::assert_impl_all;
use std::fmt::{Debug, Formatter};

/// A boxed, fire-and-forget unit of work.
///
/// The task receives the [`CancellationToken`] of the worker running it. After the executor has
/// been shut down the token is cancelled before the task starts, so long running tasks should poll
/// it.
pub struct Task(Box<dyn FnOnce(&CancellationToken) + Send>);

assert_impl_all!(Task: Send);

impl Task {
    /// Creates a task that can observe cancellation
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&CancellationToken) + Send + 'static,
    {
        Task(Box::new(f))
    }

    /// Creates a task that ignores cancellation
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task(Box::new(move |_: &CancellationToken| f()))
    }

    /// Runs this task on the current thread
    pub fn run(self, token: &CancellationToken) {
        (self.0)(token)
    }
}

impl Debug for Task {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}
