//! Workers and their fetch-execute loop

use crate::pool::inner_thread_pool::InnerThreadPool;
use crate::pool::queue::TaskQueue;
use crate::sync::CancellationToken;
use crate::task::Task;
use parking_lot::Mutex;
use static_assertions::assert_impl_all;
use std::any::Any;
use std::fmt::{Debug, Display, Formatter};
use std::num::NonZero;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize};
use std::sync::atomic::Ordering::Relaxed;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use std::{io, thread};
use tracing::{error, error_span, trace, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WorkerId(NonZero<usize>);

impl Display for WorkerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out worker ids. Each executor owns its own generator.
#[derive(Debug)]
pub(crate) struct WorkerIdGenerator {
    next: AtomicUsize,
}

impl WorkerIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicUsize::new(1),
        }
    }

    pub fn next_id(&self) -> WorkerId {
        let id = self.next.fetch_add(1, Relaxed);
        WorkerId(NonZero::new(id).unwrap_or(NonZero::<usize>::MIN))
    }
}

/// The bookkeeping half of a worker, shared between the registry and the worker thread.
pub(crate) struct Worker {
    id: WorkerId,
    name: String,
    /// Held while a task runs. Shutdown only interrupts workers whose lock it can take.
    lock: Mutex<()>,
    token: CancellationToken,
    completed: AtomicU64,
    first_task: Mutex<Option<Task>>,
}

assert_impl_all!(Worker: Send, Sync);

impl Worker {
    pub fn new(id: WorkerId, name: String, first_task: Option<Task>) -> Self {
        Self {
            id,
            name,
            lock: Mutex::new(()),
            token: CancellationToken::new(),
            completed: AtomicU64::new(0),
            first_task: Mutex::new(first_task),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Relaxed)
    }

    pub fn is_busy(&self) -> bool {
        self.lock.is_locked()
    }

    pub fn take_first_task(&self) -> Option<Task> {
        self.first_task.lock().take()
    }

    /// Cancels this worker's token
    pub fn interrupt(&self) {
        if self.token.cancel() {
            trace!(worker = %self.id, "interrupted");
        }
    }

    /// Interrupts this worker only if it is not running a task. Never blocks.
    pub fn try_interrupt(&self) -> bool {
        match self.lock.try_lock() {
            Some(_idle) => {
                self.interrupt();
                true
            }
            None => false,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Debug for Worker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("busy", &self.is_busy())
            .field("completed", &self.completed())
            .finish()
    }
}

/// Why a worker left its run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// No task arrived within the keep-alive time
    Idle,
    /// The worker's token was cancelled while it waited for work
    Interrupted,
    /// A task panicked
    Panicked,
}

impl WorkerExit {
    pub fn is_abrupt(&self) -> bool {
        !matches!(self, WorkerExit::Idle)
    }
}

enum Fetched {
    Task(Task),
    TimedOut,
    Interrupted,
}

/// The execution half of a worker, moved onto its own thread
pub(crate) struct WorkerThread {
    parent_span: Span,
    pool: Weak<InnerThreadPool>,
    worker: Arc<Worker>,
    queue: TaskQueue,
    keep_alive: Option<Duration>,
}

impl WorkerThread {
    pub fn new(pool: &Arc<InnerThreadPool>, worker: Arc<Worker>) -> Self {
        Self {
            parent_span: pool.span().clone(),
            pool: Arc::downgrade(pool),
            worker,
            queue: pool.queue().clone(),
            keep_alive: pool.settings().keep_alive(),
        }
    }

    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(self.worker.name().to_string())
            .spawn(move || self.run())
    }

    fn pool_is_shutdown(&self) -> bool {
        self.pool.upgrade().map_or(true, |pool| pool.is_shutdown())
    }

    fn run(self) {
        error_span!(parent: self.parent_span.clone(), "worker", id = %self.worker.id()).in_scope(
            || {
                trace!("starting worker loop");
                let mut next = self.worker.take_first_task();
                let exit = loop {
                    let task = match next.take() {
                        Some(task) => task,
                        None => match self.get_task() {
                            Fetched::Task(task) => task,
                            Fetched::TimedOut => break WorkerExit::Idle,
                            Fetched::Interrupted => break WorkerExit::Interrupted,
                        },
                    };
                    if let Err(payload) = self.run_task(task) {
                        error!("task panicked: {}", panic_message(payload.as_ref()));
                        break WorkerExit::Panicked;
                    }
                };

                trace!(?exit, completed = self.worker.completed(), "worker finished");
                if let Some(pool) = self.pool.upgrade() {
                    pool.process_worker_exit(&self.worker, exit);
                }
            },
        )
    }

    /// Waits for the next queued task
    fn get_task(&self) -> Fetched {
        if self.pool_is_shutdown() {
            self.worker.interrupt();
        }
        match self.queue.take(self.keep_alive, Some(&self.worker.token)) {
            Some(task) => Fetched::Task(task),
            None if self.worker.is_interrupted() => Fetched::Interrupted,
            None => Fetched::TimedOut,
        }
    }

    fn run_task(&self, task: Task) -> thread::Result<()> {
        let result = {
            let _busy = self.worker.lock.lock();
            if self.pool_is_shutdown() {
                self.worker.interrupt();
            }
            catch_unwind(AssertUnwindSafe(|| task.run(&self.worker.token)))
        };
        self.worker.completed.fetch_add(1, Relaxed);
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
