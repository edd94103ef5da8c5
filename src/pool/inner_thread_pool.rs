use crate::policy::RejectionPolicy;
use crate::pool::queue::TaskQueue;
use crate::pool::settings::ThreadPoolSettings;
use crate::pool::worker::{Worker, WorkerExit, WorkerId, WorkerIdGenerator, WorkerThread};
use crate::task::Task;
use parking_lot::{Condvar, Mutex};
use static_assertions::assert_impl_all;
use std::collections::HashMap;
use std::sync::atomic::Ordering::{Relaxed, SeqCst};
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, Span};

/// Where [`InnerThreadPool::admit`] placed a task
pub(crate) enum Admission {
    /// Handed to a freshly started worker
    Dispatched,
    /// Buffered in the task queue
    Queued,
    /// No worker slot and no queue space. The task must go to the rejection policy.
    Saturated(Task),
}

pub(crate) struct InnerThreadPool {
    parent: Span,
    settings: ThreadPoolSettings,
    queue: TaskQueue,
    registry: Mutex<WorkerRegistry>,
    terminated: Condvar,
    ids: WorkerIdGenerator,
    active_workers: AtomicUsize,
    shutdown: AtomicBool,
    policy: Box<dyn RejectionPolicy>,
}

#[derive(Default)]
struct WorkerRegistry {
    workers: HashMap<WorkerId, Arc<Worker>>,
    /// Folded in from each worker as it exits
    completed_task_count: u64,
}

impl Drop for InnerThreadPool {
    fn drop(&mut self) {
        self.registry
            .get_mut()
            .workers
            .values()
            .for_each(|worker| worker.interrupt());
    }
}

assert_impl_all!(InnerThreadPool: Send, Sync);

impl InnerThreadPool {
    /// Creates a new [`InnerThreadPool`] with validated settings
    pub fn new(settings: ThreadPoolSettings, policy: Box<dyn RejectionPolicy>) -> Arc<Self> {
        let span = Span::current();
        Arc::new(Self {
            parent: span,
            queue: TaskQueue::new(settings.queue_capacity()),
            settings,
            registry: Mutex::new(WorkerRegistry::default()),
            terminated: Condvar::new(),
            ids: WorkerIdGenerator::new(),
            active_workers: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            policy,
        })
    }

    pub(crate) fn span(&self) -> &Span {
        &self.parent
    }

    pub(crate) fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub(crate) fn settings(&self) -> &ThreadPoolSettings {
        &self.settings
    }

    pub(crate) fn policy(&self) -> &dyn RejectionPolicy {
        self.policy.as_ref()
    }

    pub fn active(&self) -> usize {
        self.active_workers.load(SeqCst)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(SeqCst)
    }

    pub fn is_terminated(&self) -> bool {
        self.is_shutdown() && self.registry.lock().workers.is_empty()
    }

    pub fn completed_task_count(&self) -> u64 {
        self.registry.lock().completed_task_count
    }

    pub fn busy_workers(&self) -> usize {
        self.registry
            .lock()
            .workers
            .values()
            .filter(|worker| worker.is_busy())
            .count()
    }

    /// Claims a worker slot if the pool is under capacity
    fn try_reserve_slot(&self) -> bool {
        let mut current = self.active_workers.load(Relaxed);
        loop {
            if current >= self.settings.pool_size() {
                return false;
            }
            match self
                .active_workers
                .compare_exchange(current, current + 1, SeqCst, Relaxed)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn release_slot(&self) {
        self.active_workers.fetch_sub(1, SeqCst);
    }

    /// Registers and starts a worker carrying `first_task`.
    ///
    /// With `counts_as_new` a fresh slot is claimed first, otherwise the caller hands over a slot it
    /// already owns. The slot is claimed and the worker registered under the registry lock, so a
    /// counted slot always has a registered worker. On failure the slot is released and the first
    /// task handed back.
    pub fn add_worker(
        self: &Arc<Self>,
        first_task: Option<Task>,
        counts_as_new: bool,
    ) -> Result<(), Option<Task>> {
        let id = self.ids.next_id();
        let name = format!("{}-{}", self.settings.thread_name_prefix(), id);
        let worker = Arc::new(Worker::new(id, name, first_task));

        {
            let mut registry = self.registry.lock();
            if self.is_shutdown() {
                if !counts_as_new {
                    self.release_slot();
                }
                drop(registry);
                trace!(%id, "not adding worker to a shut down pool");
                return Err(worker.take_first_task());
            }
            if counts_as_new && !self.try_reserve_slot() {
                drop(registry);
                return Err(worker.take_first_task());
            }
            registry.workers.insert(id, worker.clone());
        }

        match WorkerThread::new(self, worker.clone()).spawn() {
            Ok(_) => {
                trace!(%id, "spawned worker");
                Ok(())
            }
            Err(e) => {
                error!(%id, "could not spawn worker thread: {e}");
                let mut registry = self.registry.lock();
                registry.workers.remove(&id);
                self.release_slot();
                if registry.workers.is_empty() {
                    self.terminated.notify_all();
                }
                drop(registry);
                Err(worker.take_first_task())
            }
        }
    }

    /// Places a task: on a new worker while under capacity, else in the queue.
    pub fn admit(self: &Arc<Self>, task: Task) -> Admission {
        let task = if self.active() < self.settings.pool_size() {
            match self.add_worker(Some(task), true) {
                Ok(()) => return Admission::Dispatched,
                Err(Some(task)) => task,
                Err(None) => unreachable!("a failed worker always hands back its first task"),
            }
        } else {
            task
        };

        match self.queue.offer(task) {
            Ok(()) => {
                // every worker may have exited between the capacity check and the offer
                if self.active() == 0 {
                    let _ = self.add_worker(None, true);
                }
                Admission::Queued
            }
            Err(task) => Admission::Saturated(task),
        }
    }

    /// Blocking fetch on behalf of a caller that is not a worker
    pub fn get_task(&self) -> Option<Task> {
        self.queue.take(self.settings.keep_alive(), None)
    }

    /// Sets the shutdown flag and interrupts every idle worker.
    ///
    /// Busy workers are left alone; they see the flag before their next fetch.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, SeqCst) {
            debug!("thread pool was already shut down");
        }

        let registry = self.registry.lock();
        for worker in registry.workers.values() {
            if worker.try_interrupt() {
                trace!(id = %worker.id(), "interrupted idle worker");
            } else {
                trace!(id = %worker.id(), "worker is busy, it will stop after its current task");
            }
        }
        if registry.workers.is_empty() {
            self.terminated.notify_all();
        }
        debug!(
            workers = registry.workers.len(),
            queued = self.queue.len(),
            "thread pool shut down"
        );
    }

    /// Shuts down, then removes and returns every task still in the queue
    pub fn shutdown_now(&self) -> Vec<Task> {
        self.shutdown();
        let drained = self.queue.drain();
        debug!(drained = drained.len(), "drained task queue");
        drained
    }

    /// Blocks until terminated or `timeout` elapses. A timeout too large to represent waits forever.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut registry = self.registry.lock();
        while !(self.is_shutdown() && registry.workers.is_empty()) {
            match deadline {
                Some(deadline) => {
                    if self
                        .terminated
                        .wait_until(&mut registry, deadline)
                        .timed_out()
                    {
                        return self.is_shutdown() && registry.workers.is_empty();
                    }
                }
                None => self.terminated.wait(&mut registry),
            }
        }
        true
    }

    /// Deregisters an exiting worker and folds in its completed count.
    ///
    /// An abrupt exit with a backlog hands its slot to a replacement worker, and stays registered
    /// until the handover is settled. Any other exit releases its slot, and starts a fresh worker
    /// if tasks are still queued.
    pub(crate) fn process_worker_exit(self: &Arc<Self>, worker: &Worker, exit: WorkerExit) {
        let replace = {
            let mut registry = self.registry.lock();
            registry.completed_task_count += worker.completed();
            let replace = exit.is_abrupt() && !self.queue.is_empty() && !self.is_shutdown();
            if !replace {
                registry.workers.remove(&worker.id());
                self.release_slot();
                if registry.workers.is_empty() {
                    self.terminated.notify_all();
                }
            }
            replace
        };

        if replace {
            trace!(id = %worker.id(), "replacing worker to drain the backlog");
            let _ = self.add_worker(None, false);
            let mut registry = self.registry.lock();
            registry.workers.remove(&worker.id());
            if registry.workers.is_empty() {
                self.terminated.notify_all();
            }
        } else if !self.queue.is_empty() && !self.is_shutdown() {
            let _ = self.add_worker(None, true);
        }
    }
}
