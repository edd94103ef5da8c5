//! The bounded FIFO buffer sitting between submitters and workers

use crate::sync::CancellationToken;
use crate::task::Task;
use crossbeam::channel::{bounded, never, select, Receiver, Sender, TrySendError};
use std::time::Duration;

/// A bounded, thread-safe FIFO of pending tasks.
///
/// Both ends are kept together so the executor and every worker can hold a clone.
#[derive(Clone)]
pub(crate) struct TaskQueue {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Inserts without blocking, handing the task back if the queue is full
    pub fn offer(&self, task: Task) -> Result<(), Task> {
        self.sender.try_send(task).map_err(|e| match e {
            TrySendError::Full(task) | TrySendError::Disconnected(task) => task,
        })
    }

    /// Removes the head of the queue, if any, without blocking
    pub fn poll(&self) -> Option<Task> {
        self.receiver.try_recv().ok()
    }

    /// Removes the head of the queue, waiting for one to arrive.
    ///
    /// Waits at most `keep_alive` if given, otherwise forever. Returns `None` on timeout or once
    /// `token` is cancelled.
    pub fn take(
        &self,
        keep_alive: Option<Duration>,
        token: Option<&CancellationToken>,
    ) -> Option<Task> {
        let never = never::<()>();
        let closed: &Receiver<()> = match token {
            Some(token) if token.is_cancelled() => return None,
            Some(token) => token.closed(),
            None => &never,
        };

        match keep_alive {
            Some(timeout) => select! {
                recv(self.receiver) -> task => task.ok(),
                recv(closed) -> _ => None,
                default(timeout) => None,
            },
            None => select! {
                recv(self.receiver) -> task => task.ok(),
                recv(closed) -> _ => None,
            },
        }
    }

    /// Removes every queued task
    pub fn drain(&self) -> Vec<Task> {
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
