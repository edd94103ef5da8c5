//! Cooperative cancellation, used in place of thread interruption.

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use static_assertions::assert_impl_all;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::{Acquire, Release};
use std::sync::Arc;
use std::time::Duration;

/// A one-way cancellation signal.
///
/// Every worker owns one token and hands it to each task it runs. Cancelling is cooperative: a task
/// that never looks at its token runs to completion regardless. Clones share the same state.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    cancelled: AtomicBool,
    /// Dropped on cancel, which disconnects `closed` for every waiter at once
    closer: Mutex<Option<Sender<()>>>,
    closed: Receiver<()>,
}

assert_impl_all!(CancellationToken: Send, Sync);

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Creates a token that is not cancelled
    pub fn new() -> Self {
        let (tx, rx) = bounded::<()>(0);
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                closer: Mutex::new(Some(tx)),
                closed: rx,
            }),
        }
    }

    /// Cancels this token. Returns `true` if this call performed the cancellation.
    pub fn cancel(&self) -> bool {
        let sender = self.inner.closer.lock().take();
        // set before the sender drops, so a woken waiter always observes it
        self.inner.cancelled.store(true, Release);
        let cancelled = sender.is_some();
        drop(sender);
        cancelled
    }

    /// Checks whether this token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Acquire)
    }

    /// Sleeps for at most `timeout`, waking early if the token is cancelled.
    ///
    /// Returns `true` if the token was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match self.inner.closed.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) | Ok(()) => self.is_cancelled(),
        }
    }

    /// A receiver that becomes disconnected once this token is cancelled. Meant for `select!`.
    pub(crate) fn closed(&self) -> &Receiver<()> {
        &self.inner.closed
    }
}

impl Debug for CancellationToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
