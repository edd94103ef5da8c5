use crate::policy::{DiscardPolicy, RejectionPolicy};
use crate::pool::settings::{ConfigError, ThreadPoolSettings};
use crate::pool::ThreadPoolExecutor;
use std::fmt::{Debug, Formatter};
use std::time::Duration;
use tracing::debug;

/// Builds a [`ThreadPoolExecutor`]
pub struct ThreadPoolBuilder {
    settings: ThreadPoolSettings,
    policy: Option<Box<dyn RejectionPolicy>>,
}

impl Default for ThreadPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadPoolBuilder {
    pub fn new() -> Self {
        Self {
            settings: ThreadPoolSettings::default(),
            policy: None,
        }
    }

    /// Starts from existing settings
    pub fn with_settings(mut self, settings: ThreadPoolSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the maximum number of live workers. Must be within `1..=MAX_POOL_SIZE`.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.settings.set_pool_size(pool_size);
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.settings.set_queue_capacity(queue_capacity);
        self
    }

    /// Sets how long an idle worker waits for work before exiting. Zero waits forever.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.settings.set_keep_alive(keep_alive);
        self
    }

    /// Worker threads are named `{prefix}-{id}`
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.settings.set_thread_name_prefix(prefix);
        self
    }

    /// Sets the rejection policy. Defaults to [`DiscardPolicy`].
    pub fn with_rejection_policy<P: RejectionPolicy + 'static>(mut self, policy: P) -> Self {
        self.policy = Some(Box::new(policy));
        self
    }

    /// Validates the settings and creates the executor. No worker is started until the first
    /// submission.
    pub fn build(self) -> Result<ThreadPoolExecutor, ConfigError> {
        self.settings.validate()?;
        debug!(
            pool_size = self.settings.pool_size(),
            queue_capacity = self.settings.queue_capacity(),
            keep_alive = ?self.settings.keep_alive(),
            "building thread pool"
        );
        let policy = self.policy.unwrap_or_else(|| Box::new(DiscardPolicy));
        Ok(ThreadPoolExecutor::with_parts(self.settings, policy))
    }
}

impl Debug for ThreadPoolBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPoolBuilder")
            .field("settings", &self.settings)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::MAX_POOL_SIZE;
    use crate::ExecutorService;

    #[test]
    fn test_build_rejects_bad_pool_size() {
        let err = ThreadPoolBuilder::new().with_pool_size(0).build().unwrap_err();
        assert_eq!(
            err,
            ConfigError::PoolSize {
                size: 0,
                max: MAX_POOL_SIZE
            }
        );
        assert!(ThreadPoolBuilder::new()
            .with_pool_size(MAX_POOL_SIZE + 1)
            .build()
            .is_err());
    }

    #[test]
    fn test_build_applies_settings() {
        let pool = ThreadPoolBuilder::new()
            .with_pool_size(3)
            .with_queue_capacity(7)
            .with_keep_alive(Duration::ZERO)
            .with_thread_name_prefix("test-pool")
            .build()
            .unwrap();
        assert_eq!(pool.pool_size(), 3);
        assert_eq!(pool.queue_capacity(), 7);
        assert_eq!(pool.keep_alive(), None);
        assert_eq!(pool.active_workers(), 0);
    }

    #[test]
    fn test_worker_thread_names() {
        let pool = ThreadPoolBuilder::new()
            .with_thread_name_prefix("named")
            .build()
            .unwrap();
        let (tx, rx) = crossbeam::channel::bounded(1);
        pool.execute(move || {
            let _ = tx.send(std::thread::current().name().map(str::to_string));
        })
        .unwrap();
        let name = rx.recv().unwrap();
        assert_eq!(name.as_deref(), Some("named-1"));
        pool.shutdown();
    }
}
