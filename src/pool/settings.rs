//! Thread pool settings

use std::time::Duration;
use thiserror::Error;

/// The largest pool size an executor may be configured with
pub const MAX_POOL_SIZE: usize = 50;

const DEFAULT_POOL_SIZE: usize = 5;
const DEFAULT_QUEUE_CAPACITY: usize = 5;
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);
const DEFAULT_THREAD_NAME_PREFIX: &str = "pool-worker";

/// Construction time configuration of a [`ThreadPoolExecutor`](crate::ThreadPoolExecutor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPoolSettings {
    pool_size: usize,
    queue_capacity: usize,
    keep_alive: Duration,
    thread_name_prefix: String,
}

impl Default for ThreadPoolSettings {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            keep_alive: DEFAULT_KEEP_ALIVE,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

impl ThreadPoolSettings {
    pub fn new(pool_size: usize, queue_capacity: usize, keep_alive: Duration) -> Self {
        Self {
            pool_size,
            queue_capacity,
            keep_alive,
            ..Default::default()
        }
    }

    pub(crate) fn set_pool_size(&mut self, pool_size: usize) {
        self.pool_size = pool_size;
    }

    pub(crate) fn set_queue_capacity(&mut self, queue_capacity: usize) {
        self.queue_capacity = queue_capacity;
    }

    pub(crate) fn set_keep_alive(&mut self, keep_alive: Duration) {
        self.keep_alive = keep_alive;
    }

    pub(crate) fn set_thread_name_prefix(&mut self, prefix: impl Into<String>) {
        self.thread_name_prefix = prefix.into();
    }

    /// Checks that these settings describe a pool that can be built
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(ConfigError::PoolSize {
                size: self.pool_size,
                max: MAX_POOL_SIZE,
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::QueueCapacity);
        }
        Ok(())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// The idle timeout of workers. `None` means idle workers wait forever.
    pub fn keep_alive(&self) -> Option<Duration> {
        (!self.keep_alive.is_zero()).then_some(self.keep_alive)
    }

    pub fn thread_name_prefix(&self) -> &str {
        &self.thread_name_prefix
    }
}

/// Raised when an executor is built from invalid settings
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("pool size must be between 1 and {max}, got {size}")]
    PoolSize { size: usize, max: usize },
    #[error("queue capacity must be at least 1")]
    QueueCapacity,
}
