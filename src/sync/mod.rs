//! Synchronization primitives shared between the executor and its tasks

mod cancellation;

pub use cancellation::CancellationToken;
