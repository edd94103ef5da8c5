#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/", env!("CARGO_PKG_README")))]

pub mod policy;
mod pool;
pub mod sync;
mod task;

pub use pool::*;
pub use sync::CancellationToken;
pub use task::Task;
