//! # corun-runtime
//!
//! Thread-owning half of the corun execution core.
//!
//! This crate provides:
//! - Executors: one worker thread draining one bounded queue
//! - Lazily started tasks with exactly-once continuation resumption
//! - A per-thread trampoline so chained resumptions never recurse
//! - Dispatchers that run blocking stream calls on an executor thread
//! - A mutex + condvar message stream
//! - Counting semaphores (futex on Linux, condvar elsewhere)

pub mod config;
pub mod semaphore;
pub mod tls;
mod trampoline;
pub mod task;
pub mod executor;
pub mod dispatcher;
pub mod stream;

// Re-exports
pub use config::{ConfigError, ExecutorConfig};
pub use semaphore::{CountingSignal, Semaphore};
pub use task::{Join, Task};
pub use executor::{Executor, ExecutorHandle, Hop};
pub use dispatcher::{
    Dispatch, Dispatcher, ReadDispatcher, ReadInto, ReadOp, StreamOp, WriteDispatcher, WriteOp,
};
pub use stream::{Message, MessageStream};
pub use tls::{current_task_id, is_executor_thread, is_in_task};
