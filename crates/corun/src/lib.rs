//! # corun - coroutine-style tasks on dedicated executor threads
//!
//! Lazily started tasks, single-worker executors fed by a lock-free bounded
//! MPMC queue, and dispatchers that turn blocking stream calls into task
//! suspension points.
//!
//! ## Quick Start
//!
//! ```ignore
//! use corun::{block_on, Executor, Message, MessageStream, ReadDispatcher, SyncStream};
//! use std::sync::Arc;
//!
//! let stream = Arc::new(MessageStream::new());
//! let executor = Executor::new(3);
//! let reader = ReadDispatcher::new(stream.clone(), executor.handle());
//!
//! stream.write_sync(Message::from(1u32));
//! stream.stop();
//!
//! let got = block_on(async move {
//!     let mut msg = Message::default();
//!     let mut seen = Vec::new();
//!     while reader.read(&mut msg).await.is_good() {
//!         seen.push(msg.payload);
//!     }
//!     seen
//! });
//! assert_eq!(got, vec![1]);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        User Code                         │
//! │        Task::new / wait / sync_wait, dispatcher.read     │
//! └──────────────────────────────────────────────────────────┘
//!                │                            │
//!                ▼                            ▼
//!    ┌──────────────────────┐     ┌──────────────────────────┐
//!    │    Task + Trampoline │◀────│        Executor          │
//!    │  frames, join, done  │     │ BoundedSlotQueue + thread│
//!    └──────────────────────┘     └──────────────────────────┘
//!                                             │
//!                                             ▼
//!                                 ┌──────────────────────────┐
//!                                 │   SyncStream (blocking)  │
//!                                 └──────────────────────────┘
//! ```

use std::future::Future;

// Re-export core types
pub use corun_core::{
    BoundedSlotQueue,
    CancellableFn,
    ExecutorState,
    Failure,
    Job,
    QueueFull,
    ResultCell,
    RuntimeError,
    RuntimeResult,
    Stamped,
    StreamStatus,
    SyncStream,
    TaskId,
    TaskState,
    WorkItem,
    WorkerError,
};

// Re-export kprint macros for debug logging
pub use corun_core::{kerror, kwarn, kinfo, kdebug, ktrace};
pub use corun_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use corun_core::{env_get, env_get_bool, env_get_opt};

// Re-export runtime types
pub use corun_runtime::{
    ConfigError,
    Dispatch,
    Dispatcher,
    Executor,
    ExecutorConfig,
    ExecutorHandle,
    Hop,
    Join,
    Message,
    MessageStream,
    ReadDispatcher,
    ReadInto,
    ReadOp,
    StreamOp,
    Task,
    WriteDispatcher,
    WriteOp,
    current_task_id,
    is_executor_thread,
    is_in_task,
};

/// Run `future` as a task and block the calling thread until it finishes
///
/// A panic in the body is re-raised here.
///
/// # Panics
///
/// If the task is cancelled, e.g. by awaiting a dispatcher whose executor
/// already stopped.
pub fn block_on<F, T>(future: F) -> T
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    Task::new(future).sync_wait()
}

/// Start `future` as a task right away
///
/// Runs on the calling thread until its first suspension point.
pub fn spawn<F, T>(future: F) -> Task<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    Task::spawn(future)
}
