//! # corun-core
//!
//! Platform-agnostic building blocks for the corun execution core.
//!
//! Nothing in this crate spawns threads or talks to the OS. Thread
//! ownership, blocking and task frames live in `corun-runtime`.
//!
//! ## Modules
//!
//! - `queue` - Bounded lock-free MPMC queue with per-slot hand-off flags
//! - `result` - Single-assignment value-or-failure cell
//! - `work` - Invoke-once work items with optional cancellation
//! - `stream` - Synchronized stream interface consumed by dispatchers
//! - `id` - Task identifier type
//! - `state` - Task and executor state enums
//! - `error` - Error types
//! - `spinlock` - Spinlock and spin-then-yield backoff
//! - `kprint` - Kernel-style leveled logging macros
//! - `env` - Environment variable utilities

pub mod queue;
pub mod result;
pub mod work;
pub mod stream;
pub mod id;
pub mod state;
pub mod error;
pub mod spinlock;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use queue::BoundedSlotQueue;
pub use result::{Failure, ResultCell};
pub use work::{CancellableFn, Job, WorkItem};
pub use stream::{Stamped, StreamStatus, SyncStream};
pub use id::TaskId;
pub use state::{ExecutorState, TaskState};
pub use error::{QueueFull, RuntimeError, RuntimeResult, WorkerError};
pub use spinlock::{Backoff, SpinLock};
pub use env::{env_get, env_get_bool, env_get_opt};

/// Shared constants
pub mod constants {
    /// Cache line size used to pad contended atomics
    pub const CACHE_LINE_SIZE: usize = 64;

    /// Largest queue capacity accepted by configuration validation
    pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

    /// Spins before a `Backoff` starts yielding the OS thread
    pub const SPIN_LIMIT: u32 = 6;
}
