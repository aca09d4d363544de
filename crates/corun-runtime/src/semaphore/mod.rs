//! Counting and binary semaphores
//!
//! The executor's wake signal is a counting semaphore (one permit per
//! submitted item, plus one for stop). A task's completion signal is a
//! binary semaphore released exactly once when the task finishes.
//!
//! Platform-specific implementations use the most efficient primitive
//! available: a futex word on Linux, `Mutex` + `Condvar` elsewhere.

use std::time::Duration;

/// Permit-counting signal shared between threads
pub trait CountingSignal: Send + Sync {
    /// Block until a permit is available and take it
    fn acquire(&self);

    /// Take a permit if one is available right now
    fn try_acquire(&self) -> bool;

    /// Block for at most `timeout`
    ///
    /// Returns `true` if a permit was taken.
    fn acquire_timeout(&self, timeout: Duration) -> bool;

    /// Return a permit, waking one blocked acquirer
    ///
    /// Saturates at the semaphore's maximum, so releasing a binary
    /// semaphore twice leaves a single permit.
    fn release(&self);

    /// Permits currently available (hint, may be stale)
    fn available(&self) -> u32;
}

/// Upper bound for counting semaphores
pub const MAX_PERMITS: u32 = u32::MAX;

// Portable implementation, always built
mod fallback;
pub use fallback::FallbackSemaphore;

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexSemaphore;
        pub use futex_linux::FutexSemaphore as Semaphore;
    } else {
        pub use fallback::FallbackSemaphore as Semaphore;
    }
}
