//! Synchronized stream interface
//!
//! Dispatchers drive any blocking, internally synchronized stream through
//! this narrow interface. `corun-runtime` ships a mutex + condvar
//! implementation; tests and embedders can supply their own.

use std::time::SystemTime;

/// Outcome of a stream operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// A message was transferred
    Good,

    /// Stream stopped and drained; nothing was transferred
    Empty,
}

impl StreamStatus {
    #[inline]
    pub fn is_good(self) -> bool {
        self == StreamStatus::Good
    }
}

/// Blocking stream shared between threads
pub trait SyncStream<T>: Send + Sync {
    /// Append `value`, `Empty` if the stream no longer accepts writes
    fn write_sync(&self, value: T) -> StreamStatus;

    /// Block until a value is available and move it into `buf`
    ///
    /// Returns `Empty`, leaving `buf` untouched, once the stream is stopped
    /// and has no buffered values left.
    fn read_sync(&self, buf: &mut T) -> StreamStatus;
}

/// Values that carry a serial number and a timestamp assigned on write
pub trait Stamped {
    fn stamp(&mut self, serial: u64, at: SystemTime);
}
