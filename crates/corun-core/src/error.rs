//! Error types for the corun runtime

use core::fmt;
use crate::result::Failure;

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors surfaced by executors and tasks
///
/// Queue full/empty and stream exhaustion are outcomes, not errors, and
/// never show up here.
#[derive(Debug)]
pub enum RuntimeError {
    /// Task frame was destroyed before it completed
    Cancelled,

    /// Task body or dispatched operation panicked
    Panicked(Failure),

    /// `launch` was called on a task that is already running
    AlreadyLaunched,

    /// Configuration rejected by validation
    InvalidConfig(&'static str),

    /// Worker thread error
    Worker(WorkerError),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Cancelled => write!(f, "task cancelled"),
            RuntimeError::Panicked(failure) => write!(f, "task panicked: {}", failure),
            RuntimeError::AlreadyLaunched => write!(f, "task already launched"),
            RuntimeError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            RuntimeError::Worker(e) => write!(f, "worker error: {}", e),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<WorkerError> for RuntimeError {
    fn from(e: WorkerError) -> Self {
        RuntimeError::Worker(e)
    }
}

impl From<Failure> for RuntimeError {
    fn from(failure: Failure) -> Self {
        RuntimeError::Panicked(failure)
    }
}

/// Executor worker thread errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// OS refused to spawn the worker thread
    SpawnFailed,

    /// Worker thread panicked outside of a work item
    Panicked,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::SpawnFailed => write!(f, "failed to spawn worker thread"),
            WorkerError::Panicked => write!(f, "worker thread panicked"),
        }
    }
}

/// Returned by `try_push` on a full queue, handing the value back
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct QueueFull<T>(pub T);

impl<T> QueueFull<T> {
    /// Recover the rejected value
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueFull(..)")
    }
}

impl<T> fmt::Display for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue full")
    }
}
