//! Task and executor state types

use core::fmt;

/// Lifecycle of a task as seen from its handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Created, body not entered yet
    Created = 0,

    /// Body is being polled on some thread
    Running = 1,

    /// Parked at a suspension point, waiting to be resumed
    Suspended = 2,

    /// Body returned or panicked; result is stored
    Completed = 3,

    /// Frame destroyed before completion
    Cancelled = 4,
}

impl TaskState {
    /// Finished one way or the other
    #[inline]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Cancelled)
    }

    #[inline]
    pub const fn is_started(&self) -> bool {
        !matches!(self, TaskState::Created)
    }
}

impl From<u8> for TaskState {
    fn from(v: u8) -> Self {
        match v {
            0 => TaskState::Created,
            1 => TaskState::Running,
            2 => TaskState::Suspended,
            3 => TaskState::Completed,
            _ => TaskState::Cancelled,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Created => write!(f, "created"),
            TaskState::Running => write!(f, "running"),
            TaskState::Suspended => write!(f, "suspended"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Lifecycle of a single-worker executor
///
/// Moves strictly forward: `Idle → Running → Draining → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ExecutorState {
    /// Constructed, worker thread not yet in its loop
    Idle = 0,

    /// Worker is executing items
    Running = 1,

    /// Stop observed, remaining items are being cancelled
    Draining = 2,

    /// Worker thread has exited its loop
    Stopped = 3,
}

impl ExecutorState {
    /// Whether new submissions can still be executed
    #[inline]
    pub const fn accepts_work(&self) -> bool {
        matches!(self, ExecutorState::Idle | ExecutorState::Running)
    }
}

impl From<u8> for ExecutorState {
    fn from(v: u8) -> Self {
        match v {
            0 => ExecutorState::Idle,
            1 => ExecutorState::Running,
            2 => ExecutorState::Draining,
            _ => ExecutorState::Stopped,
        }
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorState::Idle => write!(f, "IDLE"),
            ExecutorState::Running => write!(f, "RUNNING"),
            ExecutorState::Draining => write!(f, "DRAINING"),
            ExecutorState::Stopped => write!(f, "STOPPED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_predicates() {
        assert!(TaskState::Completed.is_terminated());
        assert!(TaskState::Cancelled.is_terminated());
        assert!(!TaskState::Suspended.is_terminated());
        assert!(!TaskState::Created.is_started());
        assert!(TaskState::Running.is_started());
    }

    #[test]
    fn test_task_state_from_u8() {
        for s in [
            TaskState::Created,
            TaskState::Running,
            TaskState::Suspended,
            TaskState::Completed,
            TaskState::Cancelled,
        ] {
            assert_eq!(TaskState::from(s as u8), s);
        }
    }

    #[test]
    fn test_executor_state_ordering() {
        assert!(ExecutorState::Idle < ExecutorState::Running);
        assert!(ExecutorState::Running < ExecutorState::Draining);
        assert!(ExecutorState::Draining < ExecutorState::Stopped);
        assert!(ExecutorState::Running.accepts_work());
        assert!(!ExecutorState::Draining.accepts_work());
        assert_eq!(ExecutorState::from(7), ExecutorState::Stopped);
    }
}
