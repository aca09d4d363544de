//! Thread-local storage for task and executor context
//!
//! Provides access to the task frame currently being polled and to the
//! executor owning the current OS thread.

use std::cell::{Cell, RefCell};
use std::sync::Arc;
use corun_core::TaskId;
use crate::trampoline::Frame;

thread_local! {
    /// Frame being polled on this thread, if any
    static CURRENT_FRAME: RefCell<Option<Arc<dyn Frame>>> = const { RefCell::new(None) };

    /// Identity of the executor whose worker runs on this thread, 0 if none
    static EXECUTOR: Cell<usize> = const { Cell::new(0) };
}

/// Restores the previously current frame on drop
pub(crate) struct EnterGuard {
    prev: Option<Arc<dyn Frame>>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT_FRAME.with(|cell| *cell.borrow_mut() = prev);
    }
}

/// Mark `frame` as current for the duration of a poll
#[inline]
pub(crate) fn enter(frame: Arc<dyn Frame>) -> EnterGuard {
    let prev = CURRENT_FRAME.with(|cell| cell.borrow_mut().replace(frame));
    EnterGuard { prev }
}

/// Frame being polled on this thread
#[inline]
pub(crate) fn current_frame() -> Option<Arc<dyn Frame>> {
    CURRENT_FRAME.with(|cell| cell.borrow().clone())
}

/// Id of the task being polled, `TaskId::NONE` outside a task
#[inline]
pub fn current_task_id() -> TaskId {
    CURRENT_FRAME.with(|cell| cell.borrow().as_ref().map_or(TaskId::NONE, |f| f.id()))
}

/// Check if we're running inside a task body
#[inline]
pub fn is_in_task() -> bool {
    CURRENT_FRAME.with(|cell| cell.borrow().is_some())
}

/// Record the executor owning this worker thread
#[inline]
pub(crate) fn set_executor(id: usize) {
    EXECUTOR.with(|cell| cell.set(id));
}

/// Executor identity for this thread, `None` off executor threads
#[inline]
pub(crate) fn current_executor() -> Option<usize> {
    let id = EXECUTOR.with(|cell| cell.get());
    if id == 0 {
        None
    } else {
        Some(id)
    }
}

/// Check if we're on an executor's worker thread
#[inline]
pub fn is_executor_thread() -> bool {
    current_executor().is_some()
}
