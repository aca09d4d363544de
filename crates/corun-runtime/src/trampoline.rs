//! Per-thread run loop for task frames
//!
//! Resuming a frame from inside another frame's poll never recurses: the
//! frame is queued and run by the outermost `resume` on this thread once
//! the current poll returns. A chain of tasks handing control to each other
//! therefore runs in constant stack depth.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::Arc;
use std::task::{Context, Waker};
use corun_core::TaskId;
use crate::tls;

/// A resumable task frame
pub(crate) trait Frame: Send + Sync {
    /// Poll the frame until it suspends or finishes
    fn run(self: Arc<Self>);

    /// Drop the frame without finishing it
    fn destroy(self: Arc<Self>);

    fn id(&self) -> TaskId;
}

thread_local! {
    static RUN_QUEUE: RefCell<VecDeque<Arc<dyn Frame>>> = const { RefCell::new(VecDeque::new()) };
    static ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Clears the active flag even if a frame unwinds
struct ActiveGuard;

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        ACTIVE.with(|a| a.set(false));
    }
}

/// Run `frame` now, or after the current frame if one is running here
pub(crate) fn resume(frame: Arc<dyn Frame>) {
    if ACTIVE.with(|a| a.get()) {
        RUN_QUEUE.with(|q| q.borrow_mut().push_back(frame));
        return;
    }

    ACTIVE.with(|a| a.set(true));
    let _guard = ActiveGuard;

    frame.run();
    while let Some(next) = RUN_QUEUE.with(|q| q.borrow_mut().pop_front()) {
        next.run();
    }
}

/// Frames queued behind the running one on this thread
#[cfg(test)]
pub(crate) fn pending() -> usize {
    RUN_QUEUE.with(|q| q.borrow().len())
}

/// Whatever must be poked to continue a suspended computation
pub(crate) enum ResumeHandle {
    /// A task frame, resumed through the trampoline
    Frame(Arc<dyn Frame>),

    /// A foreign future, resumed through its waker
    Waker(Waker),
}

impl ResumeHandle {
    /// Handle for the computation currently polling with `cx`
    pub(crate) fn current(cx: &Context<'_>) -> Self {
        match tls::current_frame() {
            Some(frame) => ResumeHandle::Frame(frame),
            None => ResumeHandle::Waker(cx.waker().clone()),
        }
    }

    pub(crate) fn resume(self) {
        match self {
            ResumeHandle::Frame(frame) => resume(frame),
            ResumeHandle::Waker(waker) => waker.wake(),
        }
    }

    /// Cancel the suspended computation instead of resuming it
    ///
    /// A foreign future cannot be destroyed from here; its waker is just
    /// dropped and it is never woken.
    pub(crate) fn destroy(self) {
        match self {
            ResumeHandle::Frame(frame) => frame.destroy(),
            ResumeHandle::Waker(_) => {}
        }
    }
}

impl std::fmt::Debug for ResumeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResumeHandle::Frame(frame) => write!(f, "ResumeHandle::Frame({})", frame.id()),
            ResumeHandle::Waker(_) => write!(f, "ResumeHandle::Waker"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Frame that records its runs and optionally resumes a successor
    struct Link {
        id: TaskId,
        log: Arc<Mutex<Vec<(u64, usize)>>>,
        next: Mutex<Option<Arc<Link>>>,
    }

    impl Frame for Link {
        fn run(self: Arc<Self>) {
            let depth = pending();
            self.log.lock().unwrap().push((self.id.as_u64(), depth));
            if let Some(next) = self.next.lock().unwrap().take() {
                resume(next);
                // Deferred, not run inline
                assert_eq!(pending(), depth + 1);
            }
        }

        fn destroy(self: Arc<Self>) {}

        fn id(&self) -> TaskId {
            self.id
        }
    }

    #[test]
    fn test_nested_resume_is_deferred() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain: Option<Arc<Link>> = None;
        for _ in 0..1000 {
            chain = Some(Arc::new(Link {
                id: TaskId::next(),
                log: Arc::clone(&log),
                next: Mutex::new(chain.take()),
            }));
        }

        let head = chain.unwrap();
        let first = head.id.as_u64();
        resume(head);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1000);
        assert_eq!(log[0].0, first);
        // Run queue never grows beyond one pending frame
        assert!(log.iter().all(|&(_, depth)| depth == 0));
        assert_eq!(pending(), 0);
    }
}
