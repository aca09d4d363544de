//! Lazily started tasks
//!
//! A `Task` owns a boxed future (its frame), a result cell, a continuation
//! slot and a binary completion semaphore. Nothing runs until the task is
//! launched, awaited through `wait()` or blocked on with `sync_wait()`.
//!
//! Frame states (stored in one `AtomicU8`):
//!
//! ```text
//! CREATED ──launch──▶ RUNNING ──Pending──▶ SUSPENDED ──resume──▶ RUNNING
//!                        │                     │
//!                        │ destroy             │ destroy
//!                        ▼                     ▼
//!                 CANCEL_PENDING ──Pending──▶ CANCELLED
//! RUNNING ──Ready/panic──▶ COMPLETED
//! ```
//!
//! Only the thread that moved the state to RUNNING polls the frame. A resume
//! from another thread that arrives mid-poll waits for the poll to return
//! and then polls on the resuming thread, so a task always continues where
//! it was resumed.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;

use corun_core::{ktrace, kwarn};
use corun_core::{Backoff, Failure, ResultCell, RuntimeError, RuntimeResult, SpinLock, TaskId, TaskState};
use crate::semaphore::{CountingSignal, Semaphore};
use crate::trampoline::{self, Frame, ResumeHandle};
use crate::tls;

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const SUSPENDED: u8 = 2;
const COMPLETED: u8 = 3;
const CANCELLED: u8 = 4;
const CANCEL_PENDING: u8 = 5;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

struct JoinState {
    /// Set once the task completed or was cancelled
    finished: bool,

    /// Continuation to resume (or destroy) when the task finishes
    next: Option<ResumeHandle>,
}

pub(crate) struct TaskCore<T> {
    id: TaskId,
    state: AtomicU8,
    launched: AtomicBool,
    frame: SpinLock<Option<BoxFuture<T>>>,
    result: SpinLock<ResultCell<T>>,
    join: SpinLock<JoinState>,
    done: Semaphore,
}

impl<T: Send + 'static> TaskCore<T> {
    fn new(future: BoxFuture<T>) -> Self {
        TaskCore {
            id: TaskId::next(),
            state: AtomicU8::new(CREATED),
            launched: AtomicBool::new(false),
            frame: SpinLock::new(Some(future)),
            result: SpinLock::new(ResultCell::new()),
            join: SpinLock::new(JoinState { finished: false, next: None }),
            done: Semaphore::binary(0),
        }
    }

    /// Launch through the trampoline unless someone already did
    ///
    /// Returns `false` if the task was already launched.
    fn ensure_launched(self: &Arc<Self>) -> bool {
        if self.launched.swap(true, Ordering::AcqRel) {
            return false;
        }
        trampoline::resume(self.clone());
        true
    }

    fn state(&self) -> TaskState {
        match self.state.load(Ordering::Acquire) {
            CREATED => TaskState::Created,
            RUNNING | CANCEL_PENDING => TaskState::Running,
            SUSPENDED => TaskState::Suspended,
            COMPLETED => TaskState::Completed,
            _ => TaskState::Cancelled,
        }
    }

    /// Claim the right to poll. `false` if the task is finished or being
    /// cancelled.
    ///
    /// Resumes issued on the polling thread are deferred by the trampoline,
    /// so a RUNNING frame seen here is being polled by another thread.
    fn claim(&self) -> bool {
        let mut backoff = Backoff::new();
        loop {
            let current = self.state.load(Ordering::Acquire);
            match current {
                CREATED | SUSPENDED => {
                    if self
                        .state
                        .compare_exchange(current, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return true;
                    }
                }
                RUNNING => backoff.snooze(),
                _ => return false,
            }
        }
    }

    /// After a `Pending` poll
    fn suspend(&self) {
        if self
            .state
            .compare_exchange(RUNNING, SUSPENDED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Destroyed mid-poll
            let frame = self.frame.lock().take();
            drop(frame);
            self.finish_cancel();
        }
    }

    fn complete(&self, outcome: Result<T, Failure>) {
        // Frame is dropped before anyone can observe completion
        let frame = self.frame.lock().take();
        drop(frame);
        {
            let mut cell = self.result.lock();
            match outcome {
                Ok(value) => cell.set(value),
                Err(failure) => cell.fail(failure),
            }
        }
        self.state.store(COMPLETED, Ordering::Release);

        let next = {
            let mut join = self.join.lock();
            join.finished = true;
            join.next.take()
        };
        self.done.release();
        ktrace!("{} completed", self.id);

        if let Some(next) = next {
            next.resume();
        }
    }

    fn finish_cancel(&self) {
        self.state.store(CANCELLED, Ordering::Release);
        let next = {
            let mut join = self.join.lock();
            join.finished = true;
            join.next.take()
        };
        self.done.release();
        ktrace!("{} cancelled", self.id);

        // The awaiting task can never be resumed with a value
        if let Some(next) = next {
            next.destroy();
        }
    }

    /// Outcome of a finished task, consumed once
    fn take_outcome(&self) -> RuntimeResult<T> {
        match self.result.lock().take_result() {
            Some(Ok(value)) => Ok(value),
            Some(Err(failure)) => Err(RuntimeError::Panicked(failure)),
            None => Err(RuntimeError::Cancelled),
        }
    }
}

impl<T: Send + 'static> Frame for TaskCore<T> {
    fn run(self: Arc<Self>) {
        if !self.claim() {
            return;
        }

        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);

        let polled = {
            let mut frame = self.frame.lock();
            let Some(future) = frame.as_mut() else {
                return;
            };
            let _enter = tls::enter(self.clone());
            panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)))
        };

        match polled {
            Ok(Poll::Pending) => self.suspend(),
            Ok(Poll::Ready(value)) => self.complete(Ok(value)),
            Err(payload) => self.complete(Err(Failure::from_panic(payload))),
        }
    }

    fn destroy(self: Arc<Self>) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let next = match current {
                CREATED | SUSPENDED => CANCELLED,
                RUNNING => CANCEL_PENDING,
                _ => return,
            };
            match self.state.compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    if next == CANCELLED {
                        let frame = self.frame.lock().take();
                        drop(frame);
                        self.finish_cancel();
                    }
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn id(&self) -> TaskId {
        self.id
    }
}

impl<T: Send + 'static> Wake for TaskCore<T> {
    fn wake(self: Arc<Self>) {
        trampoline::resume(self);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        trampoline::resume(self.clone());
    }
}

/// Handle to a lazily started asynchronous computation
///
/// Dropping the handle does not cancel a launched task; it keeps running
/// and its result is discarded.
pub struct Task<T> {
    core: Arc<TaskCore<T>>,
}

impl<T: Send + 'static> Task<T> {
    /// Wrap `future` without running it
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Task { core: Arc::new(TaskCore::new(Box::pin(future))) }
    }

    /// Create and launch in one step
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let task = Self::new(future);
        task.core.ensure_launched();
        task
    }

    /// Run the body until its first suspension point or completion
    ///
    /// Called from inside another task's poll, the body starts right after
    /// that poll returns, on the same thread.
    pub fn launch(&self) -> RuntimeResult<()> {
        if self.core.ensure_launched() {
            Ok(())
        } else {
            Err(RuntimeError::AlreadyLaunched)
        }
    }

    /// Await this task from another task
    ///
    /// The awaiting task is resumed exactly once when this one completes.
    /// Launches the task if nobody has yet.
    pub fn wait(self) -> Join<T> {
        Join { core: self.core }
    }

    /// Block the calling thread until the task finishes
    ///
    /// Re-raises a panic from the body.
    ///
    /// # Panics
    ///
    /// If the task was cancelled.
    pub fn sync_wait(self) -> T {
        match self.try_sync_wait() {
            Ok(value) => value,
            Err(RuntimeError::Panicked(failure)) => failure.resume(),
            Err(e) => panic!("sync_wait: {}", e),
        }
    }

    /// Block until the task finishes, reporting failure as an error
    pub fn try_sync_wait(self) -> RuntimeResult<T> {
        if tls::is_in_task() && !self.is_launched() {
            kwarn!("sync_wait on unlaunched {} from inside {}", self.core.id, tls::current_task_id());
        }
        self.core.ensure_launched();
        self.core.done.acquire();
        self.core.take_outcome()
    }

    /// Wait at most `timeout` for the task to finish, without consuming it
    pub fn sync_wait_timeout(&self, timeout: Duration) -> bool {
        self.core.ensure_launched();
        if self.core.done.acquire_timeout(timeout) {
            // Completion stays observable for a later sync_wait
            self.core.done.release();
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.core.id
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        self.core.state()
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.core.state().is_terminated()
    }

    #[inline]
    pub fn is_launched(&self) -> bool {
        self.core.launched.load(Ordering::Acquire)
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("id", &self.core.id).finish()
    }
}

/// Future returned by [`Task::wait`]
pub struct Join<T> {
    core: Arc<TaskCore<T>>,
}

impl<T: Send + 'static> Future for Join<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let core = &self.core;
        {
            let mut join = core.join.lock();
            if !join.finished {
                join.next = Some(ResumeHandle::current(cx));
                drop(join);
                // Lock released first: the launched task may finish on this
                // thread and take the join lock itself.
                core.ensure_launched();
                return Poll::Pending;
            }
        }

        match core.take_outcome() {
            Ok(value) => Poll::Ready(value),
            Err(RuntimeError::Panicked(failure)) => failure.resume(),
            Err(_) => match tls::current_frame() {
                // Awaited task was cancelled: cancel the awaiting one too
                Some(frame) => {
                    frame.destroy();
                    Poll::Pending
                }
                None => panic!("awaited {} was cancelled", core.id),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::thread;

    /// Future that stays pending until `open` is called, then resolves
    #[derive(Clone, Default)]
    struct Gate {
        inner: Arc<Mutex<(bool, Option<Waker>)>>,
    }

    impl Gate {
        fn open(&self) {
            let waker = {
                let mut inner = self.inner.lock().unwrap();
                inner.0 = true;
                inner.1.take()
            };
            if let Some(w) = waker {
                w.wake();
            }
        }
    }

    impl Future for Gate {
        type Output = ();

        fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            let mut inner = self.inner.lock().unwrap();
            if inner.0 {
                Poll::Ready(())
            } else {
                inner.1 = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }

    #[test]
    fn test_task_is_lazy() {
        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        let task = Task::new(async move {
            r.store(true, Ordering::SeqCst);
            7
        });
        assert_eq!(task.state(), TaskState::Created);
        assert!(!task.is_launched());
        assert!(!ran.load(Ordering::SeqCst));

        task.launch().unwrap();
        assert!(task.is_launched());
        assert!(ran.load(Ordering::SeqCst));
        assert!(task.is_finished());
        assert_eq!(task.sync_wait(), 7);
    }

    #[test]
    fn test_second_launch_rejected() {
        let gate = Gate::default();
        let g = gate.clone();
        let task = Task::new(async move { g.await });
        assert!(task.launch().is_ok());
        assert!(matches!(task.launch(), Err(RuntimeError::AlreadyLaunched)));
        assert_eq!(task.state(), TaskState::Suspended);
        gate.open();
        task.sync_wait();
    }

    #[test]
    fn test_sync_wait_across_threads() {
        let gate = Gate::default();
        let g = gate.clone();
        let task = Task::spawn(async move {
            g.await;
            String::from("opened")
        });
        assert!(!task.sync_wait_timeout(Duration::from_millis(10)));

        let opener = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            gate.open();
        });
        assert!(task.sync_wait_timeout(Duration::from_secs(5)));
        // Completion is still observable after the timed wait
        assert_eq!(task.sync_wait(), "opened");
        opener.join().unwrap();
    }

    #[test]
    fn test_sync_wait_timeout_without_bound() {
        let task = Task::new(async { 5u8 });
        assert!(task.sync_wait_timeout(Duration::MAX));
        assert_eq!(task.sync_wait(), 5);
    }

    #[test]
    fn test_panic_reraised_by_sync_wait() {
        let task: Task<u32> = Task::new(async { panic!("body failed") });
        let caught = panic::catch_unwind(AssertUnwindSafe(|| task.sync_wait()));
        let failure = Failure::from_panic(caught.unwrap_err());
        assert_eq!(failure.message(), "body failed");
    }

    #[test]
    fn test_try_sync_wait_reports_panic() {
        let task: Task<()> = Task::new(async { panic!("as error") });
        match task.try_sync_wait() {
            Err(RuntimeError::Panicked(f)) => assert_eq!(f.message(), "as error"),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unobserved_failure_is_inert() {
        let task: Task<()> = Task::spawn(async { panic!("nobody listens") });
        assert!(task.is_finished());
        drop(task);
    }

    #[test]
    fn test_wait_chains_value() {
        let inner = Task::new(async { vec![String::from("a"), String::from("b")] });
        let outer = Task::new(async move {
            let v = inner.wait().await;
            v.join("+")
        });
        assert_eq!(outer.sync_wait(), "a+b");
    }

    #[test]
    fn test_wait_resumes_exactly_once() {
        let gate = Gate::default();
        let g = gate.clone();
        let resumed = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&resumed);

        let b = Task::new(async move {
            g.await;
            41
        });
        let a = Task::spawn(async move {
            let v = b.wait().await;
            r.fetch_add(1, Ordering::SeqCst);
            v + 1
        });
        assert_eq!(a.state(), TaskState::Suspended);
        assert_eq!(resumed.load(Ordering::SeqCst), 0);

        thread::spawn(move || gate.open()).join().unwrap();
        assert_eq!(a.sync_wait(), 42);
        assert_eq!(resumed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wait_reraises_inner_panic() {
        let inner: Task<u8> = Task::new(async { panic!("inner") });
        let outer = Task::new(async move { inner.wait().await });
        match outer.try_sync_wait() {
            Err(RuntimeError::Panicked(f)) => assert_eq!(f.message(), "inner"),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_long_chain_runs_in_constant_stack() {
        let mut task = Task::new(async { 0u32 });
        for _ in 0..10_000 {
            let inner = task;
            task = Task::new(async move { inner.wait().await + 1 });
        }
        // Deep enough to overflow the stack if resumption recursed
        assert_eq!(task.sync_wait(), 10_000);
    }

    #[test]
    fn test_destroy_suspended_task() {
        let gate = Gate::default();
        let g = gate.clone();
        let dropped = Arc::new(AtomicBool::new(false));

        struct OnDrop(Arc<AtomicBool>);
        impl Drop for OnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let guard = OnDrop(Arc::clone(&dropped));
        let task = Task::spawn(async move {
            let _guard = guard;
            g.await;
        });
        assert_eq!(task.state(), TaskState::Suspended);

        task.core.clone().destroy();
        assert_eq!(task.state(), TaskState::Cancelled);
        // Scope guards inside the body run on cancellation
        assert!(dropped.load(Ordering::SeqCst));

        // A late wake is ignored
        gate.open();
        assert!(matches!(task.try_sync_wait(), Err(RuntimeError::Cancelled)));
    }

    #[test]
    fn test_cancellation_cascades_to_waiter() {
        let gate = Gate::default();
        let g = gate.clone();
        let b = Task::new(async move { g.await });
        let b_core = b.core.clone();
        let a = Task::spawn(async move { b.wait().await });

        assert_eq!(a.state(), TaskState::Suspended);
        b_core.destroy();
        assert_eq!(a.state(), TaskState::Cancelled);
        assert!(matches!(a.try_sync_wait(), Err(RuntimeError::Cancelled)));
    }
}
