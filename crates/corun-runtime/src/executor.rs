//! Single-worker executor
//!
//! One `BoundedSlotQueue` of work items, one dedicated OS thread and one
//! counting semaphore. Every submit releases one permit; the worker takes a
//! permit, pops one item and invokes it. Stop releases one extra permit so
//! the worker wakes, sees the stop flag and cancels whatever is still queued.
//!
//! ```text
//! Idle ──thread up──▶ Running ──stop seen──▶ Draining ──queue empty──▶ Stopped
//! ```

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{self, AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};

use corun_core::{kdebug, kerror, kwarn};
use corun_core::{Backoff, BoundedSlotQueue, ExecutorState, Failure, Job, WorkItem};
use corun_core::{RuntimeError, RuntimeResult, WorkerError};
use crate::config::ExecutorConfig;
use crate::semaphore::{CountingSignal, Semaphore};
use crate::trampoline::ResumeHandle;
use crate::tls;

/// State shared between the executor, its handles and its worker thread
struct Shared {
    queue: BoundedSlotQueue<Job>,
    signal: Semaphore,
    state: AtomicU8,
    stop: AtomicBool,
    name: String,
    submit_spins: u32,
    executed: AtomicU64,
    cancelled: AtomicU64,
    panicked: AtomicU64,
}

impl Shared {
    /// Identity used to recognise our own worker thread
    #[inline]
    fn key(&self) -> usize {
        self as *const Shared as usize
    }

    #[inline]
    fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn submit(&self, job: Job) {
        if self.is_stopping() {
            self.cancel_job(job);
            return;
        }

        let on_worker = tls::current_executor() == Some(self.key());
        let mut job = job;
        let mut spins = 0u32;
        let mut backoff = Backoff::new();
        loop {
            match self.queue.try_push(job) {
                Ok(()) => break,
                Err(full) => {
                    job = full.into_inner();
                    if self.is_stopping() {
                        self.cancel_job(job);
                        return;
                    }
                    if on_worker {
                        // Only we drain this queue; make room ourselves
                        self.run_one();
                    } else if spins < self.submit_spins {
                        spins += 1;
                        std::hint::spin_loop();
                    } else {
                        backoff.snooze();
                    }
                }
            }
        }
        self.signal.release();

        // A stop that raced the push may have finished draining already
        atomic::fence(Ordering::SeqCst);
        if self.is_stopping() {
            self.drain();
        }
    }

    /// Pop and invoke one item, consuming its permit
    fn run_one(&self) {
        if !self.signal.try_acquire() {
            return;
        }
        if self.is_stopping() {
            // May be the stop permit; the worker loop still needs it
            self.signal.release();
            return;
        }
        if let Some(job) = self.queue.try_pop() {
            self.run_job(job);
        }
    }

    fn run_job(&self, job: Job) {
        match panic::catch_unwind(AssertUnwindSafe(|| job.invoke())) {
            Ok(()) => {}
            Err(payload) => {
                let failure = Failure::from_panic(payload);
                kerror!("executor {}: work item panicked: {}", self.name, failure);
                self.panicked.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    fn cancel_job(&self, job: Job) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job.cancel())) {
            let failure = Failure::from_panic(payload);
            kerror!("executor {}: cancel hook panicked: {}", self.name, failure);
        }
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Cancel everything still queued
    ///
    /// Relies on `is_empty` being exact once producers observe the stop
    /// flag, which `submit` guarantees by draining after its own push.
    fn drain(&self) -> usize {
        atomic::fence(Ordering::SeqCst);
        let mut drained = 0;
        while !self.queue.is_empty() {
            match self.queue.try_pop() {
                Some(job) => {
                    self.cancel_job(job);
                    drained += 1;
                }
                None => std::hint::spin_loop(),
            }
        }
        drained
    }

    fn request_stop(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            kdebug!("executor {} stop requested", self.name);
            self.signal.release();
        }
    }

    fn set_state(&self, state: ExecutorState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Last owner gone: nothing queued may be dropped uncancelled
        while let Some(job) = self.queue.try_pop() {
            self.cancel_job(job);
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    tls::set_executor(shared.key());
    shared.set_state(ExecutorState::Running);
    kdebug!("executor {} started (capacity={})", shared.name, shared.queue.capacity());

    loop {
        shared.signal.acquire();
        if shared.is_stopping() {
            break;
        }
        if let Some(job) = shared.queue.try_pop() {
            shared.run_job(job);
        }
    }

    shared.set_state(ExecutorState::Draining);
    let drained = shared.drain();
    shared.set_state(ExecutorState::Stopped);
    kdebug!(
        "executor {} stopped (executed={}, drained={})",
        shared.name,
        shared.executed.load(Ordering::Relaxed),
        drained
    );
}

/// Single-threaded executor owning its worker thread
///
/// Dropping the executor stops it, joins the worker and cancels every item
/// that was never run.
pub struct Executor {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Executor {
    /// Start an executor with a queue of `queue_capacity` items
    ///
    /// Other settings come from [`ExecutorConfig::from_env`].
    ///
    /// # Panics
    ///
    /// If `queue_capacity` is invalid or the worker thread cannot be
    /// spawned. Use [`Executor::with_config`] to handle those as errors.
    pub fn new(queue_capacity: usize) -> Self {
        match Self::with_config(ExecutorConfig::from_env().queue_capacity(queue_capacity)) {
            Ok(executor) => executor,
            Err(e) => panic!("failed to start executor: {}", e),
        }
    }

    /// Start an executor from an explicit configuration
    pub fn with_config(config: ExecutorConfig) -> RuntimeResult<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            queue: BoundedSlotQueue::new(config.queue_capacity),
            signal: Semaphore::counting(0),
            state: AtomicU8::new(ExecutorState::Idle as u8),
            stop: AtomicBool::new(false),
            name: config.thread_name.clone(),
            submit_spins: config.submit_spins,
            executed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }

        let worker_shared = Arc::clone(&shared);
        let handle = builder
            .spawn(move || worker_loop(worker_shared))
            .map_err(|e| {
                kerror!("executor {}: failed to spawn worker: {}", config.thread_name, e);
                RuntimeError::Worker(WorkerError::SpawnFailed)
            })?;

        Ok(Executor {
            shared,
            thread: Some(handle),
        })
    }

    /// Enqueue `item` for the worker thread
    ///
    /// Spins while the queue is full. After `stop` the item is cancelled
    /// instead of run.
    pub fn submit<W>(&self, item: W)
    where
        W: WorkItem + 'static,
    {
        self.shared.submit(Box::new(item));
    }

    /// Enqueue an already boxed item
    pub fn submit_job(&self, job: Job) {
        self.shared.submit(job);
    }

    /// Cloneable submission handle
    pub fn handle(&self) -> ExecutorHandle {
        ExecutorHandle { shared: Arc::clone(&self.shared) }
    }

    /// Continue the current task on this executor's thread
    pub fn hop(&self) -> Hop {
        self.handle().hop()
    }

    /// Ask the worker to drain and exit; does not wait for it
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    pub fn state(&self) -> ExecutorState {
        ExecutorState::from(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopping()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    /// Items currently queued (approximate)
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Items invoked so far, including ones that panicked
    pub fn executed(&self) -> u64 {
        self.shared.executed.load(Ordering::Relaxed)
    }

    /// Items cancelled instead of invoked
    pub fn cancelled(&self) -> u64 {
        self.shared.cancelled.load(Ordering::Relaxed)
    }

    /// Invoked items that panicked
    pub fn panicked(&self) -> u64 {
        self.shared.panicked.load(Ordering::Relaxed)
    }

    /// Stop and wait for the worker thread to exit
    pub fn shutdown(mut self) -> RuntimeResult<()> {
        self.join_worker()
    }

    fn join_worker(&mut self) -> RuntimeResult<()> {
        self.stop();
        let result = match self.thread.take() {
            Some(handle) if handle.thread().id() == thread::current().id() => {
                // Dropped from one of our own work items; the loop exits
                // and drains after this item returns.
                kwarn!("executor {} dropped on its own worker thread", self.shared.name);
                Ok(())
            }
            Some(handle) => handle.join().map_err(|_| {
                kerror!("executor {}: worker thread panicked", self.shared.name);
                RuntimeError::Worker(WorkerError::Panicked)
            }),
            None => Ok(()),
        };
        self.shared.drain();
        result
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        let _ = self.join_worker();
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Cloneable handle for submitting to an executor
///
/// Outlives a borrow of the executor. Once the executor stopped, submitted
/// items are cancelled right away.
#[derive(Clone)]
pub struct ExecutorHandle {
    shared: Arc<Shared>,
}

impl ExecutorHandle {
    pub fn submit<W>(&self, item: W)
    where
        W: WorkItem + 'static,
    {
        self.shared.submit(Box::new(item));
    }

    pub fn submit_job(&self, job: Job) {
        self.shared.submit(job);
    }

    /// Continue the current task on this executor's thread
    pub fn hop(&self) -> Hop {
        Hop {
            executor: self.clone(),
            arrived: None,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopping()
    }

    /// True on this executor's worker thread
    pub fn is_current(&self) -> bool {
        tls::current_executor() == Some(self.shared.key())
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl std::fmt::Debug for ExecutorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorHandle").field("name", &self.shared.name).finish()
    }
}

/// Future that resumes the awaiting task on an executor's thread
pub struct Hop {
    executor: ExecutorHandle,
    arrived: Option<Arc<AtomicBool>>,
}

struct HopItem {
    arrived: Arc<AtomicBool>,
    resume: ResumeHandle,
}

impl WorkItem for HopItem {
    fn invoke(self: Box<Self>) {
        self.arrived.store(true, Ordering::Release);
        self.resume.resume();
    }

    fn cancel(self: Box<Self>) {
        self.resume.destroy();
    }
}

impl Future for Hop {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match &this.arrived {
            Some(arrived) if arrived.load(Ordering::Acquire) => Poll::Ready(()),
            Some(_) => Poll::Pending,
            None => {
                let arrived = Arc::new(AtomicBool::new(false));
                this.arrived = Some(Arc::clone(&arrived));
                this.executor.submit(HopItem {
                    arrived,
                    resume: ResumeHandle::current(cx),
                });
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corun_core::CancellableFn;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;
    use crate::task::Task;

    fn config(capacity: usize) -> ExecutorConfig {
        ExecutorConfig::new().queue_capacity(capacity).thread_name("test-executor")
    }

    #[test]
    fn test_executes_submitted_items() {
        let executor = Executor::with_config(config(4)).unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            executor.submit(move || {
                let name = thread::current().name().map(str::to_string);
                tx.send((i, name)).unwrap();
            });
        }
        let mut got: Vec<_> = (0..10).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
        got.sort_by_key(|(i, _)| *i);
        assert_eq!(got.iter().map(|(i, _)| *i).collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());
        assert!(got.iter().all(|(_, name)| name.as_deref() == Some("test-executor")));
    }

    #[test]
    fn test_single_producer_order_preserved() {
        let executor = Executor::with_config(config(2)).unwrap();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..100 {
            let seen = Arc::clone(&seen);
            executor.submit(move || seen.lock().unwrap().push(i));
        }
        executor.shutdown().unwrap();
        let seen = seen.lock().unwrap();
        // Items queued at stop are cancelled, the rest ran in order
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_state_transitions() {
        let executor = Executor::with_config(config(2)).unwrap();
        let (tx, rx) = mpsc::channel();
        executor.submit(move || tx.send(()).unwrap());
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(executor.state(), ExecutorState::Running);

        let handle = executor.handle();
        executor.shutdown().unwrap();
        assert!(handle.is_stopped());
    }

    #[test]
    fn test_drain_executes_or_cancels_every_item() {
        const ITEMS: usize = 1000;
        let invoked = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));
        let per_item = Arc::new((0..ITEMS).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());

        {
            let executor = Executor::with_config(config(16)).unwrap();
            for i in 0..ITEMS {
                let (inv, can) = (Arc::clone(&invoked), Arc::clone(&cancelled));
                let (p1, p2) = (Arc::clone(&per_item), Arc::clone(&per_item));
                executor.submit(CancellableFn::new(
                    move || {
                        inv.fetch_add(1, Ordering::SeqCst);
                        p1[i].fetch_add(1, Ordering::SeqCst);
                    },
                    move || {
                        can.fetch_add(1, Ordering::SeqCst);
                        p2[i].fetch_add(1, Ordering::SeqCst);
                    },
                ));
            }
        }

        let total = invoked.load(Ordering::SeqCst) + cancelled.load(Ordering::SeqCst);
        assert_eq!(total, ITEMS);
        assert!(per_item.iter().all(|n| n.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_submit_after_stop_cancels() {
        let executor = Executor::with_config(config(4)).unwrap();
        let handle = executor.handle();
        executor.shutdown().unwrap();

        let cancelled = Arc::new(AtomicBool::new(false));
        let c = Arc::clone(&cancelled);
        handle.submit(CancellableFn::new(
            || panic!("must not run"),
            move || c.store(true, Ordering::SeqCst),
        ));
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_item_does_not_kill_worker() {
        let executor = Executor::with_config(config(4)).unwrap();
        executor.submit(|| panic!("item exploded"));
        let (tx, rx) = mpsc::channel();
        executor.submit(move || tx.send(42).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        assert_eq!(executor.panicked(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Executor::with_config(config(0)).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidConfig(_)));
    }

    #[test]
    fn test_submit_from_worker_with_full_queue() {
        let executor = Executor::with_config(config(1)).unwrap();
        let handle = executor.handle();
        let (tx, rx) = mpsc::channel();
        executor.submit(move || {
            for i in 0..8 {
                let tx = tx.clone();
                handle.submit(move || tx.send(i).unwrap());
            }
        });
        let mut got: Vec<_> = (0..8).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
        got.sort();
        assert_eq!(got, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_hop_moves_task_to_executor_thread() {
        let executor = Executor::with_config(config(4).thread_name("hop-target")).unwrap();
        let hop = executor.hop();
        let task = Task::new(async move {
            let before = thread::current().name().map(str::to_string);
            hop.await;
            let after = thread::current().name().map(str::to_string);
            (before, after, tls::is_executor_thread())
        });
        let (before, after, on_executor) = task.sync_wait();
        assert_ne!(before.as_deref(), Some("hop-target"));
        assert_eq!(after.as_deref(), Some("hop-target"));
        assert!(on_executor);
    }

    #[test]
    fn test_hop_cancelled_on_stopped_executor() {
        let executor = Executor::with_config(config(4)).unwrap();
        let handle = executor.handle();
        executor.shutdown().unwrap();

        let task = Task::new(async move {
            handle.hop().await;
            1u8
        });
        assert!(matches!(task.try_sync_wait(), Err(RuntimeError::Cancelled)));
    }
}
