//! Stream dispatch: turning blocking stream calls into task suspensions
//!
//! A dispatcher pairs a synchronized stream with an executor. Awaiting
//! `dispatcher.call(datum)` packages the operation into a work item, submits
//! it and suspends the task. The executor thread performs the blocking
//! stream call, stores the outcome in a `ResultCell` and resumes the task,
//! which then continues on the executor thread.
//!
//! ```rust,ignore
//! let reader = ReadDispatcher::new(stream.clone(), executor.handle());
//! let mut msg = Message::default();
//! while reader.read(&mut msg).await.is_good() {
//!     println!("{}", msg.payload);
//! }
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::mem;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use corun_core::{ResultCell, SpinLock, StreamStatus, SyncStream, WorkItem};
use crate::executor::ExecutorHandle;
use crate::trampoline::ResumeHandle;

/// A stream operation a dispatcher can run on the executor thread
pub trait StreamOp<T, S: ?Sized>: Clone + Send + Sync + 'static {
    type Output: Send + 'static;

    fn apply(&self, stream: &S, datum: T) -> Self::Output;
}

/// Read one value into a buffer; yields the status and the buffer back
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOp;

impl<T, S> StreamOp<T, S> for ReadOp
where
    T: Send + 'static,
    S: SyncStream<T> + ?Sized,
{
    type Output = (StreamStatus, T);

    fn apply(&self, stream: &S, mut buf: T) -> (StreamStatus, T) {
        let status = stream.read_sync(&mut buf);
        (status, buf)
    }
}

/// Write one value
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOp;

impl<T, S> StreamOp<T, S> for WriteOp
where
    T: Send + 'static,
    S: SyncStream<T> + ?Sized,
{
    type Output = StreamStatus;

    fn apply(&self, stream: &S, value: T) -> StreamStatus {
        stream.write_sync(value)
    }
}

/// Binds a stream operation to a stream and an executor
pub struct Dispatcher<T, Op, S: ?Sized> {
    stream: Arc<S>,
    executor: ExecutorHandle,
    op: Op,
    _marker: PhantomData<fn(T)>,
}

pub type ReadDispatcher<T, S> = Dispatcher<T, ReadOp, S>;
pub type WriteDispatcher<T, S> = Dispatcher<T, WriteOp, S>;

impl<T, Op, S> Dispatcher<T, Op, S>
where
    T: Send + 'static,
    Op: StreamOp<T, S>,
    S: Send + Sync + ?Sized + 'static,
{
    pub fn new(stream: Arc<S>, executor: ExecutorHandle) -> Self
    where
        Op: Default,
    {
        Self::with_op(stream, executor, Op::default())
    }

    pub fn with_op(stream: Arc<S>, executor: ExecutorHandle, op: Op) -> Self {
        Dispatcher {
            stream,
            executor,
            op,
            _marker: PhantomData,
        }
    }

    /// Run the operation on `datum` from the executor thread
    ///
    /// Resolves to the operation's output. A panic inside the stream call is
    /// re-raised in the awaiting task. Submission happens on first poll.
    pub fn call(&self, datum: T) -> Dispatch<T, Op, S> {
        Dispatch {
            stream: Arc::clone(&self.stream),
            executor: self.executor.clone(),
            op: self.op.clone(),
            stage: Stage::Init(datum),
        }
    }

    pub fn stream(&self) -> &Arc<S> {
        &self.stream
    }

    pub fn executor(&self) -> &ExecutorHandle {
        &self.executor
    }
}

impl<T, Op: Clone, S: ?Sized> Clone for Dispatcher<T, Op, S> {
    fn clone(&self) -> Self {
        Dispatcher {
            stream: Arc::clone(&self.stream),
            executor: self.executor.clone(),
            op: self.op.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, S> Dispatcher<T, ReadOp, S>
where
    T: Default + Send + 'static,
    S: SyncStream<T> + ?Sized + 'static,
{
    /// Read the next value into `buf`
    ///
    /// `buf` is left untouched when the stream reports `Empty`.
    pub fn read<'a>(&self, buf: &'a mut T) -> ReadInto<'a, T, S> {
        let datum = mem::take(buf);
        ReadInto {
            buf,
            inner: self.call(datum),
        }
    }
}

impl<T, S> Dispatcher<T, WriteOp, S>
where
    T: Send + 'static,
    S: SyncStream<T> + ?Sized + 'static,
{
    /// Write `value` to the stream
    pub fn write(&self, value: T) -> Dispatch<T, WriteOp, S> {
        self.call(value)
    }
}

/// Outcome slot shared by a pending dispatch and its work item
struct Slot<R> {
    cell: SpinLock<ResultCell<R>>,
    ready: AtomicBool,
}

enum Stage<T, R> {
    Init(T),
    Submitted(Arc<Slot<R>>),
    Done,
}

/// Future returned by [`Dispatcher::call`]
pub struct Dispatch<T, Op: StreamOp<T, S>, S: ?Sized> {
    stream: Arc<S>,
    executor: ExecutorHandle,
    op: Op,
    stage: Stage<T, Op::Output>,
}

// Never pinned-projected: the datum is moved out on first poll.
impl<T, Op: StreamOp<T, S>, S: ?Sized> Unpin for Dispatch<T, Op, S> {}

impl<T, Op, S> Future for Dispatch<T, Op, S>
where
    T: Send + 'static,
    Op: StreamOp<T, S>,
    S: Send + Sync + ?Sized + 'static,
{
    type Output = Op::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Op::Output> {
        let this = self.get_mut();
        match mem::replace(&mut this.stage, Stage::Done) {
            Stage::Init(datum) => {
                let slot = Arc::new(Slot {
                    cell: SpinLock::new(ResultCell::new()),
                    ready: AtomicBool::new(false),
                });
                this.stage = Stage::Submitted(Arc::clone(&slot));
                this.executor.submit(DispatchItem {
                    stream: Arc::clone(&this.stream),
                    op: this.op.clone(),
                    datum,
                    slot,
                    resume: ResumeHandle::current(cx),
                });
                Poll::Pending
            }
            Stage::Submitted(slot) => {
                if !slot.ready.load(Ordering::Acquire) {
                    this.stage = Stage::Submitted(slot);
                    return Poll::Pending;
                }
                // Re-raises a panic from the stream call
                let output = slot.cell.lock().take();
                Poll::Ready(output)
            }
            Stage::Done => panic!("Dispatch polled after completion"),
        }
    }
}

/// Work item performing one stream operation on the executor thread
struct DispatchItem<T, Op: StreamOp<T, S>, S: ?Sized> {
    stream: Arc<S>,
    op: Op,
    datum: T,
    slot: Arc<Slot<Op::Output>>,
    resume: ResumeHandle,
}

impl<T, Op, S> WorkItem for DispatchItem<T, Op, S>
where
    T: Send + 'static,
    Op: StreamOp<T, S>,
    S: Send + Sync + ?Sized + 'static,
{
    fn invoke(self: Box<Self>) {
        let DispatchItem { stream, op, datum, slot, resume } = *self;

        let mut cell = ResultCell::new();
        cell.execute(|| op.apply(&stream, datum));
        *slot.cell.lock() = cell;
        slot.ready.store(true, Ordering::Release);

        resume.resume();
    }

    fn cancel(self: Box<Self>) {
        self.resume.destroy();
    }
}

/// Future returned by [`ReadDispatcher::read`]
pub struct ReadInto<'a, T: Send + 'static, S: SyncStream<T> + ?Sized> {
    buf: &'a mut T,
    inner: Dispatch<T, ReadOp, S>,
}

impl<'a, T, S> Future for ReadInto<'a, T, S>
where
    T: Send + 'static,
    S: SyncStream<T> + ?Sized + 'static,
{
    type Output = StreamStatus;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<StreamStatus> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll(cx) {
            Poll::Ready((status, value)) => {
                *this.buf = value;
                Poll::Ready(status)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
