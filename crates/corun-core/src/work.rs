//! Invoke-once work items
//!
//! Anything an executor runs is a `WorkItem`: consumed exactly once, either
//! by `invoke` or, when the executor shuts down first, by `cancel`. Plain
//! closures are work items with a no-op cancel.

/// Deferred unit of work, consumed by exactly one of `invoke` / `cancel`
pub trait WorkItem: Send {
    /// Perform the work
    fn invoke(self: Box<Self>);

    /// Discard the work without performing it
    ///
    /// Called instead of `invoke` for items still queued when their
    /// executor stops.
    fn cancel(self: Box<Self>) {}
}

/// Type-erased work item as stored in executor queues
pub type Job = Box<dyn WorkItem>;

impl<F> WorkItem for F
where
    F: FnOnce() + Send,
{
    #[inline]
    fn invoke(self: Box<Self>) {
        (*self)()
    }
}

type Thunk = Box<dyn FnOnce() + Send>;

/// Closure with an explicit cancellation hook
pub struct CancellableFn {
    call: Thunk,
    on_cancel: Option<Thunk>,
}

impl CancellableFn {
    pub fn new<F, C>(call: F, on_cancel: C) -> Self
    where
        F: FnOnce() + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        CancellableFn {
            call: Box::new(call),
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    /// Wrap a closure that needs no cleanup when cancelled
    pub fn from_fn<F>(call: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        CancellableFn {
            call: Box::new(call),
            on_cancel: None,
        }
    }

    /// Replace the cancellation hook
    pub fn on_cancel<C>(mut self, hook: C) -> Self
    where
        C: FnOnce() + Send + 'static,
    {
        self.on_cancel = Some(Box::new(hook));
        self
    }
}

impl WorkItem for CancellableFn {
    fn invoke(self: Box<Self>) {
        (self.call)()
    }

    fn cancel(self: Box<Self>) {
        if let Some(hook) = self.on_cancel {
            hook()
        }
    }
}
