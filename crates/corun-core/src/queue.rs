//! Bounded lock-free MPMC queue with per-slot hand-off flags
//!
//! A ring of `capacity + 1` slots addressed by two position counters.
//! `head` (next pop) and `tail` (next push) only ever grow; a position maps
//! to slot `pos % (capacity + 1)`. `head == tail` means empty and
//! `tail - head == capacity` means full. A position is never reused, so a
//! claim CAS against a stale snapshot always fails.
//!
//! Producers and consumers first claim a position by CAS on `tail` / `head`,
//! then wait on the claimed slot's status flag:
//!
//! ```text
//! push:  EMPTY ──CAS──▶ BUSY ──write──▶ NOT_EMPTY
//! pop:   NOT_EMPTY ──CAS──▶ BUSY ──take──▶ EMPTY
//! ```
//!
//! The flag is what orders the payload: the claim CAS is `Acquire` and the
//! publishing store is `Release`, so a consumer never reads a half-written
//! slot and a producer never overwrites an unconsumed one. A slow producer
//! may be overtaken on its slot by a producer from the next lap; values are
//! then reordered across producers but never lost or duplicated.

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::Deref;
use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use crate::constants::CACHE_LINE_SIZE;
use crate::error::QueueFull;
use crate::spinlock::Backoff;

const EMPTY: u8 = 0;
const BUSY: u8 = 1;
const NOT_EMPTY: u8 = 2;

/// Keeps `head` and `tail` on separate cache lines
#[repr(align(64))]
struct CachePadded<T> {
    value: T,
}

const _: () = assert!(core::mem::align_of::<CachePadded<u8>>() == CACHE_LINE_SIZE);

impl<T> CachePadded<T> {
    const fn new(value: T) -> Self {
        CachePadded { value }
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

struct Slot<T> {
    status: AtomicU8,
    value: UnsafeCell<Option<T>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Slot {
            status: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(None),
        }
    }

    /// Spin until the slot moves from `from` to `BUSY` under our hands
    #[inline]
    fn claim(&self, from: u8) {
        let mut backoff = Backoff::new();
        while self.status
            .compare_exchange_weak(from, BUSY, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            backoff.snooze();
        }
    }
}

/// Fixed-capacity multi-producer multi-consumer queue
pub struct BoundedSlotQueue<T> {
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    slots: Box<[Slot<T>]>,
    capacity: usize,
}

// Safety: a slot's payload is only touched by the thread that moved its
// status to BUSY.
unsafe impl<T: Send> Send for BoundedSlotQueue<T> {}
unsafe impl<T: Send> Sync for BoundedSlotQueue<T> {}

impl<T> BoundedSlotQueue<T> {
    /// Create a queue holding at most `capacity` values
    ///
    /// # Panics
    ///
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be > 0");
        let slots = (0..=capacity).map(|_| Slot::new()).collect();
        BoundedSlotQueue {
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            slots,
            capacity,
        }
    }

    #[inline]
    fn slot(&self, pos: u64) -> &Slot<T> {
        &self.slots[(pos % self.slots.len() as u64) as usize]
    }

    /// Push `value`, handing it back if the queue is observed full
    ///
    /// Index claims are `AcqRel`: whoever claims after us also sees the
    /// opposing index at least as fresh as we did, so a stale read can only
    /// make the queue look fuller, never emptier.
    pub fn try_push(&self, value: T) -> Result<(), QueueFull<T>> {
        let mut tail = self.tail.load(Ordering::Acquire);
        loop {
            let head = self.head.load(Ordering::Acquire);
            if tail.wrapping_sub(head) >= self.capacity as u64 {
                return Err(QueueFull(value));
            }
            match self.tail.compare_exchange_weak(tail, tail + 1, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(current) => tail = current,
            }
        }

        let slot = self.slot(tail);
        slot.claim(EMPTY);
        // Safety: we own the slot while it is BUSY
        unsafe { *slot.value.get() = Some(value) };
        slot.status.store(NOT_EMPTY, Ordering::Release);
        Ok(())
    }

    /// Pop the value at the head, `None` if the queue is observed empty
    pub fn try_pop(&self) -> Option<T> {
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            if head == self.tail.load(Ordering::Acquire) {
                return None;
            }
            match self.head.compare_exchange_weak(head, head + 1, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(current) => head = current,
            }
        }

        let slot = self.slot(head);
        slot.claim(NOT_EMPTY);
        // Safety: we own the slot while it is BUSY
        let value = unsafe { (*slot.value.get()).take() };
        slot.status.store(EMPTY, Ordering::Release);

        debug_assert!(value.is_some(), "NOT_EMPTY slot without a value");
        value
    }

    /// `head == tail` snapshot
    ///
    /// Only trustworthy once producers have stopped for good: a racing push
    /// may have claimed an index without publishing yet, and a racing pop
    /// may still be moving its value out.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Approximate number of claimed slots
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        // head is stale by the time tail is read; clamp to what fits
        (tail.saturating_sub(head) as usize).min(self.capacity)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> fmt::Debug for BoundedSlotQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedSlotQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
