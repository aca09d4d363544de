//! Linux futex-based semaphore
//!
//! The futex word is the permit count itself. Waiters sleep with
//! FUTEX_WAIT on expected value 0, so a release that lands between the
//! failed `try_acquire` and the syscall makes the kernel return at once.
//!
//! When acquiring:
//! 1. Try to decrement a non-zero count
//! 2. Increment waiters, re-check, FUTEX_WAIT while count == 0
//! 3. Decrement waiters and retry
//!
//! When releasing:
//! 1. Increment count (saturating at max)
//! 2. FUTEX_WAKE one waiter if any are registered

use super::{CountingSignal, MAX_PERMITS};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Futex-backed semaphore
pub struct FutexSemaphore {
    /// Futex word: available permits
    count: AtomicU32,

    /// Threads inside (or about to enter) FUTEX_WAIT
    waiters: AtomicU32,

    max: u32,
}

impl FutexSemaphore {
    pub fn new(initial: u32, max: u32) -> Self {
        Self {
            count: AtomicU32::new(initial.min(max)),
            waiters: AtomicU32::new(0),
            max,
        }
    }

    pub fn counting(initial: u32) -> Self {
        Self::new(initial, MAX_PERMITS)
    }

    pub fn binary(initial: u32) -> Self {
        Self::new(initial, 1)
    }

    fn acquire_until(&self, deadline: Option<Instant>) -> bool {
        loop {
            if self.try_acquire() {
                return true;
            }

            let timeout = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return false;
                    }
                    Some(d - now)
                }
                None => None,
            };

            // Pairs with the SeqCst increment + waiters load in release()
            self.waiters.fetch_add(1, Ordering::SeqCst);
            if self.count.load(Ordering::SeqCst) == 0 {
                futex_wait(&self.count, 0, timeout);
            }
            self.waiters.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl CountingSignal for FutexSemaphore {
    fn acquire(&self) {
        self.acquire_until(None);
    }

    fn try_acquire(&self) -> bool {
        let mut current = self.count.load(Ordering::Relaxed);
        while current > 0 {
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    fn acquire_timeout(&self, timeout: Duration) -> bool {
        // A deadline past what Instant can hold is no deadline
        self.acquire_until(Instant::now().checked_add(timeout))
    }

    fn release(&self) {
        let mut current = self.count.load(Ordering::Relaxed);
        loop {
            if current >= self.max {
                return;
            }
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        if self.waiters.load(Ordering::SeqCst) > 0 {
            futex_wake(&self.count, 1);
        }
    }

    fn available(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }
}

/// FUTEX_WAIT: sleep while `*word == expected`
///
/// Timeouts, EAGAIN and EINTR all just return; callers re-check the count.
fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) {
    let timespec = timeout.map(|d| libc::timespec {
        // Negative tv_sec is EINVAL; clamp very long waits instead
        tv_sec: d.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });

    let timespec_ptr = match &timespec {
        Some(ts) => ts as *const libc::timespec,
        None => std::ptr::null(),
    };

    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            timespec_ptr,
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

/// FUTEX_WAKE: wake up to `n` sleepers on `word`
fn futex_wake(word: &AtomicU32, n: i32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            n,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}
