//! Fallback semaphore using std::sync::Condvar
//!
//! Used on platforms without futex support.

use super::{CountingSignal, MAX_PERMITS};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Condvar-based semaphore (fallback)
pub struct FallbackSemaphore {
    /// Available permits
    count: Mutex<u32>,

    condvar: Condvar,

    max: u32,
}

impl FallbackSemaphore {
    pub fn new(initial: u32, max: u32) -> Self {
        Self {
            count: Mutex::new(initial.min(max)),
            condvar: Condvar::new(),
            max,
        }
    }

    pub fn counting(initial: u32) -> Self {
        Self::new(initial, MAX_PERMITS)
    }

    pub fn binary(initial: u32) -> Self {
        Self::new(initial, 1)
    }
}

impl CountingSignal for FallbackSemaphore {
    fn acquire(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count == 0 {
            count = self.condvar.wait(count).unwrap_or_else(PoisonError::into_inner);
        }
        *count -= 1;
    }

    fn try_acquire(&self) -> bool {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    fn acquire_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.acquire();
            return true;
        };
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .condvar
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            count = guard;
        }
        *count -= 1;
        true
    }

    fn release(&self) {
        {
            let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
            if *count >= self.max {
                return;
            }
            *count += 1;
        }
        self.condvar.notify_one();
    }

    fn available(&self) -> u32 {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
