//! Blocking message stream
//!
//! An unbounded FIFO guarded by a mutex and a condition variable. Writers
//! never block; readers block until a message arrives or the stream is
//! stopped. Every accepted message is stamped with a serial number and the
//! time it was written.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use corun_core::{Stamped, StreamStatus, SyncStream};

/// A payload plus the stamp the stream gave it
#[derive(Debug, Clone, PartialEq)]
pub struct Message<P> {
    pub payload: P,
    pub serial_number: u64,
    pub timestamp: SystemTime,
}

impl<P> Message<P> {
    pub fn new(payload: P) -> Self {
        Message {
            payload,
            serial_number: 0,
            timestamp: SystemTime::UNIX_EPOCH,
        }
    }
}

impl<P: Default> Default for Message<P> {
    fn default() -> Self {
        Message::new(P::default())
    }
}

impl<P> From<P> for Message<P> {
    fn from(payload: P) -> Self {
        Message::new(payload)
    }
}

impl<P> Stamped for Message<P> {
    fn stamp(&mut self, serial: u64, at: SystemTime) {
        self.serial_number = serial;
        self.timestamp = at;
    }
}

struct Inner<T> {
    queue: VecDeque<T>,
    /// Serials start at 1; 0 marks a message the stream never stamped
    next_serial: u64,
}

/// Unbounded blocking stream of stamped messages
pub struct MessageStream<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
    stopped: AtomicBool,
}

impl<T: Stamped + Send> MessageStream<T> {
    pub fn new() -> Self {
        MessageStream {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                next_serial: 1,
            }),
            available: Condvar::new(),
            stopped: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop the stream: blocked readers wake up, and once the queue is
    /// drained every read returns `Empty`
    ///
    /// Writes are still accepted after stop.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // Taken so a reader between its check and its wait cannot miss this
        let _inner = self.lock();
        self.available.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// True while a read could still return `Good`
    pub fn is_open(&self) -> bool {
        !self.is_stopped() || !self.lock().queue.is_empty()
    }

    /// Messages written but not yet read
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Stamped + Send> Default for MessageStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Stamped + Send> SyncStream<T> for MessageStream<T> {
    fn write_sync(&self, mut value: T) -> StreamStatus {
        {
            let mut inner = self.lock();
            let serial = inner.next_serial;
            inner.next_serial += 1;
            value.stamp(serial, SystemTime::now());
            inner.queue.push_back(value);
        }
        self.available.notify_one();
        StreamStatus::Good
    }

    fn read_sync(&self, buf: &mut T) -> StreamStatus {
        let mut inner = self.lock();
        loop {
            if let Some(value) = inner.queue.pop_front() {
                *buf = value;
                return StreamStatus::Good;
            }
            if self.is_stopped() {
                return StreamStatus::Empty;
            }
            inner = self
                .available
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl<T> std::fmt::Debug for MessageStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_serials_follow_write_order() {
        let stream: MessageStream<Message<String>> = MessageStream::new();
        for word in ["a", "b", "c"] {
            assert_eq!(stream.write_sync(Message::from(word.to_string())), StreamStatus::Good);
        }

        let mut msg = Message::default();
        for (serial, word) in (1u64..).zip(["a", "b", "c"]) {
            assert!(stream.read_sync(&mut msg).is_good());
            assert_eq!(msg.payload, word);
            assert_eq!(msg.serial_number, serial);
            assert!(msg.timestamp > SystemTime::UNIX_EPOCH);
        }
        assert!(stream.is_empty());
    }

    #[test]
    fn test_read_blocks_until_write() {
        let stream: Arc<MessageStream<Message<u32>>> = Arc::new(MessageStream::new());
        let s = Arc::clone(&stream);
        let reader = thread::spawn(move || {
            let mut msg = Message::default();
            let status = s.read_sync(&mut msg);
            (status, msg.payload)
        });

        thread::sleep(Duration::from_millis(20));
        stream.write_sync(Message::from(11u32));
        assert_eq!(reader.join().unwrap(), (StreamStatus::Good, 11));
    }

    #[test]
    fn test_stop_wakes_blocked_reader() {
        let stream: Arc<MessageStream<Message<u32>>> = Arc::new(MessageStream::new());
        let s = Arc::clone(&stream);
        let reader = thread::spawn(move || {
            let mut msg = Message::from(5u32);
            let status = s.read_sync(&mut msg);
            (status, msg.payload)
        });

        thread::sleep(Duration::from_millis(20));
        stream.stop();
        // Empty leaves the buffer untouched
        assert_eq!(reader.join().unwrap(), (StreamStatus::Empty, 5));
        assert!(!stream.is_open());
    }

    #[test]
    fn test_stop_drains_queued_messages_first() {
        let stream: MessageStream<Message<u8>> = MessageStream::new();
        stream.write_sync(Message::from(1u8));
        stream.stop();
        // Writes after stop are still accepted
        assert_eq!(stream.write_sync(Message::from(2u8)), StreamStatus::Good);
        assert!(stream.is_open());

        let mut msg = Message::default();
        assert!(stream.read_sync(&mut msg).is_good());
        assert_eq!(msg.payload, 1);
        assert!(stream.read_sync(&mut msg).is_good());
        assert_eq!(msg.payload, 2);
        assert_eq!(stream.read_sync(&mut msg), StreamStatus::Empty);
    }
}
