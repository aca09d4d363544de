//! Single-assignment value-or-failure cell
//!
//! A `ResultCell` is written once by whoever runs a computation (usually an
//! executor thread) and read once by whoever waits for it (usually the task
//! resumed afterwards). A panic inside the computation is captured as a
//! [`Failure`] and re-raised on the reading side instead of on the thread
//! that happened to run the closure.
//!
//! Unit results, references and owned values all go through the same cell;
//! `ResultCell<()>`, `ResultCell<&mut Buf>` and `ResultCell<Message>` differ
//! only in `T`.

use core::fmt;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Captured panic payload
///
/// Owns the payload so it can cross threads and be re-raised with the
/// original message intact.
pub struct Failure {
    payload: Box<dyn Any + Send + 'static>,
}

impl Failure {
    /// Wrap a payload returned by `catch_unwind`
    pub fn from_panic(payload: Box<dyn Any + Send + 'static>) -> Self {
        Failure { payload }
    }

    /// Build a failure carrying a plain message
    pub fn msg(message: &str) -> Self {
        Failure { payload: Box::new(message.to_string()) }
    }

    /// Panic message, if the payload is a string
    pub fn message(&self) -> &str {
        if let Some(s) = self.payload.downcast_ref::<&'static str>() {
            s
        } else if let Some(s) = self.payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "<non-string panic payload>"
        }
    }

    /// Continue unwinding with the original payload
    pub fn resume(self) -> ! {
        panic::resume_unwind(self.payload)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Failure").field(&self.message()).finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// What a cell currently holds
#[derive(Debug)]
pub enum Outcome<T> {
    Empty,
    Value(T),
    Failed(Failure),
}

/// Single-assignment container for a value or a captured failure
#[derive(Debug)]
pub struct ResultCell<T> {
    outcome: Outcome<T>,
}

impl<T> ResultCell<T> {
    #[inline]
    pub const fn new() -> Self {
        ResultCell { outcome: Outcome::Empty }
    }

    /// Run `f` and capture its value or panic into a fresh cell
    pub fn capture<F>(f: F) -> Self
    where
        F: FnOnce() -> T,
    {
        let mut cell = ResultCell::new();
        cell.execute(f);
        cell
    }

    /// Run `f`, storing its return value or its panic
    ///
    /// Never unwinds. The cell must be empty.
    pub fn execute<F>(&mut self, f: F)
    where
        F: FnOnce() -> T,
    {
        debug_assert!(self.is_empty(), "ResultCell written twice");
        self.outcome = match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Outcome::Value(value),
            Err(payload) => Outcome::Failed(Failure::from_panic(payload)),
        };
    }

    pub fn set(&mut self, value: T) {
        debug_assert!(self.is_empty(), "ResultCell written twice");
        self.outcome = Outcome::Value(value);
    }

    pub fn fail(&mut self, failure: Failure) {
        debug_assert!(self.is_empty(), "ResultCell written twice");
        self.outcome = Outcome::Failed(failure);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self.outcome, Outcome::Empty)
    }

    /// Holds a value or a failure
    #[inline]
    pub fn is_set(&self) -> bool {
        !self.is_empty()
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }

    /// Borrow the stored value, re-raising a captured failure
    ///
    /// The failure is moved out before unwinding, so it is raised at most
    /// once; the cell is empty afterwards.
    pub fn get_mut(&mut self) -> &mut T {
        if self.is_failed() {
            if let Outcome::Failed(failure) = core::mem::replace(&mut self.outcome, Outcome::Empty) {
                failure.resume();
            }
        }
        match &mut self.outcome {
            Outcome::Value(value) => value,
            _ => panic!("ResultCell read before it was written"),
        }
    }

    /// Move the value out, re-raising a captured failure
    pub fn take(&mut self) -> T {
        match self.take_result() {
            Some(Ok(value)) => value,
            Some(Err(failure)) => failure.resume(),
            None => panic!("ResultCell read before it was written"),
        }
    }

    /// Move the outcome out without unwinding; `None` while empty
    pub fn take_result(&mut self) -> Option<Result<T, Failure>> {
        match core::mem::replace(&mut self.outcome, Outcome::Empty) {
            Outcome::Empty => None,
            Outcome::Value(value) => Some(Ok(value)),
            Outcome::Failed(failure) => Some(Err(failure)),
        }
    }

    pub fn into_value(mut self) -> T {
        self.take()
    }

    /// Non-unwinding view of a written cell
    ///
    /// # Panics
    ///
    /// If the cell was never written.
    pub fn into_result(mut self) -> Result<T, Failure> {
        match self.take_result() {
            Some(result) => result,
            None => panic!("ResultCell read before it was written"),
        }
    }

    pub fn outcome(&self) -> &Outcome<T> {
        &self.outcome
    }
}

impl<T> Default for ResultCell<T> {
    fn default() -> Self {
        ResultCell::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_value() {
        let cell = ResultCell::capture(|| 42);
        assert!(cell.is_set());
        assert!(!cell.is_failed());
        assert_eq!(cell.into_value(), 42);
    }

    #[test]
    fn test_execute_panic_reraised_once() {
        let mut cell: ResultCell<u32> = ResultCell::capture(|| panic!("disk on fire"));
        assert!(cell.is_failed());

        let caught = panic::catch_unwind(AssertUnwindSafe(|| cell.take()));
        let payload = caught.unwrap_err();
        assert_eq!(Failure::from_panic(payload).message(), "disk on fire");

        // Failure was consumed by the first read
        assert!(cell.is_empty());
        assert!(cell.take_result().is_none());
    }

    #[test]
    fn test_unit_result() {
        let mut cell = ResultCell::new();
        cell.execute(|| ());
        assert!(cell.into_result().is_ok());
    }

    #[test]
    fn test_reference_result() {
        let mut buffer = vec![1, 2, 3];
        let target = &mut buffer;
        let mut cell = ResultCell::new();
        cell.execute(move || target);
        cell.get_mut().push(4);
        drop(cell);
        assert_eq!(buffer, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_owned_non_trivial_value() {
        let mut cell = ResultCell::new();
        cell.set(String::from("moved"));
        assert_eq!(cell.get_mut().len(), 5);
        assert_eq!(cell.take(), "moved");
        assert!(cell.is_empty());
    }

    #[test]
    fn test_into_result_failure() {
        let mut cell: ResultCell<()> = ResultCell::new();
        cell.fail(Failure::msg("explicit"));
        let err = cell.into_result().unwrap_err();
        assert_eq!(err.to_string(), "explicit");
        assert_eq!(format!("{:?}", err), "Failure(\"explicit\")");
    }

    #[test]
    fn test_failure_resume_keeps_payload() {
        let failure = Failure::msg("again");
        let caught = panic::catch_unwind(AssertUnwindSafe(|| failure.resume()));
        let payload = caught.unwrap_err();
        assert_eq!(payload.downcast_ref::<String>().map(String::as_str), Some("again"));
    }

    #[test]
    #[should_panic(expected = "read before it was written")]
    fn test_empty_read_panics() {
        let mut cell: ResultCell<u8> = ResultCell::new();
        cell.take();
    }
}
