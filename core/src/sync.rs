//! Small blocking primitives shared by the scheduler and pipe pool (spec.md §5).

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A cancellation token. Every blocking primitive in the scheduler accepts one; firing it
/// wakes any blocked waiter immediately.
#[derive(Clone)]
pub struct CancellationToken(std::sync::Arc<Inner>);

struct Inner {
	flag: Mutex<bool>,
	cv: Condvar,
}

impl CancellationToken {
	pub fn new() -> Self {
		Self(std::sync::Arc::new(Inner { flag: Mutex::new(false), cv: Condvar::new() }))
	}

	pub fn cancel(&self) {
		*self.0.flag.lock().unwrap() = true;
		self.0.cv.notify_all();
	}

	pub fn is_cancelled(&self) -> bool {
		*self.0.flag.lock().unwrap()
	}

	/// Block for up to `timeout` (or indefinitely), returning early if cancelled. Returns
	/// whether the token is cancelled when this returns.
	pub fn wait(&self, timeout: Option<Duration>) -> bool {
		let guard = self.0.flag.lock().unwrap();

		if *guard {
			return true;
		}

		match timeout {
			Some(d) => *self.0.cv.wait_timeout(guard, d).unwrap().0,
			None => *self.0.cv.wait(guard).unwrap(),
		}
	}
}

impl Default for CancellationToken {
	fn default() -> Self {
		Self::new()
	}
}

/// An auto-reset event: `notify` wakes one waiter, and the flag clears the instant a waiter
/// observes it. Used for the scheduler's `output_pipe_ready` wakeup (spec.md §4.6).
pub struct ReadyEvent {
	flag: Mutex<bool>,
	cv: Condvar,
}

impl ReadyEvent {
	pub fn new() -> Self {
		Self { flag: Mutex::new(false), cv: Condvar::new() }
	}

	pub fn notify(&self) {
		*self.flag.lock().unwrap() = true;
		self.cv.notify_one();
	}

	/// Wait until notified or `timeout` elapses (or indefinitely if `None`), then clear the
	/// flag before returning.
	pub fn wait(&self, timeout: Option<Duration>) {
		let mut guard = self.flag.lock().unwrap();

		if !*guard {
			guard = match timeout {
				Some(d) => self.cv.wait_timeout(guard, d).unwrap().0,
				None => self.cv.wait(guard).unwrap(),
			};
		}

		*guard = false;
	}
}

impl Default for ReadyEvent {
	fn default() -> Self {
		Self::new()
	}
}
