//! Bounded, index-addressable pipe pool with blocking acquire (spec.md §4.6).

use std::sync::{Condvar, Mutex};

use fibre_collections::Slots;

/// A fixed-capacity table of `T` (typically `Arc<PipePair>`), acquired by index.
///
/// Carries its own lock, separate from any lock inside `T` itself — callers take a short
/// lock here to acquire or release a slot, then do their actual I/O lock-free against the
/// cloned value.
pub struct PipePool<T> {
	slots: Mutex<Slots<T>>,
	free: Condvar,
}

impl<T: Clone> PipePool<T> {
	pub fn new(capacity: usize) -> Self {
		Self { slots: Mutex::new(Slots::new(capacity)), free: Condvar::new() }
	}

	pub fn capacity(&self) -> usize {
		self.slots.lock().unwrap().capacity()
	}

	/// Acquire a slot. If `index` is given, lazily construct it with `factory` if empty and
	/// return it unchanged if occupied. If `index` is `None`, block until a free slot exists
	/// and pick the first one.
	pub fn acquire(&self, index: Option<usize>, factory: impl FnOnce() -> T) -> (usize, T) {
		let mut guard = self.slots.lock().unwrap();

		let idx = match index {
			Some(i) => i,
			None => loop {
				if let Some(i) = guard.first_free() {
					break i;
				}

				guard = self.free.wait(guard).unwrap();
			},
		};

		if !guard.is_occupied(idx) {
			guard.put(idx, factory());
		}

		let item = guard.get(idx).expect("slot was just populated").clone();
		(idx, item)
	}

	/// Empty the slot at `index`, waking one waiter blocked in `acquire`.
	pub fn release(&self, index: usize) -> Option<T> {
		let mut guard = self.slots.lock().unwrap();
		let item = guard.take(index);
		self.free.notify_one();
		item
	}

	pub fn get(&self, index: usize) -> Option<T> {
		self.slots.lock().unwrap().get(index).cloned()
	}

	/// A snapshot of every occupied slot. Concurrent mutation may or may not be reflected,
	/// per spec.md §4.6's `active_items` semantics.
	pub fn active_items(&self) -> Vec<(usize, T)> {
		self.slots.lock().unwrap().active().map(|(i, t)| (i, t.clone())).collect()
	}
}
