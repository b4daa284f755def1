use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// FIFO of pending tasks shared by the workers of one batch.
///
/// The queue is filled once when it is built and only drains afterwards,
/// so once `pop` returns `None` it keeps returning `None`. Every item is
/// handed to exactly one caller.
#[derive(Debug)]
pub struct WorkQueue<T> {
	items: Mutex<VecDeque<T>>,
}

impl<T> WorkQueue<T> {
	/// Take the next task, or `None` once the queue is drained.
	pub fn pop(&self) -> Option<T> {
		self.lock().pop_front()
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().is_empty()
	}

	fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
		// pop_front cannot leave the deque half-updated, so a poisoned lock is still usable
		self.items.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

impl<T> FromIterator<T> for WorkQueue<T> {
	fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
		Self { items: Mutex::new(iter.into_iter().collect()) }
	}
}
