//! Single-assignment result cell with blocking retrieval.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::time::Duration;

use crate::sync::{ReentrantLock, Signal};

/// The result of a task submitted to a [`crate::pool::TaskPool`].
///
/// The value is written at most once by [`set`](Self::set);
/// [`get`](Self::get) blocks until it exists. Any number of threads may
/// call `get`; all observe the same value. The slot is guarded by the
/// future's own [`ReentrantLock`]/[`Signal`] pair, the same wait
/// protocol the rest of the crate uses.
///
/// A task panic is contained by the pool worker and never reaches the
/// future, so a caller cannot distinguish "task failed" from "task
/// never ran" unless `T` itself encodes failure.
#[derive(Debug)]
pub struct TaskFuture<T> {
    lock: Arc<ReentrantLock>,
    signal: Signal,
    value: UnsafeCell<Option<T>>,
}

// Safety: the value slot is only read or written while `lock` is held,
// and `Signal::wait` keeps that invariant across its release/reacquire
// cycle (the slot is untouched while unlocked).
unsafe impl<T: Send> Send for TaskFuture<T> {}
unsafe impl<T: Send> Sync for TaskFuture<T> {}

impl<T: Clone> TaskFuture<T> {
    /// Creates an empty future.
    #[must_use]
    pub fn new() -> Self {
        let lock = Arc::new(ReentrantLock::named("task-future"));
        let signal = Signal::bound(Arc::clone(&lock));
        Self {
            lock,
            signal,
            value: UnsafeCell::new(None),
        }
    }

    /// Stores the value and wakes every blocked [`get`](Self::get).
    ///
    /// # Panics
    ///
    /// Panics if a value was already set. The reference behavior leaves
    /// a second `set` undefined; rejecting it loudly is a deliberate
    /// strengthening, never a silent overwrite.
    pub fn set(&self, value: T) {
        {
            let _guard = self.lock.enter();
            // Safety: slot access is serialized by `lock`.
            let slot = unsafe { &mut *self.value.get() };
            assert!(slot.is_none(), "TaskFuture::set called twice");
            *slot = Some(value);
        }
        self.signal.notify_all();
    }

    /// Blocks until a value has been set, then returns a clone of it.
    pub fn get(&self) -> T {
        let _guard = self.lock.enter();
        loop {
            // Safety: slot access is serialized by `lock`.
            if let Some(value) = unsafe { (*self.value.get()).as_ref() } {
                return value.clone();
            }
            self.signal.wait();
        }
    }

    /// Like [`get`](Self::get) but gives up after `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Option<T> {
        let _guard = self.lock.enter();
        // Safety: slot access is serialized by `lock`.
        if let Some(value) = unsafe { (*self.value.get()).as_ref() } {
            return Some(value.clone());
        }
        self.signal.wait_for(timeout);
        unsafe { (*self.value.get()).as_ref() }.cloned()
    }

    /// Returns the value if already set, without blocking.
    #[must_use]
    pub fn try_get(&self) -> Option<T> {
        let _guard = self.lock.enter();
        // Safety: slot access is serialized by `lock`.
        unsafe { (*self.value.get()).as_ref() }.cloned()
    }

    /// Whether a value has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.try_get().is_some()
    }
}

impl<T: Clone> Default for TaskFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}
