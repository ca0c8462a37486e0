//! Wait/notify signaling safe across recursive lock depth.
//!
//! A naive condition wait releases exactly one lock level, which either
//! deadlocks (depth > 1 never fully released) or corrupts reentrancy
//! bookkeeping. [`Signal`] exists to make wait/notify correct when the
//! guarded state sits behind a [`ReentrantLock`]: a wait fully unwinds
//! the bound lock, sleeps, then restores the exact depth it captured.
//!
//! # Lost-wakeup window
//!
//! Releasing the object lock and registering on the condition variable
//! must not be separable by a notifier. Both happen under a single
//! acquisition of the signal's private wait mutex, and
//! [`notify_all`](Signal::notify_all) takes that same mutex before
//! notifying, so a notifier that runs after the unwind is forced to
//! wait until the waiter is registered.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

use super::ReentrantLock;

/// Condition-variable wait/notify, optionally bound to a
/// [`ReentrantLock`].
///
/// Notification is level-triggered: [`notify_all`](Signal::notify_all)
/// wakes every thread currently waiting and is otherwise unobserved.
/// Waiters must re-check their condition after waking; spurious wakeups
/// are possible.
pub struct Signal {
    wait_lock: Mutex<()>,
    condition: Condvar,
    object_lock: Option<Arc<ReentrantLock>>,
}

impl Signal {
    /// Creates a signal with no bound lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            wait_lock: Mutex::new(()),
            condition: Condvar::new(),
            object_lock: None,
        }
    }

    /// Creates a signal bound to `object_lock`.
    ///
    /// Every [`wait`](Self::wait) will fully release that lock before
    /// sleeping and restore its recursion depth before returning.
    #[must_use]
    pub fn bound(object_lock: Arc<ReentrantLock>) -> Self {
        Self {
            wait_lock: Mutex::new(()),
            condition: Condvar::new(),
            object_lock: Some(object_lock),
        }
    }

    /// The bound lock, if any.
    #[must_use]
    pub fn object_lock(&self) -> Option<&Arc<ReentrantLock>> {
        self.object_lock.as_ref()
    }

    /// Blocks until notified.
    ///
    /// If a lock is bound, the caller must hold it; it is fully
    /// released for the duration of the sleep and reacquired to the
    /// identical depth before this returns, even if other threads took
    /// it in between.
    pub fn wait(&self) {
        let mut guard = self.wait_lock.lock();
        let depth = self.unwind_object_lock();
        self.condition.wait(&mut guard);
        drop(guard);
        self.rewind_object_lock(depth);
    }

    /// Blocks until notified or `timeout` elapses.
    ///
    /// Returns true if notified, false on timeout. The bound lock is
    /// restored to its prior depth in both cases.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut guard = self.wait_lock.lock();
        let depth = self.unwind_object_lock();
        let result = self.condition.wait_for(&mut guard, timeout);
        drop(guard);
        self.rewind_object_lock(depth);
        !result.timed_out()
    }

    /// Wakes every thread currently blocked in [`wait`](Self::wait) or
    /// [`wait_for`](Self::wait_for).
    ///
    /// No wakeup is dropped for a thread already waiting; with nobody
    /// waiting the notification is simply not observed.
    pub fn notify_all(&self) {
        // Serializes with the unwind-then-register step in wait(): a
        // waiter holds the wait mutex from before it releases the
        // object lock until the condvar has it registered.
        let _guard = self.wait_lock.lock();
        self.condition.notify_all();
    }

    /// Fully releases the bound lock, returning the depth to restore.
    fn unwind_object_lock(&self) -> u32 {
        self.object_lock.as_ref().map_or(0, |lock| lock.unlock_all())
    }

    /// Reacquires the bound lock `depth` times.
    ///
    /// Runs after the wait mutex is dropped: a second waiter entering
    /// `wait()` still holds the object lock and needs the wait mutex,
    /// so relocking under the wait mutex would deadlock against it.
    fn rewind_object_lock(&self, depth: u32) {
        if let Some(lock) = &self.object_lock {
            for _ in 0..depth {
                lock.lock();
            }
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("bound", &self.object_lock.is_some())
            .finish_non_exhaustive()
    }
}
