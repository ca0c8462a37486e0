//! Reentrant mutual exclusion with contention telemetry.
//!
//! [`ReentrantLock`] may be acquired any number of times by the thread
//! that already owns it; a matching number of [`unlock`] calls releases
//! it. Ownership is tracked by the per-thread token from
//! [`crate::thread::current_id`], which is never reused for the life of
//! the process.
//!
//! The lock also measures how long acquisitions spend waiting for the
//! underlying OS mutex and folds that into an exponentially weighted
//! moving average. [`queue_delay`] and [`is_congested`] expose the
//! estimate so an external admission-control layer can shed load when a
//! hot lock backs up. The telemetry is read-only and has no effect on
//! mutual exclusion.
//!
//! [`unlock`]: ReentrantLock::unlock
//! [`queue_delay`]: ReentrantLock::queue_delay
//! [`is_congested`]: ReentrantLock::is_congested

#![allow(unsafe_code)]

use parking_lot::RawMutex;
use parking_lot::lock_api::RawMutex as _;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::thread;

/// Default congestion threshold for the queue-delay estimate.
pub const DEFAULT_CONGESTION_THRESHOLD: Duration = Duration::from_micros(100);

/// Owner token meaning "nobody holds the lock".
const NO_OWNER: u64 = 0;

/// Snapshot of a lock's contention counters.
///
/// All fields are monotonic except `queue_delay_ns`, which is the
/// current moving average.
#[derive(Debug, Clone, Default)]
pub struct LockStats {
    /// Diagnostic name of the lock.
    pub name: &'static str,
    /// Mutex acquisitions (reentrant re-entries not counted).
    pub acquisitions: u64,
    /// Acquisitions that found the mutex already held.
    pub contentions: u64,
    /// Current EWMA of slow-path wait time, in nanoseconds.
    pub queue_delay_ns: u64,
    /// Longest single wait observed, in nanoseconds.
    pub max_wait_ns: u64,
}

/// A mutual-exclusion lock the owning thread may acquire recursively.
///
/// # Ownership contract
///
/// Only the owning thread may call [`unlock`](Self::unlock) or
/// [`unlock_all`](Self::unlock_all). The reference behavior for a
/// non-owner release is undefined; this implementation strengthens it
/// to a panic so bookkeeping can never be silently corrupted.
///
/// # Fairness
///
/// The slow path rides on [`parking_lot::RawMutex`], which provides
/// eventual fairness under contention; no priority policy beyond that.
pub struct ReentrantLock {
    raw: RawMutex,
    /// Token of the owning thread, or [`NO_OWNER`].
    owner: AtomicU64,
    /// Unmatched `lock()` calls by the owner. Written only by the owner.
    depth: AtomicU32,
    name: &'static str,
    congestion_threshold_ns: u64,
    wait_ewma_ns: AtomicU64,
    max_wait_ns: AtomicU64,
    acquisitions: AtomicU64,
    contentions: AtomicU64,
}

impl ReentrantLock {
    /// Creates an unlocked, unnamed lock.
    #[must_use]
    pub fn new() -> Self {
        Self::named("")
    }

    /// Creates an unlocked lock with a diagnostic name.
    #[must_use]
    pub fn named(name: &'static str) -> Self {
        Self {
            raw: RawMutex::INIT,
            owner: AtomicU64::new(NO_OWNER),
            depth: AtomicU32::new(0),
            name,
            congestion_threshold_ns: DEFAULT_CONGESTION_THRESHOLD.as_nanos() as u64,
            wait_ewma_ns: AtomicU64::new(0),
            max_wait_ns: AtomicU64::new(0),
            acquisitions: AtomicU64::new(0),
            contentions: AtomicU64::new(0),
        }
    }

    /// Sets the queue-delay level above which [`is_congested`] reports
    /// true.
    ///
    /// [`is_congested`]: Self::is_congested
    #[must_use]
    pub fn with_congestion_threshold(mut self, threshold: Duration) -> Self {
        self.congestion_threshold_ns = threshold.as_nanos().min(u128::from(u64::MAX)) as u64;
        self
    }

    /// Acquires the lock, blocking if another thread holds it.
    ///
    /// If the calling thread already owns the lock this only increments
    /// the recursion depth and never touches the OS mutex.
    pub fn lock(&self) {
        if self.holds_lock() {
            // Depth is only written by the owner, which is us.
            self.depth.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if self.raw.try_lock() {
            self.record_wait(Duration::ZERO);
        } else {
            self.contentions.fetch_add(1, Ordering::Relaxed);
            let start = Instant::now();
            self.raw.lock();
            let waited = start.elapsed();
            self.record_wait(waited);
            tracing::trace!(
                lock = self.name,
                waited_us = waited.as_micros() as u64,
                "contended lock acquired"
            );
        }

        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.owner.store(thread::current_id(), Ordering::Release);
        self.depth.store(1, Ordering::Release);
    }

    /// Acquires the lock only if that cannot block.
    ///
    /// Returns true on success, including the reentrant case. On
    /// success the caller owes one [`unlock`](Self::unlock).
    pub fn try_lock(&self) -> bool {
        if self.holds_lock() {
            self.depth.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        if !self.raw.try_lock() {
            return false;
        }
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.owner.store(thread::current_id(), Ordering::Release);
        self.depth.store(1, Ordering::Release);
        true
    }

    /// Releases one recursion level; the OS mutex is released when the
    /// depth reaches zero.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not hold the lock. The
    /// reference behavior leaves this undefined; failing loudly is a
    /// deliberate strengthening.
    pub fn unlock(&self) {
        assert!(
            self.holds_lock(),
            "ReentrantLock::unlock called by a thread that does not hold the lock"
        );
        if self.depth.fetch_sub(1, Ordering::Release) == 1 {
            self.owner.store(NO_OWNER, Ordering::Release);
            // Safety: this thread owns the raw mutex; we acquired it in
            // lock()/try_lock() and the depth just hit zero.
            unsafe { self.raw.unlock() };
        }
    }

    /// Releases every recursion level at once and returns how many
    /// there were.
    ///
    /// Used by [`crate::sync::Signal::wait`] to fully release a
    /// possibly-recursively-held lock before sleeping; the caller is
    /// expected to reacquire the same depth afterwards.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not hold the lock (same
    /// strengthening as [`unlock`](Self::unlock)).
    pub fn unlock_all(&self) -> u32 {
        assert!(
            self.holds_lock(),
            "ReentrantLock::unlock_all called by a thread that does not hold the lock"
        );
        let depth = self.depth.swap(0, Ordering::Release);
        self.owner.store(NO_OWNER, Ordering::Release);
        // Safety: this thread owns the raw mutex and depth was nonzero.
        unsafe { self.raw.unlock() };
        depth
    }

    /// Returns true iff the calling thread currently owns the lock.
    ///
    /// Never blocks.
    #[must_use]
    pub fn holds_lock(&self) -> bool {
        self.owner.load(Ordering::Acquire) == thread::current_id()
            && self.depth.load(Ordering::Acquire) > 0
    }

    /// Acquires the lock and returns a guard that releases one level on
    /// drop.
    pub fn enter(&self) -> SyncGuard<'_> {
        self.lock();
        SyncGuard { lock: self }
    }

    /// Current estimate of time spent waiting to acquire this lock.
    ///
    /// An EWMA over recent slow-path acquisitions; uncontended
    /// acquisitions decay it toward zero. Telemetry only.
    #[must_use]
    pub fn queue_delay(&self) -> Duration {
        Duration::from_nanos(self.wait_ewma_ns.load(Ordering::Relaxed))
    }

    /// Whether the queue-delay estimate exceeds this lock's congestion
    /// threshold.
    ///
    /// Polled by external admission control; this lock never acts on it.
    #[must_use]
    pub fn is_congested(&self) -> bool {
        self.wait_ewma_ns.load(Ordering::Relaxed) > self.congestion_threshold_ns
    }

    /// Snapshot of the contention counters.
    #[must_use]
    pub fn stats(&self) -> LockStats {
        LockStats {
            name: self.name,
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            contentions: self.contentions.load(Ordering::Relaxed),
            queue_delay_ns: self.wait_ewma_ns.load(Ordering::Relaxed),
            max_wait_ns: self.max_wait_ns.load(Ordering::Relaxed),
        }
    }

    /// Diagnostic name given at construction.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Folds one slow-path wait into the EWMA (alpha = 1/8).
    ///
    /// Called with the raw mutex freshly held, so updates are
    /// serialized without extra synchronization on the counters.
    fn record_wait(&self, waited: Duration) {
        let sample = waited.as_nanos().min(u128::from(u64::MAX)) as u64;
        let prev = self.wait_ewma_ns.load(Ordering::Relaxed);
        let next = prev - prev / 8 + sample / 8;
        self.wait_ewma_ns.store(next, Ordering::Relaxed);
        self.max_wait_ns.fetch_max(sample, Ordering::Relaxed);
    }
}

impl Default for ReentrantLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReentrantLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReentrantLock")
            .field("name", &self.name)
            .field("owner", &self.owner.load(Ordering::Relaxed))
            .field("depth", &self.depth.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Scope guard holding one recursion level of a [`ReentrantLock`].
///
/// Dropping the guard calls [`ReentrantLock::unlock`] once. Guards
/// nest: each `enter()` while already owning the lock adds a level.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SyncGuard<'a> {
    lock: &'a ReentrantLock,
}

impl SyncGuard<'_> {
    /// The lock this guard holds.
    #[must_use]
    pub fn lock(&self) -> &ReentrantLock {
        self.lock
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
