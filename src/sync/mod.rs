//! Synchronization primitives: reentrant locking and wait/notify.
//!
//! # Primitives
//!
//! - [`ReentrantLock`]: Mutual exclusion with owner tracking, recursion
//!   depth, and queue-delay telemetry
//! - [`SyncGuard`]: Scope guard that releases one recursion level on drop
//! - [`Signal`]: Condition wait/notify bound to an optional lock
//!
//! # Reentrancy and waiting
//!
//! The two primitives are designed as one protocol. A thread may hold a
//! [`ReentrantLock`] at any depth when it calls [`Signal::wait`]; the
//! wait releases every level before sleeping and reacquires exactly
//! that many before returning. The release and the condvar registration
//! happen under one acquisition of the signal's private wait mutex, so
//! a notifier that slips in between cannot be lost.

mod reentrant;
mod signal;

pub use reentrant::{DEFAULT_CONGESTION_THRESHOLD, LockStats, ReentrantLock, SyncGuard};
pub use signal::Signal;
