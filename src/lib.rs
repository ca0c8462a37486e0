//! Thread-based concurrency core for shared-state services.
//!
//! Seawall guards shared state across OS threads, lets threads wait for
//! state changes, and runs background work on a bounded pool with
//! future-based completion. Four primitives cooperate:
//!
//! - [`ReentrantLock`]: mutual exclusion a thread may acquire recursively,
//!   with owner tracking and queue-delay telemetry for external
//!   admission control.
//! - [`Signal`]: wait/notify bound to a possibly-recursively-held lock.
//!   A wait fully releases the lock and restores the exact recursion
//!   depth afterwards.
//! - [`ManagedThread`]: an OS thread with a typed lifecycle. A panicking
//!   body is contained and becomes a clean stop, never a lost worker or
//!   a dead process.
//! - [`TaskPool`] / [`TaskFuture`]: a fixed set of managed worker threads
//!   draining a FIFO queue, handing back single-assignment futures.
//!
//! # Blocking model
//!
//! Everything here is preemptive OS threading; there is no async
//! scheduling. Threads block in exactly four places: acquiring a
//! contended [`ReentrantLock`], inside [`Signal::wait`], inside
//! [`TaskFuture::get`] before the value arrives, and in an idle pool
//! worker's empty-queue wait. `Signal` waits take an optional timeout;
//! the other three block until the corresponding event occurs.
//!
//! # Caller discipline
//!
//! [`Signal::notify_all`] is level-triggered: it wakes every thread
//! already waiting and is otherwise unobserved. Waiters must re-check
//! their condition after waking (spurious wakeups are possible), and a
//! notification establishes happens-before from the notifier's
//! pre-notify writes to each waiter's post-wait reads.

pub mod error;
pub mod pool;
pub mod sync;
pub mod test_logging;
pub mod thread;

pub use error::SpawnError;
pub use pool::{PoolConfig, PoolState, TaskFuture, TaskPool};
pub use sync::{LockStats, ReentrantLock, Signal, SyncGuard};
pub use thread::{ManagedThread, ThreadBody, ThreadState};
