//! Error types.
//!
//! Steady-state operation never reports errors upward: task and thread
//! panics are contained at the thread boundary (see
//! [`crate::thread::ManagedThread`]), and blocking calls either succeed,
//! time out where a timed variant exists, or keep blocking. The one
//! user-visible failure is construction-time resource exhaustion, when
//! the OS refuses to spawn a thread. Nothing here retries; that is the
//! caller's policy.

use thiserror::Error;

/// The OS refused to spawn a thread.
///
/// Returned synchronously from [`crate::thread::ManagedThread::start`]
/// and [`crate::pool::TaskPool::new`].
#[derive(Debug, Error)]
#[error("failed to spawn OS thread: {source}")]
pub struct SpawnError {
    /// Underlying spawn failure from the OS.
    #[from]
    pub source: std::io::Error,
}
