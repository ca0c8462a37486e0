//! Bounded worker pool with future-based completion.
//!
//! [`TaskPool`] runs submitted closures on a fixed set of
//! [`ManagedThread`] workers draining one FIFO queue. Submission
//! returns a [`TaskFuture`] immediately; the caller may block on it or
//! discard it for fire-and-forget work.
//!
//! # Lifecycle
//!
//! `Running -> Draining -> Stopped`. [`shutdown`](TaskPool::shutdown)
//! flips the pool to `Draining`: no new task is accepted, workers empty
//! the queue that existed at shutdown, and once every worker has exited
//! the pool is `Stopped`. A task already executing always runs to
//! completion; tasks run outside the queue lock.
//!
//! # Ordering
//!
//! Dequeue order is FIFO. Completion order across workers is not:
//! whichever worker frees up first takes the next task.

mod future;

pub use future::TaskFuture;

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use crate::error::SpawnError;
use crate::thread::{ManagedThread, ThreadBody};

/// Worker count used by [`PoolConfig::default`] and the global pool.
pub const DEFAULT_POOL_SIZE: usize = 10;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Pool construction parameters.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Prefix for worker thread names.
    pub name: &'static str,
}

impl PoolConfig {
    /// Config with the given worker count and default naming.
    #[must_use]
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    /// Sets the worker thread name prefix.
    #[must_use]
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_POOL_SIZE,
            name: "seawall-worker",
        }
    }
}

/// Pool lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Accepting and executing tasks.
    Running,
    /// Shutdown requested; the remaining queue is being emptied.
    Draining,
    /// Every worker has been joined.
    Stopped,
}

struct QueueState {
    tasks: VecDeque<Task>,
    lifecycle: PoolState,
    /// Workers currently blocked in the empty-queue wait.
    idle: usize,
}

struct PoolInner {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl PoolInner {
    fn worker_loop(&self) {
        loop {
            let task = {
                let mut state = self.state.lock();
                loop {
                    if let Some(task) = state.tasks.pop_front() {
                        break task;
                    }
                    if state.lifecycle != PoolState::Running {
                        return;
                    }
                    state.idle += 1;
                    self.available.wait(&mut state);
                    state.idle -= 1;
                }
            };

            // Execute outside the queue lock; a panicking task is
            // contained and the worker moves on to the next one.
            if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                tracing::warn!("pool task panicked; worker continues");
            }
        }
    }
}

struct PoolWorker {
    inner: Arc<PoolInner>,
}

impl ThreadBody for PoolWorker {
    fn run(&self) {
        self.inner.worker_loop();
    }
}

/// A fixed-size pool of [`ManagedThread`] workers.
///
/// Dropping the pool shuts it down (drains the queue, joins every
/// worker). The process-wide instance from [`global`] is never dropped;
/// call `global().shutdown()` at library teardown instead.
pub struct TaskPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<ManagedThread>>,
    size: usize,
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TaskPool")
            .field("size", &self.size)
            .field("state", &state.lifecycle)
            .field("pending", &state.tasks.len())
            .field("idle", &state.idle)
            .finish()
    }
}

impl TaskPool {
    /// Spawns a pool per `config`.
    ///
    /// # Errors
    ///
    /// [`SpawnError`] if the OS refuses a worker thread. Workers
    /// already spawned are shut down and joined before returning; no
    /// thread leaks.
    ///
    /// # Panics
    ///
    /// Panics if `config.workers` is zero.
    pub fn new(config: PoolConfig) -> Result<Self, SpawnError> {
        assert!(config.workers > 0, "task pool requires at least 1 worker");
        let inner = Arc::new(PoolInner {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                lifecycle: PoolState::Running,
                idle: 0,
            }),
            available: Condvar::new(),
        });

        let pool = Self {
            inner: Arc::clone(&inner),
            workers: Mutex::new(Vec::with_capacity(config.workers)),
            size: config.workers,
        };

        for index in 0..config.workers {
            let mut worker = ManagedThread::new(Arc::new(PoolWorker {
                inner: Arc::clone(&inner),
            }))
            .named(format!("{}-{index}", config.name));
            if let Err(err) = worker.start(false) {
                pool.shutdown();
                return Err(err);
            }
            pool.workers.lock().push(worker);
        }

        tracing::debug!(workers = config.workers, name = config.name, "task pool started");
        Ok(pool)
    }

    /// Enqueues `work` and returns its future immediately.
    ///
    /// An idle worker is woken if there is one; otherwise the task
    /// waits its FIFO turn. After [`shutdown`](Self::shutdown) the task
    /// is refused and its future will never complete.
    pub fn submit<F, T>(&self, work: F) -> Arc<TaskFuture<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Clone + Send + 'static,
    {
        let future = Arc::new(TaskFuture::new());
        let completion = Arc::clone(&future);
        let task: Task = Box::new(move || completion.set(work()));

        let mut state = self.inner.state.lock();
        if state.lifecycle != PoolState::Running {
            tracing::warn!("task submitted after pool shutdown; it will never run");
            return future;
        }
        state.tasks.push_back(task);
        if state.idle > 0 {
            self.inner.available.notify_one();
        }
        future
    }

    /// Worker count the pool was built with.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks queued but not yet dequeued by a worker.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.state.lock().tasks.len()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PoolState {
        self.inner.state.lock().lifecycle
    }

    /// Stops the pool: refuses new tasks, drains the queue, joins every
    /// worker.
    ///
    /// Blocks until each worker has observed the stop and exited,
    /// waiting out any task still executing. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.lifecycle != PoolState::Running {
                return;
            }
            state.lifecycle = PoolState::Draining;
            self.inner.available.notify_all();
        }

        let mut workers = self.workers.lock();
        for worker in workers.iter_mut() {
            worker.join();
        }
        workers.clear();

        self.inner.state.lock().lifecycle = PoolState::Stopped;
        tracing::debug!("task pool stopped");
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

static GLOBAL_POOL: OnceLock<TaskPool> = OnceLock::new();

/// The process-wide pool, created on first use.
///
/// Statics are never dropped, so teardown is explicit: the embedding
/// library calls `global().shutdown()` once it no longer submits work.
/// Worker spawn failure at first use is fatal; there is no retry at
/// this layer.
pub fn global() -> &'static TaskPool {
    GLOBAL_POOL.get_or_init(|| {
        TaskPool::new(PoolConfig::default()).expect("failed to start global task pool")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn init_test(name: &str) {
        crate::test_logging::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn submit_and_collect_results() {
        init_test("submit_and_collect_results");
        let pool = TaskPool::new(PoolConfig::with_workers(4)).expect("pool");
        let futures: Vec<_> = (0..16u64).map(|n| pool.submit(move || n * n)).collect();
        for (n, future) in futures.iter().enumerate() {
            let expected = (n * n) as u64;
            let value = future.get();
            crate::assert_with_log!(value == expected, "task result", expected, value);
        }
        crate::test_complete!("submit_and_collect_results");
    }

    #[test]
    fn single_worker_dequeues_fifo() {
        init_test("single_worker_dequeues_fifo");
        let pool = TaskPool::new(PoolConfig::with_workers(1).name("fifo")).expect("pool");
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut futures = Vec::new();
        for n in 0..8u32 {
            let order = Arc::clone(&order);
            futures.push(pool.submit(move || {
                order.lock().push(n);
                n
            }));
        }
        for future in &futures {
            future.get();
        }

        let seen = order.lock().clone();
        let expected: Vec<u32> = (0..8).collect();
        crate::assert_with_log!(seen == expected, "execution order", expected, seen);
        crate::test_complete!("single_worker_dequeues_fifo");
    }

    #[test]
    fn shutdown_drains_queued_tasks() {
        init_test("shutdown_drains_queued_tasks");
        let pool = TaskPool::new(PoolConfig::with_workers(1).name("drain")).expect("pool");
        let completed = Arc::new(AtomicU32::new(0));

        for _ in 0..6 {
            let completed = Arc::clone(&completed);
            pool.submit(move || {
                std::thread::sleep(Duration::from_millis(10));
                completed.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();

        let total = completed.load(Ordering::SeqCst);
        crate::assert_with_log!(total == 6, "queued tasks drained", 6u32, total);
        crate::assert_with_log!(
            pool.state() == PoolState::Stopped,
            "stopped after shutdown",
            PoolState::Stopped,
            pool.state()
        );
        crate::test_complete!("shutdown_drains_queued_tasks");
    }

    #[test]
    fn submit_after_shutdown_is_refused() {
        init_test("submit_after_shutdown_is_refused");
        let pool = TaskPool::new(PoolConfig::with_workers(2)).expect("pool");
        pool.shutdown();
        let future = pool.submit(|| 42);
        std::thread::sleep(Duration::from_millis(30));
        let value = future.try_get();
        crate::assert_with_log!(value.is_none(), "refused task never runs", "None", value);
        crate::test_complete!("submit_after_shutdown_is_refused");
    }

    #[test]
    fn panicking_task_does_not_kill_worker() {
        init_test("panicking_task_does_not_kill_worker");
        let pool = TaskPool::new(PoolConfig::with_workers(1).name("contain")).expect("pool");
        pool.submit(|| panic!("deliberate task panic"));
        let future = pool.submit(|| 5);
        let value = future.get();
        crate::assert_with_log!(value == 5, "worker survived the panic", 5, value);
        crate::test_complete!("panicking_task_does_not_kill_worker");
    }

    #[test]
    fn shutdown_is_idempotent() {
        init_test("shutdown_is_idempotent");
        let pool = TaskPool::new(PoolConfig::with_workers(2)).expect("pool");
        pool.shutdown();
        pool.shutdown();
        crate::assert_with_log!(
            pool.state() == PoolState::Stopped,
            "stopped after double shutdown",
            PoolState::Stopped,
            pool.state()
        );
        crate::test_complete!("shutdown_is_idempotent");
    }

    #[test]
    fn global_pool_executes_work() {
        init_test("global_pool_executes_work");
        let value = global().submit(|| 21 * 2).get();
        crate::assert_with_log!(value == 42, "global pool result", 42, value);
        crate::test_complete!("global_pool_executes_work");
    }
}
