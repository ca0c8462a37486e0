//! Managed OS threads with a typed lifecycle and panic containment.
//!
//! [`ManagedThread`] wraps [`std::thread`] with the lifecycle
//! `Idle -> Running -> Stopped`, restart-safe [`start`], idempotent
//! [`join`], and a body wrapper that contains panics: a panicking body
//! becomes a clean stop, logged at `warn`, never an unwinding that
//! crosses the thread boundary or a silently lost worker. No error
//! detail is reported upward; a task that needs to communicate failure
//! encodes it in its own result type.
//!
//! The module also owns thread identity. [`current_id`] hands every OS
//! thread a process-unique token from a monotonic counter on first use.
//! Tokens are never reused, so a lock that recorded a terminated
//! thread's token can never be confused by a new thread (OS thread ids
//! can be recycled; these cannot).
//!
//! [`start`]: ManagedThread::start
//! [`join`]: ManagedThread::join

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::SpawnError;

/// Highest best-effort priority value.
pub const MAX_PRIORITY: i32 = 2;
/// Normal priority; also the sentinel returned where the platform
/// offers no unprivileged priority control.
pub const NORM_PRIORITY: i32 = 0;
/// Lowest best-effort priority value.
pub const MIN_PRIORITY: i32 = -2;

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Process-unique token for the calling thread.
///
/// Stable for the thread's whole lifetime and never reassigned to a
/// later thread. Used as the owner key by
/// [`crate::sync::ReentrantLock`].
#[must_use]
pub fn current_id() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

/// Suspends the calling thread for `millis` milliseconds.
pub fn sleep_ms(millis: u64) {
    thread::sleep(Duration::from_millis(millis));
}

/// Yields the calling thread's remaining timeslice.
pub fn yield_now() {
    thread::yield_now();
}

/// The body a [`ManagedThread`] executes.
///
/// `run` takes `&self` so a restarted thread reuses the same body
/// object; per-run state belongs in interior-mutable fields.
pub trait ThreadBody: Send + Sync + 'static {
    /// The thread's main function.
    fn run(&self);
}

struct FnBody<F>(F);

impl<F: Fn() + Send + Sync + 'static> ThreadBody for FnBody<F> {
    fn run(&self) {
        (self.0)();
    }
}

/// Lifecycle of a [`ManagedThread`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Constructed, never started (or spawn failed).
    Idle,
    /// The OS thread is executing the body.
    Running,
    /// The body returned, normally or after a contained panic.
    Stopped,
}

/// Shared between the handle and the running body. Each `start` gets a
/// fresh cell so a still-running detached body from an earlier start
/// cannot clobber the new run's state.
#[derive(Debug)]
struct ThreadShared {
    state: AtomicU8,
}

impl ThreadShared {
    const IDLE: u8 = 0;
    const RUNNING: u8 = 1;
    const STOPPED: u8 = 2;

    fn new(state: ThreadState) -> Self {
        let shared = Self {
            state: AtomicU8::new(Self::IDLE),
        };
        shared.set(state);
        shared
    }

    fn set(&self, state: ThreadState) {
        let raw = match state {
            ThreadState::Idle => Self::IDLE,
            ThreadState::Running => Self::RUNNING,
            ThreadState::Stopped => Self::STOPPED,
        };
        self.state.store(raw, Ordering::Release);
    }

    fn get(&self) -> ThreadState {
        match self.state.load(Ordering::Acquire) {
            Self::RUNNING => ThreadState::Running,
            Self::STOPPED => ThreadState::Stopped,
            _ => ThreadState::Idle,
        }
    }
}

/// An OS thread with a typed start/stop/join lifecycle.
///
/// The spawned thread holds strong references to its body and state for
/// the whole run, so both outlive every external handle. Unless
/// detached, dropping the handle joins the thread first.
pub struct ManagedThread {
    body: Arc<dyn ThreadBody>,
    shared: Arc<ThreadShared>,
    handle: Option<thread::JoinHandle<()>>,
    name: String,
    detached: bool,
}

impl ManagedThread {
    /// Creates an idle thread around `body`. Nothing runs until
    /// [`start`](Self::start).
    #[must_use]
    pub fn new(body: Arc<dyn ThreadBody>) -> Self {
        Self {
            body,
            shared: Arc::new(ThreadShared::new(ThreadState::Idle)),
            handle: None,
            name: String::from("seawall-thread"),
            detached: false,
        }
    }

    /// Creates an idle thread that runs `f`.
    #[must_use]
    pub fn from_fn<F: Fn() + Send + Sync + 'static>(f: F) -> Self {
        Self::new(Arc::new(FnBody(f)))
    }

    /// Sets the OS thread name used by subsequent starts.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Spawns the OS thread executing the body.
    ///
    /// A previous non-detached run is joined first, so restarting
    /// without an explicit [`join`](Self::join) is safe. With
    /// `detach = true` the OS handle is released immediately; the run
    /// cannot be joined and `Drop` will not wait for it.
    ///
    /// # Errors
    ///
    /// [`SpawnError`] if the OS refuses the thread; the state stays
    /// `Idle` and nothing was spawned.
    pub fn start(&mut self, detach: bool) -> Result<(), SpawnError> {
        // Reap the previous run even if the caller forgot to join.
        self.join();

        let shared = Arc::new(ThreadShared::new(ThreadState::Running));
        self.shared = Arc::clone(&shared);

        let body = Arc::clone(&self.body);
        let name = self.name.clone();
        let spawned = thread::Builder::new().name(self.name.clone()).spawn(move || {
            // `body` and `shared` are strong references held for the
            // whole run; the thread keeps its own state alive even if
            // every external handle is dropped.
            if panic::catch_unwind(AssertUnwindSafe(|| body.run())).is_err() {
                tracing::warn!(thread = %name, "thread body panicked; contained");
            }
            shared.set(ThreadState::Stopped);
        });

        match spawned {
            Ok(handle) => {
                if detach {
                    self.detached = true;
                    drop(handle);
                } else {
                    self.detached = false;
                    self.handle = Some(handle);
                }
                tracing::debug!(thread = %self.name, detach, "thread started");
                Ok(())
            }
            Err(source) => {
                self.shared.set(ThreadState::Idle);
                Err(SpawnError::from(source))
            }
        }
    }

    /// True while the most recent run has not yet stopped.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.shared.get() == ThreadState::Running
    }

    /// Lifecycle state of the most recent run.
    #[must_use]
    pub fn state(&self) -> ThreadState {
        self.shared.get()
    }

    /// Whether the most recent run was detached.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Blocks until the body completes and reaps the handle.
    ///
    /// Idempotent; a no-op once joined or when the run was detached.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            // The wrapper contains panics, so the closure itself never
            // unwinds and join cannot fail.
            let _ = handle.join();
        }
    }

    /// Best-effort priority change.
    ///
    /// No-op here: no tier-1 platform offers unprivileged per-thread
    /// priority control worth depending on. Kept for interface parity;
    /// not a guarantee.
    pub fn set_priority(&self, _priority: i32) {}

    /// Best-effort priority query; returns [`NORM_PRIORITY`] where
    /// priorities are uncontrolled.
    #[must_use]
    pub fn priority(&self) -> i32 {
        NORM_PRIORITY
    }
}

impl Drop for ManagedThread {
    fn drop(&mut self) {
        if !self.detached {
            self.join();
        }
    }
}

impl std::fmt::Debug for ManagedThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedThread")
            .field("name", &self.name)
            .field("state", &self.shared.get())
            .field("detached", &self.detached)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32};
    use std::sync::mpsc;

    fn init_test(name: &str) {
        crate::test_logging::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn current_id_is_stable_and_distinct() {
        init_test("current_id_is_stable_and_distinct");
        let here_once = current_id();
        let here_twice = current_id();
        crate::assert_with_log!(
            here_once == here_twice,
            "stable within thread",
            here_once,
            here_twice
        );

        let there = std::thread::spawn(current_id).join().expect("id thread");
        crate::assert_with_log!(here_once != there, "distinct across threads", "different", there);
        crate::test_complete!("current_id_is_stable_and_distinct");
    }

    #[test]
    fn lifecycle_idle_running_stopped() {
        init_test("lifecycle_idle_running_stopped");
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let release_rx = std::sync::Mutex::new(release_rx);
        let entered_tx = std::sync::Mutex::new(entered_tx);

        let mut thread = ManagedThread::from_fn(move || {
            entered_tx.lock().expect("entered lock").send(()).expect("entered send");
            release_rx
                .lock()
                .expect("release lock")
                .recv()
                .expect("release recv");
        })
        .named("lifecycle-test");

        let alive = thread.is_alive();
        crate::assert_with_log!(!alive, "idle before start", false, alive);
        crate::assert_with_log!(
            thread.state() == ThreadState::Idle,
            "state before start",
            ThreadState::Idle,
            thread.state()
        );

        thread.start(false).expect("spawn");
        entered_rx.recv().expect("body entered");
        let alive = thread.is_alive();
        crate::assert_with_log!(alive, "running after start", true, alive);

        release_tx.send(()).expect("release send");
        thread.join();
        let alive = thread.is_alive();
        crate::assert_with_log!(!alive, "stopped after join", false, alive);
        crate::assert_with_log!(
            thread.state() == ThreadState::Stopped,
            "state after join",
            ThreadState::Stopped,
            thread.state()
        );
        crate::test_complete!("lifecycle_idle_running_stopped");
    }

    #[test]
    fn panicking_body_is_contained() {
        init_test("panicking_body_is_contained");
        let mut thread = ManagedThread::from_fn(|| panic!("deliberate test panic"))
            .named("panic-test");
        thread.start(false).expect("spawn");
        thread.join();
        crate::assert_with_log!(
            thread.state() == ThreadState::Stopped,
            "contained panic stops cleanly",
            ThreadState::Stopped,
            thread.state()
        );
        crate::test_complete!("panicking_body_is_contained");
    }

    #[test]
    fn join_is_idempotent() {
        init_test("join_is_idempotent");
        let mut thread = ManagedThread::from_fn(|| {}).named("join-test");
        thread.start(false).expect("spawn");
        thread.join();
        thread.join();
        crate::assert_with_log!(
            thread.state() == ThreadState::Stopped,
            "stopped after double join",
            ThreadState::Stopped,
            thread.state()
        );
        crate::test_complete!("join_is_idempotent");
    }

    #[test]
    fn restart_without_explicit_join() {
        init_test("restart_without_explicit_join");
        let runs = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&runs);
        let mut thread = ManagedThread::from_fn(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .named("restart-test");

        thread.start(false).expect("first spawn");
        thread.start(false).expect("second spawn");
        thread.join();

        let total = runs.load(Ordering::SeqCst);
        crate::assert_with_log!(total == 2, "body ran twice", 2u32, total);
        crate::test_complete!("restart_without_explicit_join");
    }

    #[test]
    fn drop_joins_running_thread() {
        init_test("drop_joins_running_thread");
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let mut thread = ManagedThread::from_fn(move || {
            std::thread::sleep(Duration::from_millis(30));
            flag.store(true, Ordering::SeqCst);
        })
        .named("drop-test");
        thread.start(false).expect("spawn");
        drop(thread);
        let done = finished.load(Ordering::SeqCst);
        crate::assert_with_log!(done, "drop waited for the body", true, done);
        crate::test_complete!("drop_joins_running_thread");
    }

    #[test]
    fn detached_thread_outlives_handle() {
        init_test("detached_thread_outlives_handle");
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let done_tx = std::sync::Mutex::new(done_tx);
        let mut thread = ManagedThread::from_fn(move || {
            sleep_ms(20);
            let _ = done_tx.lock().expect("done lock").send(());
        })
        .named("detach-test");
        thread.start(true).expect("spawn");
        crate::assert_with_log!(thread.is_detached(), "detached flag", true, thread.is_detached());
        drop(thread);
        done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("detached body completed");
        crate::test_complete!("detached_thread_outlives_handle");
    }
}
