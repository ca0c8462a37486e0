//! Test logging infrastructure.
//!
//! Concurrency tests fail in ways a bare assertion message cannot
//! explain; this module captures a timestamped event trail per process
//! and dumps it when an assertion trips.
//!
//! - [`TestLogLevel`]: verbosity, settable via `SEAWALL_TEST_LOG`
//! - [`TestLogger`]: timestamped in-memory event capture
//! - [`test_phase!`], [`test_complete!`], [`assert_with_log!`]: the
//!   macros tests actually use
//!
//! # Example
//!
//! ```ignore
//! crate::test_logging::init_test_logging();
//! crate::test_phase!("reentrant_basic");
//! crate::assert_with_log!(depth == 2, "depth", 2, depth);
//! crate::test_complete!("reentrant_basic");
//! ```

use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

/// Logging verbosity for tests, ordered least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TestLogLevel {
    /// Only errors and failures.
    Error,
    /// Warnings and above.
    Warn,
    /// General test progress.
    #[default]
    Info,
    /// Detailed per-operation events.
    Debug,
}

impl FromStr for TestLogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            _ => Err(()),
        }
    }
}

struct Record {
    at_micros: u128,
    level: TestLogLevel,
    message: String,
}

/// Captures timestamped events and renders them as a report.
pub struct TestLogger {
    start: Instant,
    level: TestLogLevel,
    events: Mutex<Vec<Record>>,
}

impl TestLogger {
    /// Creates a logger that keeps events at or below `level`.
    #[must_use]
    pub fn new(level: TestLogLevel) -> Self {
        Self {
            start: Instant::now(),
            level,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Records one event if its level is enabled.
    pub fn log(&self, level: TestLogLevel, message: impl Into<String>) {
        if level > self.level {
            return;
        }
        let record = Record {
            at_micros: self.start.elapsed().as_micros(),
            level,
            message: message.into(),
        };
        self.events.lock().expect("test log poisoned").push(record);
    }

    /// Marks the start of a named test phase.
    pub fn phase(&self, name: &str) {
        self.log(TestLogLevel::Info, format!("=== {name} ==="));
    }

    /// Marks a named test as complete.
    pub fn complete(&self, name: &str) {
        self.log(TestLogLevel::Info, format!("--- {name} done ---"));
    }

    /// Renders every captured event with relative timestamps.
    #[must_use]
    pub fn report(&self) -> String {
        let events = self.events.lock().expect("test log poisoned");
        let mut out = String::with_capacity(events.len() * 48);
        for record in events.iter() {
            let _ = writeln!(
                out,
                "[{:>10}us] {:5?} {}",
                record.at_micros, record.level, record.message
            );
        }
        out
    }

    /// Discards captured events.
    pub fn clear(&self) {
        self.events.lock().expect("test log poisoned").clear();
    }
}

static GLOBAL_LOGGER: OnceLock<TestLogger> = OnceLock::new();

/// The process-wide test logger, created on first use with the level
/// from `SEAWALL_TEST_LOG` (default `info`).
pub fn global() -> &'static TestLogger {
    GLOBAL_LOGGER.get_or_init(|| {
        let level = std::env::var("SEAWALL_TEST_LOG")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();
        TestLogger::new(level)
    })
}

/// Initializes the process-wide logger. Idempotent; call at the top of
/// every test.
pub fn init_test_logging() {
    let _ = global();
}

/// Logs the start of a test phase to the global test logger.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        $crate::test_logging::global().phase($name);
    };
}

/// Logs test completion to the global test logger.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        $crate::test_logging::global().complete($name);
    };
}

/// Asserts a condition, dumping the captured event trail on failure.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $what:expr, $expected:expr, $actual:expr) => {
        if !$cond {
            eprintln!("{}", $crate::test_logging::global().report());
            panic!(
                "assertion failed: {} (expected {:?}, got {:?})",
                $what, $expected, $actual
            );
        }
    };
}
