//! Run notifications.
//!
//! Per candidate the notifier sees either `ignored`, or `started`, zero or
//! more `failure`/`assumption_failure`, then `finished`. Suite-level
//! problems are reported as failures against the suite description.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::description::Description;
use crate::throwable::{seed_from_throwable, Throwable};

/// A failure attributed to a description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    description: Description,
    throwable: Throwable,
}

impl Failure {
    /// Create a failure
    #[must_use]
    pub fn new(description: Description, throwable: Throwable) -> Self {
        Self {
            description,
            throwable,
        }
    }

    /// What failed
    #[must_use]
    pub fn description(&self) -> &Description {
        &self.description
    }

    /// Why it failed
    #[must_use]
    pub fn throwable(&self) -> &Throwable {
        &self.throwable
    }

    /// Message of the throwable
    #[must_use]
    pub fn message(&self) -> &str {
        self.throwable.message()
    }

    /// Seed chains embedded in the throwable, if any
    #[must_use]
    pub fn seed(&self) -> Option<String> {
        seed_from_throwable(&self.throwable)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.description, self.throwable)
    }
}

/// Receives run events. Every callback defaults to a no-op.
pub trait RunListener: Send + Sync {
    /// A suite is about to run
    fn test_run_started(&self, _description: &Description) {}
    /// A suite has finished
    fn test_run_finished(&self, _result: &RunResult) {}
    /// A candidate started
    fn test_started(&self, _description: &Description) {}
    /// A candidate (or the suite) failed
    fn test_failure(&self, _failure: &Failure) {}
    /// A candidate (or the suite) violated an assumption
    fn test_assumption_failure(&self, _failure: &Failure) {}
    /// A candidate was skipped
    fn test_ignored(&self, _description: &Description) {}
    /// A candidate finished
    fn test_finished(&self, _description: &Description) {}
}

/// Fan-out of run events to subscribed listeners.
///
/// Shared across the runner thread and test threads. A listener that
/// panics is logged and skipped; it never breaks the run.
#[derive(Default)]
pub struct RunNotifier {
    listeners: RwLock<Vec<Arc<dyn RunListener>>>,
}

impl fmt::Debug for RunNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunNotifier")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

fn same_listener(a: &Arc<dyn RunListener>, b: &Arc<dyn RunListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}

impl RunNotifier {
    /// Create a notifier with no listeners
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a listener
    pub fn add_listener(&self, listener: Arc<dyn RunListener>) {
        self.listeners.write().push(listener);
    }

    /// Unsubscribe a listener (by identity)
    pub fn remove_listener(&self, listener: &Arc<dyn RunListener>) {
        self.listeners.write().retain(|l| !same_listener(l, listener));
    }

    /// Number of subscribed listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn each(&self, event: &str, f: impl Fn(&dyn RunListener)) {
        let listeners: Vec<Arc<dyn RunListener>> = self.listeners.read().clone();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))).is_err() {
                tracing::error!(event, "run listener panicked; event dropped for this listener");
            }
        }
    }

    /// Broadcast run started
    pub fn fire_test_run_started(&self, description: &Description) {
        self.each("test_run_started", |l| l.test_run_started(description));
    }

    /// Broadcast run finished
    pub fn fire_test_run_finished(&self, result: &RunResult) {
        self.each("test_run_finished", |l| l.test_run_finished(result));
    }

    /// Broadcast a candidate start
    pub fn fire_test_started(&self, description: &Description) {
        self.each("test_started", |l| l.test_started(description));
    }

    /// Broadcast a failure
    pub fn fire_test_failure(&self, failure: &Failure) {
        tracing::debug!(test = %failure.description(), "failure: {}", failure.throwable());
        self.each("test_failure", |l| l.test_failure(failure));
    }

    /// Broadcast an assumption failure
    pub fn fire_test_assumption_failed(&self, failure: &Failure) {
        self.each("test_assumption_failure", |l| l.test_assumption_failure(failure));
    }

    /// Broadcast a skipped candidate
    pub fn fire_test_ignored(&self, description: &Description) {
        self.each("test_ignored", |l| l.test_ignored(description));
    }

    /// Broadcast a candidate finish
    pub fn fire_test_finished(&self, description: &Description) {
        self.each("test_finished", |l| l.test_finished(description));
    }
}

/// Accumulated outcome of one or more suite runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResult {
    /// Started candidates (including failed ones)
    pub run_count: usize,
    /// Skipped candidates
    pub ignore_count: usize,
    /// Hard failures, in report order
    pub failures: Vec<Failure>,
    /// Assumption failures, in report order
    pub assumption_failures: Vec<Failure>,
    /// Wall-clock time
    pub run_time: Duration,
}

impl RunResult {
    /// Number of hard failures
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Whether no hard failure was reported
    #[must_use]
    pub fn was_successful(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold another result into this one
    pub fn merge(&mut self, other: &Self) {
        self.run_count += other.run_count;
        self.ignore_count += other.ignore_count;
        self.failures.extend(other.failures.iter().cloned());
        self.assumption_failures
            .extend(other.assumption_failures.iter().cloned());
        self.run_time += other.run_time;
    }
}

/// Listener that accumulates a [`RunResult`].
#[derive(Debug)]
pub struct ResultListener {
    result: Mutex<RunResult>,
    started: Mutex<Option<Instant>>,
}

impl Default for ResultListener {
    fn default() -> Self {
        Self {
            result: Mutex::new(RunResult::default()),
            started: Mutex::new(None),
        }
    }
}

impl ResultListener {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current totals
    #[must_use]
    pub fn result(&self) -> RunResult {
        let mut result = self.result.lock().clone();
        if let Some(started) = *self.started.lock() {
            result.run_time = started.elapsed();
        }
        result
    }
}

impl RunListener for ResultListener {
    fn test_run_started(&self, _description: &Description) {
        self.started.lock().get_or_insert_with(Instant::now);
    }

    fn test_started(&self, _description: &Description) {
        self.result.lock().run_count += 1;
    }

    fn test_failure(&self, failure: &Failure) {
        self.result.lock().failures.push(failure.clone());
    }

    fn test_assumption_failure(&self, failure: &Failure) {
        self.result.lock().assumption_failures.push(failure.clone());
    }

    fn test_ignored(&self, _description: &Description) {
        self.result.lock().ignore_count += 1;
    }
}
