//! Shared helpers for suite-level integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use parking_lot::Mutex;
use randomized_runner::{
    Description, Failure, RandomizedRunner, RunListener, RunNotifier, RunResult, RunnerConfig,
    SuiteClass,
};

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Records every notifier event as a short string.
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl RunListener for Recorder {
    fn test_run_started(&self, _description: &Description) {
        self.push("run_started".to_string());
    }

    fn test_run_finished(&self, _result: &RunResult) {
        self.push("run_finished".to_string());
    }

    fn test_started(&self, description: &Description) {
        self.push(format!("started:{}", description.display_name()));
    }

    fn test_failure(&self, failure: &Failure) {
        self.push(format!(
            "failure:{}:{}",
            failure.description().display_name(),
            failure.message()
        ));
    }

    fn test_assumption_failure(&self, failure: &Failure) {
        self.push(format!("assumption:{}", failure.description().display_name()));
    }

    fn test_ignored(&self, description: &Description) {
        self.push(format!("ignored:{}", description.display_name()));
    }

    fn test_finished(&self, description: &Description) {
        self.push(format!("finished:{}", description.display_name()));
    }
}

/// Run `suite` with `config`, recording events.
pub fn run_recorded(suite: SuiteClass, config: RunnerConfig) -> (RunResult, Arc<Recorder>) {
    init_tracing();
    let runner = RandomizedRunner::new(suite, config).expect("suite should be valid");
    let notifier = Arc::new(RunNotifier::new());
    let recorder = Arc::new(Recorder::default());
    notifier.add_listener(recorder.clone());
    let result = runner.run(&notifier);
    (result, recorder)
}

/// Shared append-only log for hook bodies.
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn record(log: &Log, entry: &str) {
    log.lock().push(entry.to_string());
}
