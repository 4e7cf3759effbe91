//! Runs named suites one after another against a shared notifier.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use randomized_runner::{Description, Failure, RandomizedRunner, RunNotifier, RunResult, RunnerConfig, Throwable};

use crate::catalog;
use crate::error::{CliError, CliResult};

/// Expand suite arguments: `@file` reads one name per line, `stdin` appends
/// the names piped on standard input. Blank lines and `#` comments are skipped.
pub fn collect_suite_names(args: &[String], stdin: bool) -> CliResult<Vec<String>> {
    let mut names = Vec::new();
    for arg in args {
        match arg.strip_prefix('@') {
            Some(path) => names.extend(read_names(std::fs::read_to_string(Path::new(path))?.lines())),
            None => names.push(arg.trim().to_string()),
        }
    }
    if stdin {
        let lines = std::io::stdin().lock().lines().collect::<Result<Vec<_>, _>>()?;
        names.extend(read_names(lines.iter().map(String::as_str)));
    }
    names.retain(|n| !n.is_empty());
    if names.is_empty() {
        return Err(CliError::invalid_argument("no suites given"));
    }
    Ok(names)
}

fn read_names<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<String> {
    lines
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Build the runner for a catalog suite
pub fn prepare(name: &str, config: &RunnerConfig) -> CliResult<RandomizedRunner> {
    let suite = catalog::find(name).ok_or_else(|| CliError::unknown_suite(name))?;
    Ok(RandomizedRunner::new(suite, config.clone())?)
}

/// Executes suites and folds their results.
#[derive(Debug)]
pub struct Worker {
    notifier: Arc<RunNotifier>,
    config: RunnerConfig,
}

impl Worker {
    /// Worker reporting to `notifier`
    #[must_use]
    pub const fn new(notifier: Arc<RunNotifier>, config: RunnerConfig) -> Self {
        Self { notifier, config }
    }

    /// Run every suite in order; a suite that cannot start is reported as a
    /// suite-level failure and the rest still run.
    pub fn run_all(&self, names: &[String]) -> RunResult {
        let mut total = RunResult::default();
        for name in names {
            total.merge(&self.run_one(name));
        }
        total
    }

    /// Run a single suite
    pub fn run_one(&self, name: &str) -> RunResult {
        match prepare(name, &self.config) {
            Ok(runner) => {
                tracing::info!(suite = name, seed = %randomized_runner::format_seed(runner.runner_seed()), "running suite");
                runner.run(&self.notifier)
            }
            Err(e) => {
                tracing::warn!(suite = name, error = %e, "suite could not start");
                self.report_suite_failure(name, &e)
            }
        }
    }

    fn report_suite_failure(&self, name: &str, error: &CliError) -> RunResult {
        let description = Description::suite(name);
        let throwable = match error {
            CliError::UnknownSuite { .. } => Throwable::error("UnknownSuiteError", error.to_string()),
            _ => Throwable::error("SuiteError", error.to_string()),
        };
        let failure = Failure::new(description.clone(), throwable);

        self.notifier.fire_test_run_started(&description);
        self.notifier.fire_test_failure(&failure);
        let result = RunResult {
            failures: vec![failure],
            ..RunResult::default()
        };
        self.notifier.fire_test_run_finished(&result);
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use randomized_runner::RunListener;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl RunListener for Events {
        fn test_run_started(&self, d: &Description) {
            self.0.lock().push(format!("start:{}", d.display_name()));
        }
        fn test_failure(&self, f: &Failure) {
            self.0.lock().push(format!("failure:{}", f.description().display_name()));
        }
        fn test_run_finished(&self, _r: &RunResult) {
            self.0.lock().push("finish".to_string());
        }
    }

    #[test]
    fn test_collect_names_from_file() {
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("suites.txt");
        std::fs::write(&list, "demo.Arithmetic\n\n# comment\n  demo.Groups  \n").unwrap();

        let args = vec!["demo.Failing".to_string(), format!("@{}", list.display())];
        let names = collect_suite_names(&args, false).unwrap();
        assert_eq!(names, ["demo.Failing", "demo.Arithmetic", "demo.Groups"]);
    }

    #[test]
    fn test_collect_names_empty() {
        assert!(collect_suite_names(&[], false).is_err());
    }

    #[test]
    fn test_unknown_suite_is_reported_and_run_continues() {
        let notifier = Arc::new(RunNotifier::new());
        let events = Arc::new(Events::default());
        notifier.add_listener(events.clone());

        let worker = Worker::new(notifier, RunnerConfig::default());
        let result = worker.run_all(&["demo.Nope".to_string(), "demo.Arithmetic".to_string()]);

        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.run_count, 2);
        let recorded = events.0.lock().clone();
        assert_eq!(&recorded[..3], ["start:demo.Nope", "failure:demo.Nope", "finish"]);
        assert_eq!(recorded.iter().filter(|e| e.starts_with("start:")).count(), 2);
    }

    #[test]
    fn test_prepare_invalid_config() {
        let config = RunnerConfig::builder().property("tests.slow", "maybe").build().unwrap();
        assert!(prepare("demo.Groups", &config).is_err());
    }
}
