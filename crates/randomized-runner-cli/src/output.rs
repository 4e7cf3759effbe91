//! Console reporting of run events

use std::collections::HashMap;
use std::time::{Duration, Instant};

use console::{style, Term};
use parking_lot::Mutex;
use randomized_runner::{Description, Failure, RunListener, RunResult, TraceFormatting};

/// Outcome of a single test line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Failure,
    Ignored,
    Assumption,
    Error,
}

impl Status {
    const fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Failure => "FAILURE",
            Self::Ignored => "IGNORED",
            Self::Assumption => "IGNOR/A",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    started: Option<Instant>,
    failures: Vec<Failure>,
}

/// Prints one line per finished test and a per-suite summary.
///
/// Lines look like `OK      0.01s | Suite.testA [SEED]`; failures are
/// followed by their numbered throwables.
#[derive(Debug)]
pub struct ConsoleReporter {
    term: Term,
    use_color: bool,
    quiet: bool,
    formatting: TraceFormatting,
    pending: Mutex<HashMap<String, Pending>>,
    suite_started: Mutex<Option<Instant>>,
}

impl ConsoleReporter {
    /// Reporter writing to stdout
    #[must_use]
    pub fn new(use_color: bool, quiet: bool, stack_filtering: bool) -> Self {
        Self {
            term: Term::stdout(),
            use_color,
            quiet,
            formatting: TraceFormatting::default().with_filtering(stack_filtering),
            pending: Mutex::new(HashMap::new()),
            suite_started: Mutex::new(None),
        }
    }

    fn paint(&self, status: Status) -> String {
        let label = format!("{:<8}", status.label());
        if !self.use_color {
            return label;
        }
        match status {
            Status::Ok => style(label).green().to_string(),
            Status::Failure | Status::Error => style(label).red().bold().to_string(),
            Status::Ignored | Status::Assumption => style(label).yellow().to_string(),
        }
    }

    fn write(&self, line: &str) {
        let _ = self.term.write_line(line);
    }

    fn report(&self, status: Status, elapsed: Duration, description: &Description, failures: &[Failure]) {
        if self.quiet && matches!(status, Status::Ok | Status::Ignored | Status::Assumption) {
            return;
        }
        let mut line = format!(
            "{}{:>6.2}s | {}",
            self.paint(status),
            elapsed.as_secs_f64(),
            format_description(description)
        );
        for (i, failure) in failures.iter().enumerate() {
            let throwable = failure.throwable();
            let body = if throwable.is_assumption() {
                format!("Assumption #{}: {}", i + 1, throwable.message())
            } else {
                format!("Throwable #{}: {}", i + 1, self.formatting.format_throwable(throwable))
            };
            for text in body.trim_end().lines() {
                line.push_str("\n   > ");
                line.push_str(text);
            }
        }
        self.write(&line);
    }
}

/// `Class.method` for tests, `Class (suite)` for suites.
#[must_use]
pub fn format_description(description: &Description) -> String {
    let short = |class: &str| class.rsplit('.').next().unwrap_or(class).to_string();
    match (description.class_name(), description.method_name()) {
        (Some(class), Some(method)) => format!("{}.{method}", short(class)),
        (Some(class), None) => format!("{} (suite)", short(class)),
        _ => description.display_name().to_string(),
    }
}

/// One-line summary of a suite run
#[must_use]
pub fn summary_line(result: &RunResult) -> String {
    let plural = |n: usize, word: &str| if n == 1 { format!("{n} {word}") } else { format!("{n} {word}s") };
    let mut line = format!(
        "Completed in {:.2}s, {}",
        result.run_time.as_secs_f64(),
        plural(result.run_count, "test")
    );
    if result.failure_count() > 0 {
        line.push_str(&format!(", {}", plural(result.failure_count(), "failure")));
    }
    if result.ignore_count > 0 {
        line.push_str(&format!(", {} skipped", result.ignore_count));
    }
    if !result.was_successful() {
        line.push_str(" <<< FAILURES!");
    }
    line
}

impl RunListener for ConsoleReporter {
    fn test_run_started(&self, description: &Description) {
        *self.suite_started.lock() = Some(Instant::now());
        if !self.quiet {
            self.write(&format!("Suite: {}", description.display_name()));
        }
    }

    fn test_run_finished(&self, result: &RunResult) {
        let line = summary_line(result);
        if self.use_color && !result.was_successful() {
            self.write(&style(line).red().to_string());
        } else {
            self.write(&line);
        }
    }

    fn test_started(&self, description: &Description) {
        self.pending.lock().insert(
            description.display_name().to_string(),
            Pending {
                started: Some(Instant::now()),
                failures: Vec::new(),
            },
        );
    }

    fn test_failure(&self, failure: &Failure) {
        let key = failure.description().display_name().to_string();
        if let Some(entry) = self.pending.lock().get_mut(&key) {
            entry.failures.push(failure.clone());
            return;
        }
        let elapsed = self.suite_started.lock().map_or(Duration::ZERO, |s| s.elapsed());
        self.report(Status::Error, elapsed, failure.description(), std::slice::from_ref(failure));
    }

    fn test_assumption_failure(&self, failure: &Failure) {
        self.test_failure(failure);
    }

    fn test_ignored(&self, description: &Description) {
        self.report(Status::Ignored, Duration::ZERO, description, &[]);
    }

    fn test_finished(&self, description: &Description) {
        let Some(entry) = self.pending.lock().remove(description.display_name()) else {
            return;
        };
        let status = if entry.failures.iter().any(|f| !f.throwable().is_assumption()) {
            Status::Failure
        } else if entry.failures.is_empty() {
            Status::Ok
        } else {
            Status::Assumption
        };
        let elapsed = entry.started.map_or(Duration::ZERO, |s| s.elapsed());
        self.report(status, elapsed, description, &entry.failures);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format_description() {
        assert_eq!(
            format_description(&Description::test("org.example.Arithmetic", "testAdd [A:B]")),
            "Arithmetic.testAdd [A:B]"
        );
        assert_eq!(format_description(&Description::suite("org.example.Arithmetic")), "Arithmetic (suite)");
    }

    #[test]
    fn test_summary_line() {
        let mut result = RunResult {
            run_count: 5,
            ignore_count: 2,
            ..RunResult::default()
        };
        assert_eq!(summary_line(&result), "Completed in 0.00s, 5 tests, 2 skipped");

        result.failures.push(Failure::new(
            Description::test("S", "testA"),
            randomized_runner::Throwable::failure("boom"),
        ));
        assert!(summary_line(&result).ends_with("1 failure, 2 skipped <<< FAILURES!"));
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(Status::Assumption.label(), "IGNOR/A");
        assert_eq!(Status::Ok.label(), "OK");
    }
}
