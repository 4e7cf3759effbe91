//! JSON-lines event stream for a supervising process.
//!
//! The file is truncated when opened. The first line is always a
//! [`Event::Bootstrap`] describing this worker, the last one [`Event::Quit`].

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use randomized_runner::{Description, Failure, RunListener, RunResult, TraceFormatting};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CliResult;

/// One line of the event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    /// Worker identity, sent once before anything else
    Bootstrap {
        /// Unique id of this worker run
        run_id: Uuid,
        /// Wall clock at startup
        timestamp: DateTime<Utc>,
        /// Process id
        pid: u32,
        /// Available parallelism
        processors: usize,
        /// Effective `tests.*` properties
        properties: BTreeMap<String, String>,
    },
    /// A suite is about to run
    SuiteStarted {
        /// Suite display name
        description: String,
        /// Number of test leaves
        tests: usize,
    },
    /// A suite has finished
    SuiteCompleted {
        /// Tests started
        run_count: usize,
        /// Tests ignored
        ignore_count: usize,
        /// Failures reported
        failure_count: usize,
        /// Wall time in milliseconds
        millis: u64,
    },
    /// A test has started
    TestStarted {
        /// Test display name
        description: String,
    },
    /// A failure on a test or on the suite itself
    TestFailure {
        /// Display name of the failing node
        description: String,
        /// Failure message
        message: String,
        /// Rendered throwable with its stack
        trace: String,
        /// Seed chain extracted from the trace, when present
        seed: Option<String>,
    },
    /// An assumption did not hold
    TestAssumptionIgnored {
        /// Display name of the node
        description: String,
        /// Assumption message
        message: String,
    },
    /// A test was skipped
    TestIgnored {
        /// Test display name
        description: String,
    },
    /// A test has finished
    TestFinished {
        /// Test display name
        description: String,
    },
    /// The worker is done
    Quit,
}

/// [`RunListener`] serializing every event as one JSON line.
#[derive(Debug)]
pub struct EventWriter {
    out: Mutex<BufWriter<File>>,
    formatting: TraceFormatting,
}

impl EventWriter {
    /// Truncate `path` and write the bootstrap event.
    pub fn create(path: &Path, properties: BTreeMap<String, String>, stack_filtering: bool) -> CliResult<Self> {
        let writer = Self {
            out: Mutex::new(BufWriter::new(File::create(path)?)),
            formatting: TraceFormatting::default().with_filtering(stack_filtering),
        };
        writer.write(&bootstrap(properties))?;
        Ok(writer)
    }

    /// Append one event and flush
    pub fn write(&self, event: &Event) -> CliResult<()> {
        let line = serde_json::to_string(event)?;
        let mut out = self.out.lock();
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }

    /// Write the final [`Event::Quit`]
    pub fn finish(&self) -> CliResult<()> {
        self.write(&Event::Quit)
    }

    fn emit(&self, event: &Event) {
        if let Err(e) = self.write(event) {
            tracing::warn!(error = %e, "failed to write event");
        }
    }
}

fn bootstrap(properties: BTreeMap<String, String>) -> Event {
    Event::Bootstrap {
        run_id: Uuid::new_v4(),
        timestamp: Utc::now(),
        pid: std::process::id(),
        processors: std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        properties,
    }
}

impl RunListener for EventWriter {
    fn test_run_started(&self, description: &Description) {
        self.emit(&Event::SuiteStarted {
            description: description.display_name().to_string(),
            tests: description.test_count(),
        });
    }

    fn test_run_finished(&self, result: &RunResult) {
        self.emit(&Event::SuiteCompleted {
            run_count: result.run_count,
            ignore_count: result.ignore_count,
            failure_count: result.failure_count(),
            millis: u64::try_from(result.run_time.as_millis()).unwrap_or(u64::MAX),
        });
    }

    fn test_started(&self, description: &Description) {
        self.emit(&Event::TestStarted {
            description: description.display_name().to_string(),
        });
    }

    fn test_failure(&self, failure: &Failure) {
        self.emit(&Event::TestFailure {
            description: failure.description().display_name().to_string(),
            message: failure.message().to_string(),
            trace: self.formatting.format_throwable(failure.throwable()),
            seed: failure.seed(),
        });
    }

    fn test_assumption_failure(&self, failure: &Failure) {
        self.emit(&Event::TestAssumptionIgnored {
            description: failure.description().display_name().to_string(),
            message: failure.message().to_string(),
        });
    }

    fn test_ignored(&self, description: &Description) {
        self.emit(&Event::TestIgnored {
            description: description.display_name().to_string(),
        });
    }

    fn test_finished(&self, description: &Description) {
        self.emit(&Event::TestFinished {
            description: description.display_name().to_string(),
        });
    }
}

/// Parse an event file back into events
pub fn read_events(path: &Path) -> CliResult<Vec<Event>> {
    std::fs::read_to_string(path)?
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(Into::into))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use randomized_runner::Throwable;
    use tempfile::TempDir;

    #[test]
    fn test_bootstrap_first_and_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "stale\n").unwrap();

        let mut props = BTreeMap::new();
        props.insert("tests.seed".to_string(), "DEADBEEF".to_string());
        let writer = EventWriter::create(&path, props, true).unwrap();
        writer.finish().unwrap();

        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 2);
        match &events[0] {
            Event::Bootstrap { pid, properties, .. } => {
                assert_eq!(*pid, std::process::id());
                assert_eq!(properties.get("tests.seed").map(String::as_str), Some("DEADBEEF"));
            }
            other => panic!("unexpected first event: {other:?}"),
        }
        assert_eq!(events[1], Event::Quit);
    }

    #[test]
    fn test_listener_events() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        let writer = EventWriter::create(&path, BTreeMap::new(), true).unwrap();

        let test = Description::test("S", "testA");
        writer.test_started(&test);
        writer.test_failure(&Failure::new(test.clone(), Throwable::failure("boom")));
        writer.test_finished(&test);

        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(&events[2], Event::TestFailure { message, .. } if message == "boom"));
        assert_eq!(
            events[3],
            Event::TestFinished {
                description: "testA(S)".to_string()
            }
        );
    }

    #[test]
    fn test_wire_tag() {
        let json = serde_json::to_string(&Event::TestIgnored {
            description: "x".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"TEST_IGNORED","description":"x"}"#);
    }
}
