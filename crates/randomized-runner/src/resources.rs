//! Resources closed at the end of a test or suite.
//!
//! Test code registers anything that needs cleanup through
//! [`RandomizedContext::close_after_test`](crate::RandomizedContext::close_after_test)
//! or [`close_after_suite`](crate::RandomizedContext::close_after_suite).
//! The runner closes them in reverse registration order when the scope
//! ends; each close failure is reported separately as a resource-disposal
//! failure.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::throwable::{TestResult, Throwable};

/// Something that must be released when its lifecycle scope ends.
///
/// # Example
///
/// ```ignore
/// struct TempDir(std::path::PathBuf);
///
/// impl Closeable for TempDir {
///     fn close(&mut self) -> TestResult {
///         std::fs::remove_dir_all(&self.0)?;
///         Ok(())
///     }
/// }
/// ```
pub trait Closeable: Send {
    /// Release the resource.
    fn close(&mut self) -> TestResult;

    /// Name used in failure messages.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Scope a resource is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleScope {
    /// Closed after the current test's after-each hooks
    Test,
    /// Closed after the suite's after-all hooks
    Suite,
}

impl fmt::Display for LifecycleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Test => f.write_str("TEST"),
            Self::Suite => f.write_str("SUITE"),
        }
    }
}

/// A closeable built from a closure.
pub struct CloseableFn {
    name: String,
    close_fn: Option<Box<dyn FnOnce() -> TestResult + Send>>,
}

impl fmt::Debug for CloseableFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseableFn")
            .field("name", &self.name)
            .field("closed", &self.close_fn.is_none())
            .finish()
    }
}

impl CloseableFn {
    /// Create a named closeable running `close_fn` once.
    #[must_use]
    pub fn new<F>(name: impl Into<String>, close_fn: F) -> Self
    where
        F: FnOnce() -> TestResult + Send + 'static,
    {
        Self {
            name: name.into(),
            close_fn: Some(Box::new(close_fn)),
        }
    }
}

impl Closeable for CloseableFn {
    fn close(&mut self) -> TestResult {
        match self.close_fn.take() {
            Some(f) => f(),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct Registered {
    resource: Box<dyn Closeable>,
    scope: LifecycleScope,
    thread_name: String,
}

/// Resources registered during one suite run.
#[derive(Default)]
pub(crate) struct ResourceRegistry {
    entries: Mutex<Vec<Registered>>,
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("registered", &self.entries.lock().len())
            .finish()
    }
}

impl ResourceRegistry {
    pub(crate) fn register(&self, resource: Box<dyn Closeable>, scope: LifecycleScope) {
        let thread_name = std::thread::current()
            .name()
            .unwrap_or("<unnamed>")
            .to_string();
        tracing::trace!(resource = resource.name(), %scope, thread = %thread_name, "registered closeable");
        self.entries.lock().push(Registered {
            resource,
            scope,
            thread_name,
        });
    }

    pub(crate) fn count(&self, scope: LifecycleScope) -> usize {
        self.entries.lock().iter().filter(|e| e.scope == scope).count()
    }

    /// Close every resource of `scope`, newest first. Returns one
    /// throwable per failed close.
    pub(crate) fn close(&self, scope: LifecycleScope) -> Vec<Throwable> {
        let mut selected = {
            let mut entries = self.entries.lock();
            let (matching, rest): (Vec<_>, Vec<_>) =
                entries.drain(..).partition(|e| e.scope == scope);
            *entries = rest;
            matching
        };

        let mut failures = Vec::new();
        while let Some(mut entry) = selected.pop() {
            let outcome = catch_unwind(AssertUnwindSafe(|| entry.resource.close()))
                .unwrap_or_else(|payload| Err(Throwable::from_panic(payload)));
            if let Err(cause) = outcome {
                failures.push(
                    Throwable::resource_disposal(format!(
                        "Resource in scope {} failed to close. Resource was registered from thread {}, resource: {}",
                        scope,
                        entry.thread_name,
                        entry.resource.name()
                    ))
                    .with_cause(cause),
                );
            }
        }
        failures
    }
}
