//! Suite validators run before any hook.

use crate::collector::{all_declared_methods, flatten, remove_overrides};
use crate::suite::{MethodRole, SuiteClass};
use crate::throwable::{TestResult, Throwable};

/// Checks a suite before it runs. A failure aborts the suite.
pub trait ClassValidator: Send + Sync {
    /// Validate `suite`
    fn validate(&self, suite: &SuiteClass) -> TestResult;

    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Rejects public instance methods named `test*` that are not tests.
///
/// Such methods are usually tests that lost their declaration and silently
/// stopped running.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUnannotatedTestMethods;

impl ClassValidator for NoUnannotatedTestMethods {
    fn validate(&self, suite: &SuiteClass) -> TestResult {
        let methods = flatten(&remove_overrides(&all_declared_methods(suite)));
        for m in methods {
            if m.is_public()
                && !m.is_static()
                && m.name().starts_with("test")
                && m.role() != MethodRole::Test
            {
                return Err(Throwable::error(
                    "RuntimeException",
                    format!(
                        "Class {} has a public instance method starting with 'test' that is not declared as a test, possibly a dead test case: {}",
                        suite.name(),
                        m.name()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "NoUnannotatedTestMethods"
    }
}
