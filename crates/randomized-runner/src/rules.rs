//! Method rules: interceptors wrapped around a test body.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::annotations::ExpectedError;
use crate::suite::MethodDecl;
use crate::throwable::{TestResult, Throwable};

/// A deferred piece of test execution
pub type Statement<'a> = Box<dyn FnOnce() -> TestResult + 'a>;

/// Wraps the statement executing a test.
///
/// Rules are read from the test instance and applied in declaration order,
/// leaf level first; each one receives the statement built so far.
pub trait MethodRule: Send + Sync {
    /// Wrap `base`
    fn apply<'a>(
        &'a self,
        base: Statement<'a>,
        method: &'a MethodDecl,
        instance: &'a (dyn Any + Send + Sync),
    ) -> Statement<'a>;
}

/// Rule running a check after a successful test body.
///
/// The check is skipped when the body already failed.
pub struct Verifier {
    check: Arc<dyn Fn(&MethodDecl) -> TestResult + Send + Sync>,
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier").finish_non_exhaustive()
    }
}

impl Verifier {
    /// Verify with `check` after each passing test
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&MethodDecl) -> TestResult + Send + Sync + 'static,
    {
        Self {
            check: Arc::new(check),
        }
    }
}

impl MethodRule for Verifier {
    fn apply<'a>(
        &'a self,
        base: Statement<'a>,
        method: &'a MethodDecl,
        _instance: &'a (dyn Any + Send + Sync),
    ) -> Statement<'a> {
        Box::new(move || {
            base()?;
            (self.check)(method)
        })
    }
}

/// Rule recording the name of the running test.
#[derive(Debug, Default)]
pub struct TestNameRule {
    name: Mutex<Option<String>>,
}

impl TestNameRule {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the test currently (or last) running
    #[must_use]
    pub fn method_name(&self) -> Option<String> {
        self.name.lock().clone()
    }
}

impl MethodRule for TestNameRule {
    fn apply<'a>(
        &'a self,
        base: Statement<'a>,
        method: &'a MethodDecl,
        _instance: &'a (dyn Any + Send + Sync),
    ) -> Statement<'a> {
        Box::new(move || {
            *self.name.lock() = Some(method.name().to_string());
            base()
        })
    }
}

/// Innermost wrapper turning the expected error into success.
///
/// Assumption violations and thread death pass through untouched.
pub(crate) fn expect_error<'a>(base: Statement<'a>, expected: &'a ExpectedError) -> Statement<'a> {
    Box::new(move || match base() {
        Ok(()) => Err(Throwable::failure(format!("Expected exception: {}", expected.label()))),
        Err(t) if t.is_assumption() || t.is_thread_death() => Err(t),
        Err(t) if expected.matches(&t) => Ok(()),
        Err(t) => Err(Throwable::error(
            "Exception",
            format!(
                "Unexpected exception, expected<{}> but was<{}>",
                expected.label(),
                t.class_name()
            ),
        )
        .with_cause(t)),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::suite::{ClassDef, SuiteBuilder};

    #[derive(Default)]
    struct T;

    fn test_method() -> Arc<MethodDecl> {
        let suite = SuiteBuilder::new(ClassDef::<T>::new("S").test("testX", |_| Ok(()))).build();
        Arc::clone(&suite.levels()[0].methods()[0])
    }

    mod expected_tests {
        use super::*;

        #[test]
        fn test_matching_error_passes() {
            let expected = ExpectedError::class_name("AssertionError");
            let stmt = expect_error(Box::new(|| Err(Throwable::failure("boom"))), &expected);
            assert!(stmt().is_ok());
        }

        #[test]
        fn test_no_error_fails() {
            let expected = ExpectedError::panic();
            let err = expect_error(Box::new(|| Ok(())), &expected)().unwrap_err();
            assert_eq!(err.message(), "Expected exception: panic");
        }

        #[test]
        fn test_mismatch_keeps_cause() {
            let expected = ExpectedError::panic();
            let err = expect_error(Box::new(|| Err(Throwable::failure("boom"))), &expected)().unwrap_err();
            assert!(err.message().starts_with("Unexpected exception, expected<panic> but was<AssertionError>"));
            assert_eq!(err.cause().unwrap().message(), "boom");
        }

        #[test]
        fn test_assumption_passes_through() {
            let expected = ExpectedError::matching("anything", |_| true);
            let err = expect_error(Box::new(|| Err(Throwable::assumption("skip"))), &expected)().unwrap_err();
            assert!(err.is_assumption());
        }
    }

    mod rule_tests {
        use super::*;

        #[test]
        fn test_verifier_runs_after_success_only() {
            let method = test_method();
            let instance = T;
            let erased: &(dyn Any + Send + Sync) = &instance;
            let verifier = Verifier::new(|m| Err(Throwable::failure(format!("verify {}", m.name()))));

            let err = verifier.apply(Box::new(|| Ok(())), &method, erased)().unwrap_err();
            assert_eq!(err.message(), "verify testX");

            let err = verifier.apply(Box::new(|| Err(Throwable::failure("body"))), &method, erased)().unwrap_err();
            assert_eq!(err.message(), "body");
        }

        #[test]
        fn test_name_rule_records_method() {
            let method = test_method();
            let instance = T;
            let erased: &(dyn Any + Send + Sync) = &instance;
            let rule = TestNameRule::new();
            assert!(rule.apply(Box::new(|| Ok(())), &method, erased)().is_ok());
            assert_eq!(rule.method_name().as_deref(), Some("testX"));
        }
    }
}
