//! Candidate filters.

use std::fmt;

use glob::Pattern;

use crate::description::Description;
use crate::result::{RunnerError, RunnerResult};

/// Selects candidates by description.
pub trait Filter: Send + Sync {
    /// Whether the candidate should run
    fn should_run(&self, description: &Description) -> bool;

    /// Human-readable summary
    fn describe(&self) -> String;
}

/// Keeps candidates whose bare method name matches a glob.
#[derive(Clone)]
pub struct MethodGlobFilter {
    pattern: Pattern,
}

impl fmt::Debug for MethodGlobFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MethodGlobFilter").field(&self.pattern.as_str()).finish()
    }
}

impl MethodGlobFilter {
    /// Compile `pattern`
    pub fn new(pattern: &str) -> RunnerResult<Self> {
        Pattern::new(pattern)
            .map(|pattern| Self { pattern })
            .map_err(|e| RunnerError::config(format!("Invalid method glob '{pattern}': {e}")))
    }
}

impl Filter for MethodGlobFilter {
    fn should_run(&self, description: &Description) -> bool {
        description
            .bare_method_name()
            .is_some_and(|name| self.pattern.matches(name))
    }

    fn describe(&self) -> String {
        format!("method matches {}", self.pattern.as_str())
    }
}

/// Keeps candidates accepted by a closure.
pub struct FnFilter<F> {
    label: String,
    predicate: F,
}

impl<F> fmt::Debug for FnFilter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnFilter").field(&self.label).finish()
    }
}

impl<F> FnFilter<F>
where
    F: Fn(&Description) -> bool + Send + Sync,
{
    /// Filter labelled `label`
    pub fn new(label: impl Into<String>, predicate: F) -> Self {
        Self {
            label: label.into(),
            predicate,
        }
    }
}

impl<F> Filter for FnFilter<F>
where
    F: Fn(&Description) -> bool + Send + Sync,
{
    fn should_run(&self, description: &Description) -> bool {
        (self.predicate)(description)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_matches_bare_name() {
        let filter = MethodGlobFilter::new("testA*").unwrap();
        assert!(filter.should_run(&Description::test("S", "testAlpha #1 [AB:CD]")));
        assert!(!filter.should_run(&Description::test("S", "testBeta [AB:CD]")));
        assert!(!filter.should_run(&Description::suite("S")));
        assert_eq!(filter.describe(), "method matches testA*");
    }

    #[test]
    fn test_invalid_glob() {
        assert!(MethodGlobFilter::new("test[").unwrap_err().is_config());
    }

    #[test]
    fn test_fn_filter() {
        let filter = FnFilter::new("only b", |d: &Description| d.display_name().contains('b'));
        assert!(filter.should_run(&Description::test("S", "b")));
        assert!(!filter.should_run(&Description::test("S", "a")));
    }
}
