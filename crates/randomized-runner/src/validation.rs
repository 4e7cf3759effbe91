//! Structural checks of a suite, run before any listener or hook.
//!
//! Violations are fatal: the runner refuses to build and the error is
//! surfaced once for the whole suite.

use crate::annotations::{parse_method_seed, SeedSpec};
use crate::collector::{check_ambiguous, flatten, remove_overrides, with_role, MethodLevels};
use crate::result::{RunnerError, RunnerResult};
use crate::suite::{MethodDecl, MethodRole, SuiteClass, Visibility};

/// Fluent checks over one method; the first violation is kept.
struct MethodCheck<'a> {
    method: &'a MethodDecl,
    error: Option<String>,
}

impl<'a> MethodCheck<'a> {
    fn new(method: &'a MethodDecl) -> Self {
        Self { method, error: None }
    }

    fn fail(mut self, what: &str) -> Self {
        if self.error.is_none() {
            self.error = Some(format!(
                "Method {}#{} (@{}) {}",
                self.method.declaring_class(),
                self.method.name(),
                self.method.role(),
                what
            ));
        }
        self
    }

    fn is_static(self, expected: bool) -> Self {
        match (self.method.is_static(), expected) {
            (false, true) => self.fail("must be static"),
            (true, false) => self.fail("must not be static"),
            _ => self,
        }
    }

    fn is_public(self) -> Self {
        if self.method.visibility() == Visibility::Public {
            self
        } else {
            self.fail("must be public")
        }
    }

    fn has_args(self, count: usize) -> Self {
        if self.method.param_count() == count {
            self
        } else {
            let message = format!(
                "must take {count} argument(s), but declares {}",
                self.method.param_count()
            );
            self.fail(&message)
        }
    }

    fn finish(self) -> RunnerResult<()> {
        self.error.map_or(Ok(()), |e| Err(RunnerError::validation(e)))
    }
}

fn check_role(levels: &MethodLevels, role: MethodRole, is_static: bool) -> RunnerResult<()> {
    for method in flatten(&with_role(levels, role)) {
        MethodCheck::new(&method)
            .is_static(is_static)
            .is_public()
            .has_args(0)
            .finish()?;
    }
    Ok(())
}

fn check_test_annotations(method: &MethodDecl) -> RunnerResult<()> {
    let annotations = method.annotations();
    let context = || format!("{}#{}", method.declaring_class(), method.name());

    if annotations.seed.is_some() && !annotations.seeds.is_empty() {
        return Err(RunnerError::config(format!(
            "Method {} declares both a seed and a seed list; use one",
            context()
        )));
    }
    for seed in annotations.seed.iter().chain(&annotations.seeds) {
        parse_method_seed(seed)
            .map_err(|e| RunnerError::config(format!("Invalid seed on method {}: {e}", context())))?;
    }
    if let Some(repeat) = annotations.repeat {
        if repeat.iterations == 0 {
            return Err(RunnerError::config(format!(
                "Repeat on method {} must have at least one iteration",
                context()
            )));
        }
    }
    if let (Some(a), Some(b)) = (annotations.timeout_ms, annotations.test_timeout_ms) {
        if a != b {
            return Err(RunnerError::config(format!(
                "Conflicting timeouts on method {}: timeout annotation {a} ms vs test timeout {b} ms",
                context()
            )));
        }
    }
    Ok(())
}

fn check_class_annotations(suite: &SuiteClass) -> RunnerResult<()> {
    for level in suite.levels() {
        let annotations = level.annotations();
        if let Some(seed) = &annotations.seed {
            if let SeedSpec::Fixed(chain) = SeedSpec::parse(seed)? {
                if chain.len() > 2 {
                    return Err(RunnerError::config(format!(
                        "Seed on class {} must be a runner seed with an optional method seed, got '{seed}'",
                        level.name()
                    )));
                }
            }
        }
        if annotations.repeat.is_some_and(|r| r.iterations == 0) {
            return Err(RunnerError::config(format!(
                "Repeat on class {} must have at least one iteration",
                level.name()
            )));
        }
    }
    Ok(())
}

/// Validate the suite's structure and metadata.
pub fn validate_target(suite: &SuiteClass, levels: &MethodLevels) -> RunnerResult<()> {
    if !suite.is_public() {
        return Err(RunnerError::validation(format!(
            "Test class must be public: {}",
            suite.name()
        )));
    }
    if suite.is_abstract() {
        return Err(RunnerError::validation(format!(
            "Test class must not be abstract: {}",
            suite.name()
        )));
    }
    check_ambiguous(suite)?;

    let resolved = remove_overrides(levels);
    check_role(&resolved, MethodRole::BeforeAll, true)?;
    check_role(&resolved, MethodRole::AfterAll, true)?;
    check_role(&resolved, MethodRole::BeforeEach, false)?;
    check_role(&resolved, MethodRole::AfterEach, false)?;
    check_role(&resolved, MethodRole::Test, false)?;
    check_role(&resolved, MethodRole::ParametersFactory, true)?;

    let tests = flatten(&with_role(&resolved, MethodRole::Test));
    for test in &tests {
        check_test_annotations(test)?;
    }
    check_class_annotations(suite)?;

    let has_factory = !flatten(&with_role(&resolved, MethodRole::ParametersFactory)).is_empty();
    if !tests.is_empty() {
        match suite.constructor() {
            None => {
                return Err(RunnerError::validation(format!(
                    "Test class {} must declare a constructor",
                    suite.name()
                )))
            }
            Some(c) if c.visibility() != Visibility::Public => {
                return Err(RunnerError::validation(format!(
                    "Constructor of test class {} must be public",
                    suite.name()
                )))
            }
            Some(c) if !has_factory && c.arity() != 0 => {
                return Err(RunnerError::validation(format!(
                    "Test class {} has a constructor with {} argument(s) but no parameters factory",
                    suite.name(),
                    c.arity()
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}
