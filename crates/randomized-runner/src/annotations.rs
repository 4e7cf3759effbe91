//! Declarative metadata attached to suites and methods.
//!
//! These values play the role annotations play in reflective frameworks:
//! they are read by the runner, never executed.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::notifier::RunListener;
use crate::randomness::parse_seed_chain;
use crate::result::{RunnerError, RunnerResult};
use crate::rules::MethodRule;
use crate::throwable::{Throwable, ThrowableKind};
use crate::validators::ClassValidator;

/// Value of a seed annotation: a literal chain or `random`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeedSpec {
    /// Use the derived seed
    Random,
    /// Fixed seeds
    Fixed(Vec<u64>),
}

impl SeedSpec {
    /// Parse `random` or a seed chain
    pub fn parse(text: &str) -> RunnerResult<Self> {
        if text.trim() == "random" {
            Ok(Self::Random)
        } else {
            parse_seed_chain(text).map(Self::Fixed)
        }
    }
}

/// Repetition of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repeat {
    /// Number of iterations (positive)
    pub iterations: u32,
    /// Every iteration uses the same seed
    pub use_constant_seed: bool,
}

impl Repeat {
    /// Repeat `iterations` times with varying seeds
    #[must_use]
    pub const fn new(iterations: u32) -> Self {
        Self {
            iterations,
            use_constant_seed: false,
        }
    }

    /// Use one seed for all iterations
    #[must_use]
    pub const fn constant_seed(mut self) -> Self {
        self.use_constant_seed = true;
        self
    }
}

/// Thread-leak policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadLeaks {
    /// Time to wait for stray threads to finish on their own (ms)
    pub linger_ms: u64,
    /// Report leaks as failures and try to terminate the threads
    pub fail: bool,
    /// Threads left by a test are checked at suite end instead
    pub leaked_threads_belong_to_suite: bool,
    /// Number of stack samples taken before terminating
    pub stack_samples: u32,
}

impl Default for ThreadLeaks {
    fn default() -> Self {
        Self {
            linger_ms: 0,
            fail: true,
            leaked_threads_belong_to_suite: false,
            stack_samples: 10,
        }
    }
}

impl ThreadLeaks {
    /// Set the linger time
    #[must_use]
    pub const fn linger_ms(mut self, millis: u64) -> Self {
        self.linger_ms = millis;
        self
    }

    /// Enable/disable failing on leaks
    #[must_use]
    pub const fn fail(mut self, fail: bool) -> Self {
        self.fail = fail;
        self
    }

    /// Defer test-scope leaks to the suite scope
    #[must_use]
    pub const fn belong_to_suite(mut self, belong: bool) -> Self {
        self.leaked_threads_belong_to_suite = belong;
        self
    }

    /// Set the number of stack samples
    #[must_use]
    pub const fn stack_samples(mut self, samples: u32) -> Self {
        self.stack_samples = samples;
        self
    }
}

/// A named test group that can be switched on or off by a property
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestGroup {
    name: String,
    enabled: bool,
    property: Option<String>,
}

impl TestGroup {
    /// Group enabled by default, switched by `tests.<name>`
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            property: None,
        }
    }

    /// The built-in `nightly` group, disabled unless nightly mode is on
    #[must_use]
    pub fn nightly() -> Self {
        Self::new(NIGHTLY_GROUP).enabled(false)
    }

    /// Set the default state
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Override the switching property
    #[must_use]
    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    /// Group name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default state
    #[must_use]
    pub const fn is_enabled_by_default(&self) -> bool {
        self.enabled
    }

    /// Property switching this group
    #[must_use]
    pub fn property_name(&self) -> String {
        self.property
            .clone()
            .unwrap_or_else(|| format!("tests.{}", self.name))
    }
}

/// Name of the built-in nightly group.
pub const NIGHTLY_GROUP: &str = "nightly";

/// Matcher for the error a test is expected to produce
#[derive(Clone)]
pub struct ExpectedError {
    label: String,
    matcher: Arc<dyn Fn(&Throwable) -> bool + Send + Sync>,
}

impl ExpectedError {
    /// Expect an error of type `E` (matched by downcast)
    #[must_use]
    pub fn of<E: std::error::Error + 'static>() -> Self {
        Self::matching(std::any::type_name::<E>(), |t| t.downcast_ref::<E>().is_some())
    }

    /// Expect a throwable with this class tag
    #[must_use]
    pub fn class_name(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        let expected = class_name.clone();
        Self::matching(class_name, move |t| t.class_name() == expected)
    }

    /// Expect any panic
    #[must_use]
    pub fn panic() -> Self {
        Self::matching("panic", |t| t.kind() == ThrowableKind::Panic)
    }

    /// Expect a throwable accepted by a predicate
    pub fn matching<F>(label: impl Into<String>, matcher: F) -> Self
    where
        F: Fn(&Throwable) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            matcher: Arc::new(matcher),
        }
    }

    /// Description of what is expected
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the throwable is the expected one
    #[must_use]
    pub fn matches(&self, throwable: &Throwable) -> bool {
        (self.matcher)(throwable)
    }
}

impl fmt::Debug for ExpectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExpectedError").field(&self.label).finish()
    }
}

/// Produces a listener for one run.
pub type ListenerFactory =
    Arc<dyn Fn() -> Result<Arc<dyn RunListener>, Throwable> + Send + Sync>;

/// Metadata on a method
#[derive(Debug, Clone, Default)]
pub struct MethodAnnotations {
    /// Single seed (`random` or one value)
    pub seed: Option<String>,
    /// Multiple seeds, each a separate candidate family
    pub seeds: Vec<String>,
    /// Repetition
    pub repeat: Option<Repeat>,
    /// Dedicated timeout annotation (ms)
    pub timeout_ms: Option<u64>,
    /// Timeout carried by the test declaration itself (ms)
    pub test_timeout_ms: Option<u64>,
    /// Expected error
    pub expected: Option<ExpectedError>,
    /// Skip unconditionally
    pub ignored: bool,
    /// Test groups
    pub groups: Vec<TestGroup>,
    /// Thread-leak policy override
    pub thread_leaks: Option<ThreadLeaks>,
}

/// Metadata on a class level
#[derive(Clone, Default)]
pub struct ClassAnnotations {
    /// Seed chain (`random`, `runner` or `runner:method`)
    pub seed: Option<String>,
    /// Repetition applied to every test of the suite
    pub repeat: Option<Repeat>,
    /// Timeout applied to every test of the suite (ms)
    pub timeout_ms: Option<u64>,
    /// Thread-leak policy
    pub thread_leaks: Option<ThreadLeaks>,
    /// Test groups applied to every test of the suite
    pub groups: Vec<TestGroup>,
    /// Listeners subscribed for the duration of a run
    pub listeners: Vec<ListenerFactory>,
    /// Validators run before any hook
    pub validators: Vec<Arc<dyn ClassValidator>>,
    /// Method rules (evaluated against the test instance)
    pub rules: Vec<RuleDecl>,
}

impl fmt::Debug for ClassAnnotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassAnnotations")
            .field("seed", &self.seed)
            .field("repeat", &self.repeat)
            .field("timeout_ms", &self.timeout_ms)
            .field("thread_leaks", &self.thread_leaks)
            .field("groups", &self.groups)
            .field("listeners", &self.listeners.len())
            .field("validators", &self.validators.len())
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// A rule field: reads a rule from a test instance.
pub type RuleDecl = Arc<
    dyn Fn(&(dyn std::any::Any + Send + Sync)) -> Option<Arc<dyn MethodRule>> + Send + Sync,
>;

/// Parse a method-level seed annotation; only one seed is allowed.
pub(crate) fn parse_method_seed(text: &str) -> RunnerResult<SeedSpec> {
    let spec = SeedSpec::parse(text)?;
    if let SeedSpec::Fixed(chain) = &spec {
        if chain.len() > 1 {
            return Err(RunnerError::config(
                "Seed on methods must contain one seed only (no runner seed)",
            ));
        }
    }
    Ok(spec)
}
