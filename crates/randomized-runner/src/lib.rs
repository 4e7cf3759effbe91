//! Randomized test runner with reproducible seeds.
//!
//! Every run is driven by a single runner seed. Test methods, hooks and
//! per-test randomness are all derived from it, so a failing run can be
//! replayed exactly from the seed chain printed with the failure.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌──────────────┐   ┌────────────┐
//! │ SuiteClass │──►│ Validation │──►│  Candidates  │──►│   Runner   │
//! │ (builder)  │   │ + groups   │   │ seeds/iters  │   │ main-[SEED]│
//! └────────────┘   └────────────┘   └──────────────┘   └─────┬──────┘
//!                                                            │
//!          ┌──────────────────┬───────────────────┬──────────┴───────┐
//!          ▼                  ▼                   ▼                  ▼
//!    RunNotifier       RunnerThreadGroup    ThreadTerminator   Closeable
//!    (listeners)       (supervised threads) (timeouts, leaks)  (close after test)
//! ```
//!
//! # Example
//!
//! ```
//! use randomized_runner::{run_suite, ClassDef, RandomizedContext, RunnerConfig, SuiteBuilder};
//!
//! #[derive(Default)]
//! struct Arithmetic;
//!
//! let suite = SuiteBuilder::new(ClassDef::<Arithmetic>::new("Arithmetic").test("testAdd", |_| {
//!     let n = randomized_runner::random_int_between(0, 100)?;
//!     assert!((0..=100).contains(&n));
//!     assert!(RandomizedContext::current()?.seed_chain()?.len() >= 2);
//!     Ok(())
//! }))
//! .default_constructor()
//! .build();
//!
//! let result = run_suite(suite, RunnerConfig::default()).unwrap();
//! assert!(result.was_successful());
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

pub mod annotations;
pub mod candidates;
pub mod collector;
pub mod context;
pub mod description;
pub mod filter;
pub mod generators;
pub mod groups;
pub mod leaks;
pub mod notifier;
pub mod randomness;
pub mod resources;
pub mod result;
pub mod rules;
pub mod runner;
pub mod suite;
pub mod supervised;
pub mod throwable;
pub mod validation;
pub mod validators;

pub use annotations::{ExpectedError, Repeat, SeedSpec, TestGroup, ThreadLeaks, NIGHTLY_GROUP};
pub use candidates::{SeedPlan, TestCandidate};
pub use context::RandomizedContext;
pub use description::{Description, TestName};
pub use filter::{Filter, FnFilter, MethodGlobFilter};
pub use generators::{
    current_seed_chain, random_bool, random_from, random_from_iter, random_int_between, random_pick,
    random_u64,
};
pub use groups::GroupEvaluator;
pub use leaks::{KnownDaemonFilter, ThreadLeakFilter, ThreadTerminator};
pub use notifier::{Failure, ResultListener, RunListener, RunNotifier, RunResult};
pub use randomness::{format_seed, format_seed_chain, parse_seed, parse_seed_chain, Randomness, SeedChain};
pub use resources::{Closeable, CloseableFn, LifecycleScope};
pub use result::{RunnerError, RunnerResult};
pub use rules::{MethodRule, Statement, TestNameRule, Verifier};
pub use runner::{run_suite, RandomizedRunner, RunnerConfig, RunnerConfigBuilder};
pub use suite::{ClassDef, MethodDef, MethodRole, ParamSet, ParamValue, SuiteBuilder, SuiteClass, Visibility};
pub use supervised::{RunnerThreadGroup, SupervisedThread};
pub use throwable::{
    assume_false, assume_no_error, assume_true, seed_from_throwable, StackFrame, TestResult, Throwable,
    TraceFormatting,
};
pub use validators::{ClassValidator, NoUnannotatedTestMethods};
