//! Suite orchestration.
//!
//! [`RandomizedRunner`] validates a suite, expands it into candidates and
//! drives them on a supervised `main` thread: class listeners and
//! validators, suite hooks, per-candidate hooks and rules, timeouts,
//! resource disposal and thread-leak checks.

pub mod config;

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::annotations::ThreadLeaks;
use crate::candidates::{build_candidates, describe, SeedPlan, TestCandidate};
use crate::collector::{all_declared_methods, hooks_in_order};
use crate::context::{self, SuiteContext};
use crate::description::Description;
use crate::filter::{Filter, MethodGlobFilter};
use crate::groups::GroupEvaluator;
use crate::leaks::{KnownDaemonFilter, StackSamples, ThreadLeakFilter, ThreadTerminator};
use crate::notifier::{Failure, ResultListener, RunListener, RunNotifier, RunResult};
use crate::randomness::{format_seed, format_seed_chain, Randomness};
use crate::resources::LifecycleScope;
use crate::result::{RunnerError, RunnerResult};
use crate::rules::{expect_error, MethodRule, Statement};
use crate::suite::{MethodDecl, MethodRole, SuiteClass};
use crate::supervised::{self, RunnerThreadGroup};
use crate::throwable::{install_panic_hook, TestResult, Throwable};
use crate::validation::validate_target;

pub use config::{RunnerConfig, RunnerConfigBuilder};

/// Prefix of failures reported by a thread the supervisor tried to stop
pub const AFTER_TERMINATION_PREFIX: &str = "(after termination attempt) ";

/// Hooks resolved and shuffled once per runner
#[derive(Debug, Clone, Default)]
struct HookPlan {
    before_all: Vec<Arc<MethodDecl>>,
    after_all: Vec<Arc<MethodDecl>>,
    before_each: Vec<Arc<MethodDecl>>,
    after_each: Vec<Arc<MethodDecl>>,
}

/// Runs one suite with reproducible randomness.
///
/// Construction fails on structural problems (bad hooks, conflicting
/// annotations, unknown groups); everything else is reported through the
/// [`RunNotifier`] while running.
pub struct RandomizedRunner {
    suite: SuiteClass,
    config: RunnerConfig,
    plan: SeedPlan,
    groups: GroupEvaluator,
    candidates: Vec<Arc<TestCandidate>>,
    description: Description,
    hooks: HookPlan,
    leak_filter: Arc<dyn ThreadLeakFilter>,
}

impl fmt::Debug for RandomizedRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomizedRunner")
            .field("suite", &self.suite.name())
            .field("runner_seed", &format_seed(self.plan.runner_seed))
            .field("candidates", &self.candidates.len())
            .finish()
    }
}

impl RandomizedRunner {
    /// Validate `suite` and expand it into candidates.
    pub fn new(suite: SuiteClass, config: RunnerConfig) -> RunnerResult<Self> {
        let levels = all_declared_methods(&suite);
        validate_target(&suite, &levels)?;

        let groups = GroupEvaluator::new(&config);
        for level in suite.levels() {
            groups.validate(&level.annotations().groups)?;
            for method in level.methods() {
                groups.validate(&method.annotations().groups)?;
            }
        }

        let plan = SeedPlan::resolve(&suite, &config)?;
        let set = build_candidates(&suite, &levels, &plan, &config)?;
        let mut candidates = set.candidates;

        if config.test_class.as_deref().is_some_and(|c| c != suite.name()) {
            tracing::debug!(suite = suite.name(), "suite excluded by class filter");
            candidates.clear();
        }
        if let Some(method) = config.test_method.as_deref() {
            candidates.retain(|c| c.method().name() == method);
        }
        if let Some(glob) = config.method_glob.as_deref() {
            let filter = MethodGlobFilter::new(glob)?;
            candidates.retain(|c| filter.should_run(c.description()));
        }

        let hooks = HookPlan {
            before_all: hooks_in_order(&levels, MethodRole::BeforeAll, plan.runner_seed),
            after_all: hooks_in_order(&levels, MethodRole::AfterAll, plan.runner_seed),
            before_each: hooks_in_order(&levels, MethodRole::BeforeEach, plan.runner_seed),
            after_each: hooks_in_order(&levels, MethodRole::AfterEach, plan.runner_seed),
        };

        let description = describe(suite.name(), &candidates);
        tracing::debug!(
            suite = suite.name(),
            seed = %format_seed(plan.runner_seed),
            candidates = candidates.len(),
            "runner ready"
        );

        Ok(Self {
            suite,
            config,
            plan,
            groups,
            candidates,
            description,
            hooks,
            leak_filter: Arc::new(KnownDaemonFilter::default()),
        })
    }

    /// Root description of the candidates that will run
    #[must_use]
    pub fn description(&self) -> &Description {
        &self.description
    }

    /// Seed of this runner
    #[must_use]
    pub const fn runner_seed(&self) -> u64 {
        self.plan.runner_seed
    }

    /// Candidates in execution order
    #[must_use]
    pub fn candidates(&self) -> &[Arc<TestCandidate>] {
        &self.candidates
    }

    /// Effective configuration
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Keep only candidates accepted by `filter`.
    ///
    /// Fails if nothing is left to run.
    pub fn filter(&mut self, filter: &dyn Filter) -> RunnerResult<()> {
        self.candidates.retain(|c| filter.should_run(c.description()));
        if self.candidates.is_empty() {
            return Err(RunnerError::invalid_argument(format!(
                "No tests found in {} matching: {}",
                self.suite.name(),
                filter.describe()
            )));
        }
        self.description = describe(self.suite.name(), &self.candidates);
        Ok(())
    }

    /// Replace the filter deciding which leaked threads are ignored
    #[must_use]
    pub fn with_leak_filter(mut self, filter: Arc<dyn ThreadLeakFilter>) -> Self {
        self.leak_filter = filter;
        self
    }

    /// Run the suite, reporting to `notifier`.
    ///
    /// Blocks until the suite's `main` thread finishes.
    pub fn run(&self, notifier: &Arc<RunNotifier>) -> RunResult {
        install_panic_hook();

        let group = RunnerThreadGroup::new(format!("TGRP-{}", self.suite.name()));
        let accounting = Arc::new(ResultListener::new());
        let listener: Arc<dyn RunListener> = accounting.clone();
        notifier.add_listener(Arc::clone(&listener));

        let execution = Arc::new(Execution {
            suite: self.suite.clone(),
            runner_seed: self.plan.runner_seed,
            groups: self.groups.clone(),
            candidates: self.candidates.clone(),
            description: self.description.clone(),
            hooks: self.hooks.clone(),
            terminator: ThreadTerminator::new(
                group.clone(),
                self.config.kill_attempts,
                Duration::from_millis(self.config.kill_wait_ms),
                Arc::clone(&self.leak_filter),
            ),
            notifier: Arc::clone(notifier),
            accounting: Arc::clone(&accounting),
        });

        let main = Arc::clone(&execution);
        let name = format!("main-[{}]", format_seed(self.plan.runner_seed));
        match group.spawn(name, move || main.run_suite()) {
            Ok(thread) => {
                thread.join(None);
            }
            Err(e) => execution.report(&self.description, Throwable::from_error(e), &[self.plan.runner_seed]),
        }
        execution.process_uncaught(&self.description, &[self.plan.runner_seed]);

        notifier.remove_listener(&listener);
        accounting.result()
    }
}

/// Build a runner for `suite` and run it with a fresh notifier.
pub fn run_suite(suite: SuiteClass, config: RunnerConfig) -> RunnerResult<RunResult> {
    let runner = RandomizedRunner::new(suite, config)?;
    Ok(runner.run(&Arc::new(RunNotifier::new())))
}

/// State shared by the threads of one run
struct Execution {
    suite: SuiteClass,
    runner_seed: u64,
    groups: GroupEvaluator,
    candidates: Vec<Arc<TestCandidate>>,
    description: Description,
    hooks: HookPlan,
    terminator: ThreadTerminator,
    notifier: Arc<RunNotifier>,
    accounting: Arc<ResultListener>,
}

fn guarded(f: impl FnOnce() -> TestResult) -> TestResult {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(Throwable::from_panic(payload)))
}

impl Execution {
    fn report(&self, description: &Description, throwable: Throwable, seeds: &[u64]) {
        let failure = Failure::new(description.clone(), throwable.augment(seeds));
        if failure.throwable().is_assumption() {
            self.notifier.fire_test_assumption_failed(&failure);
        } else {
            self.notifier.fire_test_failure(&failure);
        }
    }

    fn report_suite(&self, throwable: Throwable) {
        self.report(&self.description, throwable, &[self.runner_seed]);
    }

    fn invoke_hook(hook: &MethodDecl, instance: Option<&(dyn std::any::Any + Send + Sync)>) -> TestResult {
        let _frame = supervised::trace_scope(hook.declaring_class(), hook.name());
        guarded(|| hook.invoke(instance))
    }

    fn subscribe_listeners(&self) -> Result<Vec<Arc<dyn RunListener>>, Throwable> {
        let mut subscribed = Vec::new();
        for level in self.suite.levels().iter().rev() {
            for factory in &level.annotations().listeners {
                let listener = match catch_unwind(AssertUnwindSafe(|| factory())) {
                    Ok(result) => result,
                    Err(payload) => Err(Throwable::from_panic(payload)),
                };
                match listener {
                    Ok(listener) => {
                        self.notifier.add_listener(Arc::clone(&listener));
                        subscribed.push(listener);
                    }
                    Err(t) => {
                        for l in &subscribed {
                            self.notifier.remove_listener(l);
                        }
                        return Err(t);
                    }
                }
            }
        }
        Ok(subscribed)
    }

    fn run_validators(&self) -> TestResult {
        for level in self.suite.levels().iter().rev() {
            for validator in &level.annotations().validators {
                tracing::trace!(validator = validator.name(), "validating suite");
                guarded(|| validator.validate(&self.suite))?;
            }
        }
        Ok(())
    }

    fn run_suite(self: Arc<Self>) {
        let suite_context = Arc::new(SuiteContext::new(
            self.suite.name(),
            self.runner_seed,
            self.groups.clone(),
        ));
        let _context = context::enter(Arc::clone(&suite_context), Randomness::new(self.runner_seed));
        let _frame = supervised::trace_scope(self.suite.name(), "runSuite");
        let span = tracing::info_span!("suite", name = self.suite.name(), seed = %format_seed(self.runner_seed));
        let _span = span.enter();

        let listeners = match self.subscribe_listeners() {
            Ok(listeners) => listeners,
            Err(t) => {
                self.notifier.fire_test_run_started(&self.description);
                self.report_suite(t);
                self.notifier.fire_test_run_finished(&self.accounting.result());
                return;
            }
        };

        self.notifier.fire_test_run_started(&self.description);
        let before = self.terminator.group().snapshot();

        if let Err(t) = self.run_validators() {
            self.report_suite(t);
        } else if self.candidates.is_empty() {
            tracing::debug!("no candidates to run, skipping suite hooks");
        } else {
            self.run_suite_body(&suite_context);
        }
        self.finish_suite(&suite_context, &before);

        self.notifier.fire_test_run_finished(&self.accounting.result());
        for listener in &listeners {
            self.notifier.remove_listener(listener);
        }
    }

    fn run_suite_body(self: &Arc<Self>, suite_context: &Arc<SuiteContext>) {
        let failed = self
            .hooks
            .before_all
            .iter()
            .find_map(|hook| Self::invoke_hook(hook, None).err());

        match failed {
            None => {
                for candidate in &self.candidates {
                    self.run_candidate(suite_context, candidate);
                }
            }
            Some(t) if t.is_assumption() => {
                self.report_suite(t);
                for candidate in &self.candidates {
                    self.notifier.fire_test_ignored(candidate.description());
                }
            }
            Some(t) => self.report_suite(t),
        }

        for hook in &self.hooks.after_all {
            if let Err(t) = Self::invoke_hook(hook, None) {
                self.report_suite(t);
            }
        }
    }

    fn finish_suite(&self, suite_context: &SuiteContext, before: &supervised::ThreadSnapshot) {
        for t in suite_context.resources().close(LifecycleScope::Suite) {
            self.report_suite(t);
        }
        let policy = self
            .suite
            .find_class_annotation(|a| a.thread_leaks)
            .unwrap_or_default();
        if let Some(t) = self
            .terminator
            .check_leftover(LifecycleScope::Suite, policy, before, &self.description)
        {
            self.report_suite(t);
        }
        self.process_uncaught(&self.description, &[self.runner_seed]);
    }

    fn ignore_reason(&self, candidate: &TestCandidate) -> RunnerResult<Option<String>> {
        if candidate.is_ignored() {
            return Ok(Some("ignored by declaration".to_string()));
        }
        Ok(self
            .groups
            .first_disabled(candidate.groups())?
            .map(|group| self.groups.ignore_reason(group)))
    }

    fn run_candidate(self: &Arc<Self>, suite_context: &Arc<SuiteContext>, candidate: &Arc<TestCandidate>) {
        let description = candidate.description();
        match self.ignore_reason(candidate) {
            Ok(None) => {}
            Ok(Some(reason)) => {
                tracing::info!(test = %description, %reason, "skipping");
                self.notifier.fire_test_ignored(description);
                self.notifier.fire_test_finished(description);
                return;
            }
            Err(e) => {
                self.report_suite(Throwable::from_error(e));
                return;
            }
        }

        let seeds = [self.runner_seed, candidate.seed()];
        let _randomness = match context::push(Randomness::new(candidate.seed())) {
            Ok(guard) => guard,
            Err(e) => {
                self.report_suite(Throwable::from_error(e));
                return;
            }
        };

        self.notifier.fire_test_started(description);
        let before = self.terminator.group().snapshot();

        if candidate.timeout_ms() == 0 {
            self.execute_candidate(candidate, &mut |t: Throwable| self.report(description, t, &seeds));
        } else {
            self.execute_with_timeout(candidate, &seeds);
        }

        for t in suite_context.resources().close(LifecycleScope::Test) {
            self.report(description, t, &seeds);
        }
        if let Some(t) = self.terminator.check_leftover(
            LifecycleScope::Test,
            candidate.thread_leaks(),
            &before,
            description,
        ) {
            self.report(description, t, &seeds);
        }
        self.process_uncaught(description, &seeds);
        self.notifier.fire_test_finished(description);
    }

    /// Run the candidate on its own thread, terminating it on timeout.
    fn execute_with_timeout(self: &Arc<Self>, candidate: &Arc<TestCandidate>, seeds: &[u64]) {
        let description = candidate.description();
        let timeout = candidate.timeout_ms();
        let collected: Arc<Mutex<Vec<Throwable>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&collected);
        let execution = Arc::clone(self);
        let child_candidate = Arc::clone(candidate);
        let name = format!(
            "TEST-{}.{}-seed#{}",
            self.suite.name(),
            candidate.method().name(),
            format_seed_chain(seeds)
        );
        let spawned = self.terminator.group().spawn(name, move || {
            execution.execute_candidate(&child_candidate, &mut |t: Throwable| sink.lock().push(t));
        });

        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                self.report(description, Throwable::from_error(e), seeds);
                return;
            }
        };

        if child.join(Some(Duration::from_millis(timeout))) {
            for t in collected.lock().drain(..) {
                self.report(description, t, seeds);
            }
            return;
        }

        let ThreadLeaks { stack_samples, .. } = candidate.thread_leaks();
        let samples = StackSamples::collect(&child, stack_samples, &mut Randomness::new(candidate.seed()));
        samples.log(&child, seeds);
        let stack: Vec<_> = child.frames().into_iter().rev().collect();

        let reported_in_time: Vec<Throwable> = collected.lock().drain(..).collect();
        let outcome = self.terminator.terminate(&child);
        for t in reported_in_time {
            self.report(description, t, seeds);
        }
        self.report(
            description,
            Throwable::threading(format!(
                "Test timeout exceeded (>= {timeout} msec){}.",
                outcome.suffix()
            ))
            .with_stack(stack),
            seeds,
        );
        for t in collected.lock().drain(..) {
            if t.is_thread_death() || t.is_interrupted() {
                continue;
            }
            self.report(description, t.with_message_prefix(AFTER_TERMINATION_PREFIX), seeds);
        }
    }

    /// Instantiate, then run before-hooks, the test statement and
    /// after-hooks. Every failure goes to `sink`.
    fn execute_candidate(&self, candidate: &TestCandidate, sink: &mut dyn FnMut(Throwable)) {
        let instance = match candidate.instance(&self.suite) {
            Ok(instance) => instance,
            Err(t) => {
                sink(t);
                return;
            }
        };
        let target: &(dyn std::any::Any + Send + Sync) = instance.as_ref();

        let before_failure = self
            .hooks
            .before_each
            .iter()
            .find_map(|hook| Self::invoke_hook(hook, Some(target)).err());
        match before_failure {
            Some(t) => sink(t),
            None => {
                if let Err(t) = self.invoke_test(candidate.method(), target) {
                    sink(t);
                }
            }
        }

        for hook in &self.hooks.after_each {
            if let Err(t) = Self::invoke_hook(hook, Some(target)) {
                sink(t);
            }
        }
    }

    fn invoke_test(&self, method: &MethodDecl, instance: &(dyn std::any::Any + Send + Sync)) -> TestResult {
        let _frame = supervised::trace_scope(method.declaring_class(), method.name());

        let rules: Vec<Arc<dyn MethodRule>> = self
            .suite
            .levels()
            .iter()
            .flat_map(|level| level.annotations().rules.iter())
            .filter_map(|field| field(instance))
            .collect();

        let base: Statement<'_> = Box::new(move || guarded(|| method.invoke(Some(instance))));
        let mut statement = match &method.annotations().expected {
            Some(expected) => expect_error(base, expected),
            None => base,
        };
        for rule in &rules {
            statement = rule.apply(statement, method, instance);
        }
        guarded(statement)
    }

    /// Report panics that escaped supervised threads.
    fn process_uncaught(&self, description: &Description, seeds: &[u64]) {
        for uncaught in self.terminator.group().drain_uncaught() {
            let throwable = uncaught.throwable;
            if uncaught.after_termination && (throwable.is_thread_death() || throwable.is_interrupted()) {
                tracing::debug!(thread = %uncaught.thread_name, "thread ended after termination");
                continue;
            }
            let throwable = if uncaught.after_termination {
                throwable.with_message_prefix(AFTER_TERMINATION_PREFIX)
            } else {
                throwable
            };
            let wrapped = Throwable::error(
                "UncaughtExceptionError",
                format!("Captured an uncaught exception in thread: {}", uncaught.thread_name),
            )
            .with_cause(throwable);
            self.report(description, wrapped, seeds);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::filter::FnFilter;
    use crate::randomness::SeedChain;
    use crate::suite::{ClassDef, SuiteBuilder};

    #[derive(Default)]
    struct T;

    fn suite() -> SuiteClass {
        SuiteBuilder::new(
            ClassDef::<T>::new("S")
                .test("testA", |_| Ok(()))
                .test("testB", |_| Ok(()))
                .test("testC", |_| Ok(())),
        )
        .default_constructor()
        .build()
    }

    fn config_with_seed(seed: &str) -> RunnerConfig {
        RunnerConfig::builder()
            .seed(SeedChain::parse(seed).unwrap())
            .build()
            .unwrap()
    }

    mod construction_tests {
        use super::*;

        #[test]
        fn test_runner_seed_from_config() {
            let runner = RandomizedRunner::new(suite(), config_with_seed("DEADBEEF")).unwrap();
            assert_eq!(runner.runner_seed(), 0xDEAD_BEEF);
            assert_eq!(runner.candidates().len(), 3);
            assert_eq!(runner.description().tests().len(), 3);
        }

        #[test]
        fn test_order_is_reproducible() {
            let names = |seed: &str| -> Vec<String> {
                RandomizedRunner::new(suite(), config_with_seed(seed))
                    .unwrap()
                    .candidates()
                    .iter()
                    .map(|c| c.method().name().to_string())
                    .collect()
            };
            assert_eq!(names("1234"), names("1234"));
        }

        #[test]
        fn test_class_filter_excludes_everything() {
            let config = RunnerConfig::builder().test_class("Other").build().unwrap();
            let runner = RandomizedRunner::new(suite(), config).unwrap();
            assert!(runner.candidates().is_empty());
            assert!(runner.description().children().is_empty());
        }

        #[test]
        fn test_method_filters() {
            let exact = RunnerConfig::builder().test_method("testB").build().unwrap();
            let runner = RandomizedRunner::new(suite(), exact).unwrap();
            assert_eq!(runner.candidates().len(), 1);

            let glob = RunnerConfig::builder().method_glob("test[AC]").build().unwrap();
            let runner = RandomizedRunner::new(suite(), glob).unwrap();
            assert_eq!(runner.candidates().len(), 2);
        }

        #[test]
        fn test_invalid_suite_is_rejected() {
            let hidden = SuiteBuilder::new(ClassDef::<T>::new("S")).non_public().build();
            assert!(RandomizedRunner::new(hidden, RunnerConfig::default()).is_err());
        }
    }

    mod filter_tests {
        use super::*;

        #[test]
        fn test_filter_narrows_and_rebuilds_description() {
            let mut runner = RandomizedRunner::new(suite(), RunnerConfig::default()).unwrap();
            let only_a = FnFilter::new("only testA", |d: &Description| d.bare_method_name() == Some("testA"));
            runner.filter(&only_a).unwrap();
            assert_eq!(runner.candidates().len(), 1);
            assert_eq!(runner.description().tests().len(), 1);
        }

        #[test]
        fn test_filter_rejecting_everything_fails() {
            let mut runner = RandomizedRunner::new(suite(), RunnerConfig::default()).unwrap();
            let none = FnFilter::new("nothing", |_: &Description| false);
            let err = runner.filter(&none).unwrap_err();
            assert!(err.to_string().contains("nothing"));
        }
    }

    mod run_tests {
        use super::*;

        #[test]
        fn test_run_counts_candidates() {
            let result = run_suite(suite(), RunnerConfig::default()).unwrap();
            assert_eq!(result.run_count, 3);
            assert!(result.was_successful());
        }

        #[derive(Default)]
        struct Events(Mutex<Vec<String>>);

        impl RunListener for Events {
            fn test_failure(&self, f: &Failure) {
                self.0.lock().push(format!("failure:{}", f.description().display_name()));
            }
            fn test_ignored(&self, d: &Description) {
                self.0.lock().push(format!("ignored:{}", d.display_name()));
            }
        }

        #[test]
        fn test_group_error_at_run_time_is_a_suite_failure() {
            use crate::annotations::TestGroup;
            use crate::suite::MethodDef;

            let grouped = SuiteBuilder::new(
                ClassDef::<T>::new("G").method(MethodDef::test("testSlow", |_| Ok(())).group(TestGroup::new("slow"))),
            )
            .default_constructor()
            .build();
            let mut runner = RandomizedRunner::new(grouped, RunnerConfig::default()).unwrap();
            let broken = RunnerConfig::builder().property("tests.slow", "perhaps").build().unwrap();
            runner.groups = GroupEvaluator::new(&broken);

            let notifier = Arc::new(RunNotifier::new());
            let events = Arc::new(Events::default());
            notifier.add_listener(events.clone());
            let result = runner.run(&notifier);

            assert_eq!(result.failure_count(), 1);
            assert_eq!(result.ignore_count, 0);
            assert_eq!(*events.0.lock(), ["failure:G"]);
        }

        #[test]
        fn test_failures_carry_seed_chain() {
            let failing = SuiteBuilder::new(
                ClassDef::<T>::new("S").test("testFail", |_| Err(Throwable::failure("boom"))),
            )
            .default_constructor()
            .build();
            let result = run_suite(failing, config_with_seed("ABC")).unwrap();
            assert_eq!(result.failure_count(), 1);
            let seed = result.failures[0].seed().unwrap();
            assert!(seed.starts_with("[ABC:"), "{seed}");
        }
    }
}
