//! Expansion of test methods into schedulable candidates.
//!
//! Every test method yields `parameter sets x seeds x iterations`
//! candidates. Methods are shuffled with the runner seed first, so the
//! execution order is reproducible from the seed while the per-method seeds
//! stay independent of declaration order.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::annotations::{parse_method_seed, Repeat, SeedSpec, TestGroup, ThreadLeaks};
use crate::collector::{flatten, resolve, MethodLevels};
use crate::description::{Description, TestName};
use crate::randomness::{iteration_seed, method_seed, SeedChain};
use crate::result::{RunnerError, RunnerResult};
use crate::runner::config::RunnerConfig;
use crate::suite::{Instance, MethodDecl, MethodRole, ParamSet, SuiteClass};
use crate::throwable::Throwable;

/// Seeds in effect for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedPlan {
    /// Seed of the runner, root of every chain
    pub runner_seed: u64,
    /// Method seed forced by the global override
    pub forced_method_seed: Option<u64>,
    /// Method seed from the class seed annotation
    pub class_method_seed: Option<u64>,
}

impl SeedPlan {
    /// Resolve the runner seed: global override, then class annotation,
    /// then a fresh random value.
    pub fn resolve(suite: &SuiteClass, config: &RunnerConfig) -> RunnerResult<Self> {
        let class_chain = match suite.find_class_annotation(|a| a.seed.clone()) {
            Some(text) => match SeedSpec::parse(&text)? {
                SeedSpec::Random => None,
                SeedSpec::Fixed(_) => Some(SeedChain::parse(&text)?),
            },
            None => None,
        };

        let runner_seed = config
            .seed
            .map(|c| c.runner)
            .or(class_chain.map(|c| c.runner))
            .unwrap_or_else(|| rand::thread_rng().gen());

        Ok(Self {
            runner_seed,
            forced_method_seed: config.seed.and_then(|c| c.method),
            class_method_seed: class_chain.and_then(|c| c.method),
        })
    }

    /// Plan with a fixed runner seed and no overrides
    #[must_use]
    pub const fn fixed(runner_seed: u64) -> Self {
        Self {
            runner_seed,
            forced_method_seed: None,
            class_method_seed: None,
        }
    }
}

/// One schedulable execution of a test method
pub struct TestCandidate {
    method: Arc<MethodDecl>,
    seed: u64,
    iteration: Option<u32>,
    description: Description,
    params: Arc<ParamSet>,
    timeout_ms: u64,
    thread_leaks: ThreadLeaks,
    groups: Vec<TestGroup>,
    instance: OnceLock<Result<Instance, Throwable>>,
}

impl fmt::Debug for TestCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCandidate")
            .field("description", &self.description.display_name())
            .field("seed", &format_args!("{:X}", self.seed))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl TestCandidate {
    /// Test method
    #[must_use]
    pub fn method(&self) -> &Arc<MethodDecl> {
        &self.method
    }

    /// Iteration seed
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Iteration index, when the method is repeated
    #[must_use]
    pub const fn iteration(&self) -> Option<u32> {
        self.iteration
    }

    /// Leaf description
    #[must_use]
    pub fn description(&self) -> &Description {
        &self.description
    }

    /// Constructor arguments
    #[must_use]
    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    /// Effective timeout; 0 runs the test on the runner thread
    #[must_use]
    pub const fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Effective thread-leak policy
    #[must_use]
    pub const fn thread_leaks(&self) -> ThreadLeaks {
        self.thread_leaks
    }

    /// Groups of the method and of every class level
    #[must_use]
    pub fn groups(&self) -> &[TestGroup] {
        &self.groups
    }

    /// Whether the method is marked as ignored
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        self.method.annotations().ignored
    }

    /// Test instance, created on first access.
    ///
    /// A construction error is kept and returned on every access.
    pub fn instance(&self, suite: &SuiteClass) -> Result<Instance, Throwable> {
        self.instance
            .get_or_init(|| suite.instantiate(&self.params))
            .clone()
    }
}

/// Candidates of a suite together with their description tree
#[derive(Debug)]
pub struct CandidateSet {
    /// Candidates in execution order
    pub candidates: Vec<Arc<TestCandidate>>,
    /// Root description
    pub description: Description,
}

fn iterations_of(method: &MethodDecl, suite: &SuiteClass, config: &RunnerConfig) -> (u32, bool) {
    let repeat: Option<Repeat> = method
        .annotations()
        .repeat
        .or_else(|| suite.find_class_annotation(|a| a.repeat));
    let fixed = repeat.is_some_and(|r| r.use_constant_seed);
    let iterations = config
        .iterations
        .or(repeat.map(|r| r.iterations))
        .unwrap_or(1)
        .max(1);
    (iterations, fixed)
}

fn timeout_of(method: &MethodDecl, suite: &SuiteClass, config: &RunnerConfig) -> u64 {
    let annotations = method.annotations();
    annotations
        .timeout_ms
        .or_else(|| suite.find_class_annotation(|a| a.timeout_ms))
        .or(annotations.test_timeout_ms)
        .unwrap_or(config.timeout_ms)
}

fn method_seeds(method: &MethodDecl, plan: &SeedPlan) -> RunnerResult<Vec<u64>> {
    let derived = method_seed(plan.runner_seed, method.name());
    if let Some(forced) = plan.forced_method_seed {
        return Ok(vec![forced]);
    }
    let annotations = method.annotations();
    let declared: Vec<&String> = annotations.seed.iter().chain(&annotations.seeds).collect();
    if declared.is_empty() {
        return Ok(vec![plan.class_method_seed.unwrap_or(derived)]);
    }

    let mut seen = HashSet::new();
    let mut seeds = Vec::new();
    for text in declared {
        let seed = match parse_method_seed(text)? {
            SeedSpec::Random => derived,
            SeedSpec::Fixed(chain) => chain.first().copied().unwrap_or(derived),
        };
        if seen.insert(seed) {
            seeds.push(seed);
        }
    }
    Ok(seeds)
}

fn param_label(suite: &SuiteClass, params: &ParamSet) -> String {
    params
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let name = suite
                .constructor()
                .and_then(|c| c.param_name(i))
                .map_or_else(|| format!("p{i}"), str::to_string);
            format!("{name}={}", value.label())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parameter sets from every factory, concatenated in level order.
///
/// Without a factory the suite runs once with an empty set.
pub fn parameter_sets(levels: &MethodLevels) -> RunnerResult<Vec<ParamSet>> {
    let factories = flatten(&resolve(levels, MethodRole::ParametersFactory));
    if factories.is_empty() {
        return Ok(vec![ParamSet::new()]);
    }
    let mut sets = Vec::new();
    for factory in factories {
        let produced = factory.invoke_factory().map_err(|t| {
            RunnerError::validation(format!(
                "Parameters factory {}#{} failed: {t}",
                factory.declaring_class(),
                factory.name()
            ))
        })?;
        if produced.is_empty() {
            return Err(RunnerError::validation(format!(
                "Parameters factory {}#{} returned no parameter sets",
                factory.declaring_class(),
                factory.name()
            )));
        }
        sets.extend(produced);
    }
    Ok(sets)
}

fn labels_for(suite: &SuiteClass, sets: &[ParamSet], parameterized: bool) -> Vec<Option<String>> {
    if !parameterized {
        return vec![None; sets.len()];
    }
    let labels: Vec<String> = sets.iter().map(|s| param_label(suite, s)).collect();
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for label in &labels {
        *counts.entry(label.as_str()).or_default() += 1;
    }
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            if counts.get(label.as_str()).copied().unwrap_or(0) > 1 {
                Some(format!("#{i} {label}"))
            } else {
                Some(label.clone())
            }
        })
        .collect()
}

/// Build every candidate of the suite.
pub fn build_candidates(
    suite: &SuiteClass,
    levels: &MethodLevels,
    plan: &SeedPlan,
    config: &RunnerConfig,
) -> RunnerResult<CandidateSet> {
    let mut tests = flatten(&resolve(levels, MethodRole::Test));
    tests.sort_by(|a, b| a.name().cmp(b.name()));
    tests.shuffle(&mut ChaCha8Rng::seed_from_u64(plan.runner_seed));

    let parameterized = !flatten(&resolve(levels, MethodRole::ParametersFactory)).is_empty();
    let sets: Vec<Arc<ParamSet>> = parameter_sets(levels)?.into_iter().map(Arc::new).collect();
    let plain_sets: Vec<ParamSet> = sets.iter().map(|s| (**s).clone()).collect();
    let labels = labels_for(suite, &plain_sets, parameterized);

    let class_groups: Vec<TestGroup> = suite
        .levels()
        .iter()
        .rev()
        .flat_map(|l| l.annotations().groups.iter().cloned())
        .collect();
    let class_leaks = suite.find_class_annotation(|a| a.thread_leaks);

    struct MethodPlan<'a> {
        method: &'a Arc<MethodDecl>,
        iterations: u32,
        fixed: bool,
        seeds: Vec<u64>,
        timeout_ms: u64,
        thread_leaks: ThreadLeaks,
        groups: Vec<TestGroup>,
    }

    let mut plans = Vec::with_capacity(tests.len());
    for method in &tests {
        let (iterations, fixed) = iterations_of(method, suite, config);
        let mut groups = class_groups.clone();
        groups.extend(method.annotations().groups.iter().cloned());
        plans.push(MethodPlan {
            method,
            iterations,
            fixed: fixed || plan.forced_method_seed.is_some(),
            seeds: method_seeds(method, plan)?,
            timeout_ms: timeout_of(method, suite, config),
            thread_leaks: method
                .annotations()
                .thread_leaks
                .or(class_leaks)
                .unwrap_or_default(),
            groups,
        });
    }

    // Parameter sets outermost, then methods in shuffled order.
    let mut candidates = Vec::new();
    for (set, label) in sets.iter().zip(&labels) {
        for m in &plans {
            for &base in &m.seeds {
                for i in 0..m.iterations {
                    let seed = iteration_seed(base, i, m.fixed);
                    let iteration = (m.iterations > 1).then_some(i);
                    let name = TestName {
                        method: m.method.name().to_string(),
                        iteration,
                        params: label.clone(),
                        seed_chain: vec![plan.runner_seed, seed],
                        class_name: None,
                    };
                    candidates.push(Arc::new(TestCandidate {
                        method: Arc::clone(m.method),
                        seed,
                        iteration,
                        description: Description::test(suite.name(), name.format()),
                        params: Arc::clone(set),
                        timeout_ms: m.timeout_ms,
                        thread_leaks: m.thread_leaks,
                        groups: m.groups.clone(),
                        instance: OnceLock::new(),
                    }));
                }
            }
        }
    }

    let description = describe(suite.name(), &candidates);
    Ok(CandidateSet {
        candidates,
        description,
    })
}

/// Description tree over `candidates`: a method node groups its candidates
/// when it has more than one.
#[must_use]
pub fn describe(suite_name: &str, candidates: &[Arc<TestCandidate>]) -> Description {
    let mut per_method: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for c in candidates {
        *per_method
            .entry((c.method.declaring_class(), c.method.name()))
            .or_default() += 1;
    }

    let mut root = Description::suite(suite_name);
    let mut open: Option<(Arc<MethodDecl>, Description)> = None;
    for c in candidates {
        let key = (c.method.declaring_class(), c.method.name());
        if per_method.get(&key).copied().unwrap_or(0) <= 1 {
            if let Some((_, node)) = open.take() {
                root.add_child(node);
            }
            root.add_child(c.description.clone());
            continue;
        }
        let same = open
            .as_ref()
            .is_some_and(|(m, _)| Arc::ptr_eq(m, &c.method));
        if !same {
            if let Some((_, node)) = open.take() {
                root.add_child(node);
            }
            open = Some((Arc::clone(&c.method), Description::group(c.method.name())));
        }
        if let Some((_, node)) = open.as_mut() {
            node.add_child(c.description.clone());
        }
    }
    if let Some((_, node)) = open.take() {
        root.add_child(node);
    }
    root
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::collector::all_declared_methods;
    use crate::suite::{ClassDef, MethodDef, SuiteBuilder};

    #[derive(Default)]
    struct T;

    fn build(builder: SuiteBuilder<T>, plan: SeedPlan, config: &RunnerConfig) -> CandidateSet {
        let suite = builder.build();
        build_candidates(&suite, &all_declared_methods(&suite), &plan, config).unwrap()
    }

    fn names(set: &CandidateSet) -> Vec<String> {
        set.candidates
            .iter()
            .map(|c| c.description().display_name().to_string())
            .collect()
    }

    mod seed_tests {
        use super::*;

        #[test]
        fn test_derived_seed_independent_of_declaration_order() {
            let config = RunnerConfig::default();
            let ab = build(
                SuiteBuilder::new(ClassDef::<T>::new("S").test("testA", |_| Ok(())).test("testB", |_| Ok(()))),
                SeedPlan::fixed(0xDEAD),
                &config,
            );
            let ba = build(
                SuiteBuilder::new(ClassDef::<T>::new("S").test("testB", |_| Ok(())).test("testA", |_| Ok(()))),
                SeedPlan::fixed(0xDEAD),
                &config,
            );
            let seed_of = |set: &CandidateSet, name: &str| {
                set.candidates
                    .iter()
                    .find(|c| c.method().name() == name)
                    .unwrap()
                    .seed()
            };
            assert_eq!(seed_of(&ab, "testA"), seed_of(&ba, "testA"));
            assert_eq!(seed_of(&ab, "testB"), seed_of(&ba, "testB"));
            assert_eq!(names(&ab), names(&ba));
        }

        #[test]
        fn test_explicit_seeds_multiply_and_dedupe() {
            let set = build(
                SuiteBuilder::new(
                    ClassDef::<T>::new("S").method(MethodDef::test("testA", |_| Ok(())).seeds(["1", "2", "1", "random"])),
                ),
                SeedPlan::fixed(0xAB),
                &RunnerConfig::default(),
            );
            let seeds: Vec<u64> = set.candidates.iter().map(|c| c.seed()).collect();
            assert_eq!(seeds.len(), 3);
            assert_eq!(&seeds[..2], &[1, 2]);
            assert_eq!(seeds[2], method_seed(0xAB, "testA"));
        }

        #[test]
        fn test_forced_method_seed_wins() {
            let plan = SeedPlan {
                runner_seed: 1,
                forced_method_seed: Some(0x77),
                class_method_seed: Some(0x55),
            };
            let set = build(
                SuiteBuilder::new(
                    ClassDef::<T>::new("S").method(MethodDef::test("testA", |_| Ok(())).seed("99").repeat(Repeat::new(3))),
                ),
                plan,
                &RunnerConfig::default(),
            );
            assert_eq!(set.candidates.len(), 3);
            assert!(set.candidates.iter().all(|c| c.seed() == 0x77));
        }

        #[test]
        fn test_resolve_prefers_global_then_class() {
            let suite = SuiteBuilder::new(ClassDef::<T>::new("S").seed("AB:CD")).build();
            let plan = SeedPlan::resolve(&suite, &RunnerConfig::default()).unwrap();
            assert_eq!(plan.runner_seed, 0xAB);
            assert_eq!(plan.class_method_seed, Some(0xCD));

            let config = RunnerConfig::builder().seed(SeedChain::runner(0x12)).build().unwrap();
            let plan = SeedPlan::resolve(&suite, &config).unwrap();
            assert_eq!(plan.runner_seed, 0x12);
            assert_eq!(plan.forced_method_seed, None);
        }
    }

    mod iteration_tests {
        use super::*;

        #[test]
        fn test_repeat_with_constant_seed() {
            let set = build(
                SuiteBuilder::new(
                    ClassDef::<T>::new("S")
                        .test("testOnce", |_| Ok(()))
                        .method(MethodDef::test("testRepeat", |_| Ok(())).repeat(Repeat::new(4).constant_seed())),
                ),
                SeedPlan::fixed(3),
                &RunnerConfig::default(),
            );
            assert_eq!(set.candidates.len(), 5);
            let repeats: Vec<_> = set
                .candidates
                .iter()
                .filter(|c| c.method().name() == "testRepeat")
                .collect();
            assert!(repeats.iter().all(|c| c.seed() == repeats[0].seed()));
            assert!(repeats[1].description().display_name().starts_with("testRepeat#1 "));
        }

        #[test]
        fn test_varying_seeds_are_distinct() {
            let set = build(
                SuiteBuilder::new(ClassDef::<T>::new("S").method(MethodDef::test("testR", |_| Ok(())).repeat(Repeat::new(50)))),
                SeedPlan::fixed(3),
                &RunnerConfig::default(),
            );
            let seeds: HashSet<u64> = set.candidates.iter().map(|c| c.seed()).collect();
            assert_eq!(seeds.len(), 50);
        }

        #[test]
        fn test_global_iterations_override() {
            let config = RunnerConfig::builder().iterations(2).build().unwrap();
            let set = build(
                SuiteBuilder::new(ClassDef::<T>::new("S").method(MethodDef::test("testR", |_| Ok(())).repeat(Repeat::new(7)))),
                SeedPlan::fixed(3),
                &config,
            );
            assert_eq!(set.candidates.len(), 2);
        }
    }

    mod description_tests {
        use super::*;

        #[test]
        fn test_single_candidate_is_direct_child() {
            let set = build(
                SuiteBuilder::new(ClassDef::<T>::new("S").test("testA", |_| Ok(()))),
                SeedPlan::fixed(0xA),
                &RunnerConfig::default(),
            );
            assert_eq!(set.description.children().len(), 1);
            assert!(set.description.children()[0].is_test());
            let name = set.description.children()[0].display_name();
            assert!(name.starts_with("testA [A:"));
            assert!(name.ends_with("](S)"));
        }

        #[test]
        fn test_repeated_method_gets_group_node() {
            let set = build(
                SuiteBuilder::new(ClassDef::<T>::new("S").method(MethodDef::test("testA", |_| Ok(())).repeat(Repeat::new(3)))),
                SeedPlan::fixed(0xA),
                &RunnerConfig::default(),
            );
            assert_eq!(set.description.children().len(), 1);
            let group = &set.description.children()[0];
            assert_eq!(group.display_name(), "testA");
            assert_eq!(group.children().len(), 3);
            assert_eq!(set.description.test_count(), 3);
        }

        #[test]
        fn test_descriptions_unique() {
            let set = build(
                SuiteBuilder::new(
                    ClassDef::<T>::new("S")
                        .method(MethodDef::test("testA", |_| Ok(())).repeat(Repeat::new(3).constant_seed()))
                        .parameters("params", || Ok(vec![ParamSet::new().with(1), ParamSet::new().with(1)])),
                )
                .constructor(1, |_| Ok(T)),
                SeedPlan::fixed(0xA),
                &RunnerConfig::default(),
            );
            let all = names(&set);
            let unique: HashSet<&String> = all.iter().collect();
            assert_eq!(all.len(), 6);
            assert_eq!(unique.len(), 6);
            assert!(all[0].contains("{#0 p0=1}"));
        }
    }

    mod parameter_tests {
        use super::*;

        #[test]
        fn test_named_parameters_in_label() {
            let set = build(
                SuiteBuilder::new(
                    ClassDef::<T>::new("S")
                        .test("testA", |_| Ok(()))
                        .parameters("params", || Ok(vec![ParamSet::new().with(3).with("x")])),
                )
                .constructor(2, |_| Ok(T))
                .param_names([Some("value"), None]),
                SeedPlan::fixed(1),
                &RunnerConfig::default(),
            );
            assert!(names(&set)[0].contains("{value=3 p1=x}"));
        }

        #[test]
        fn test_empty_factory_is_validation_error() {
            let suite = SuiteBuilder::new(
                ClassDef::<T>::new("S")
                    .test("testA", |_| Ok(()))
                    .parameters("params", || Ok(Vec::new())),
            )
            .constructor(1, |_| Ok(T))
            .build();
            let err = build_candidates(&suite, &all_declared_methods(&suite), &SeedPlan::fixed(1), &RunnerConfig::default())
                .unwrap_err();
            assert!(err.to_string().contains("no parameter sets"));
        }

        #[test]
        fn test_factories_concatenate() {
            let set = build(
                SuiteBuilder::new(
                    ClassDef::<T>::new("S")
                        .test("testA", |_| Ok(()))
                        .parameters("first", || Ok(vec![ParamSet::new().with(1)]))
                        .parameters("second", || Ok(vec![ParamSet::new().with(2)])),
                )
                .constructor(1, |_| Ok(T)),
                SeedPlan::fixed(1),
                &RunnerConfig::default(),
            );
            assert_eq!(set.candidates.len(), 2);
        }

        #[test]
        fn test_parameter_sets_are_outermost() {
            let set = build(
                SuiteBuilder::new(
                    ClassDef::<T>::new("S")
                        .test("testA", |_| Ok(()))
                        .test("testB", |_| Ok(()))
                        .parameters("params", || Ok(vec![ParamSet::new().with(1), ParamSet::new().with(2)])),
                )
                .constructor(1, |_| Ok(T)),
                SeedPlan::fixed(1234),
                &RunnerConfig::default(),
            );
            let order: Vec<(String, String)> = set
                .candidates
                .iter()
                .map(|c| (c.method().name().to_string(), c.params().value(0).unwrap().label().to_string()))
                .collect();
            assert_eq!(order.len(), 4);
            let first = order[0].0.clone();
            let second = order[1].0.clone();
            assert_ne!(first, second);
            assert_eq!(order[0], (first.clone(), "1".to_string()));
            assert_eq!(order[1], (second.clone(), "1".to_string()));
            assert_eq!(order[2], (first, "2".to_string()));
            assert_eq!(order[3], (second, "2".to_string()));
        }

        #[test]
        fn test_instance_is_lazy_and_cached() {
            let suite = SuiteBuilder::new(ClassDef::<T>::new("S").test("testA", |_| Ok(())))
                .constructor(0, |_| Err(Throwable::failure("ctor failed")))
                .build();
            let set = build_candidates(&suite, &all_declared_methods(&suite), &SeedPlan::fixed(1), &RunnerConfig::default())
                .unwrap();
            let c = &set.candidates[0];
            assert_eq!(c.instance(&suite).unwrap_err().message(), "ctor failed");
            assert_eq!(c.instance(&suite).unwrap_err().message(), "ctor failed");
        }
    }

    mod timeout_tests {
        use super::*;

        fn timeouts(builder: SuiteBuilder<T>, config: &RunnerConfig) -> BTreeMap<String, u64> {
            build(builder.default_constructor(), SeedPlan::fixed(1), config)
                .candidates
                .iter()
                .map(|c| (c.method().name().to_string(), c.timeout_ms()))
                .collect()
        }

        #[test]
        fn test_timeout_precedence() {
            let config = RunnerConfig::builder().timeout_ms(40).build().unwrap();
            let methods = || {
                ClassDef::<T>::new("S")
                    .method(MethodDef::test("testMethod", |_| Ok(())).timeout_ms(10).test_timeout_ms(10))
                    .method(MethodDef::test("testStructured", |_| Ok(())).test_timeout_ms(30))
                    .test("testPlain", |_| Ok(()))
            };

            let with_class = timeouts(SuiteBuilder::new(methods().timeout_ms(20)), &config);
            assert_eq!(with_class["testMethod"], 10);
            assert_eq!(with_class["testStructured"], 20);
            assert_eq!(with_class["testPlain"], 20);

            let without_class = timeouts(SuiteBuilder::new(methods()), &config);
            assert_eq!(without_class["testMethod"], 10);
            assert_eq!(without_class["testStructured"], 30);
            assert_eq!(without_class["testPlain"], 40);
        }

        #[test]
        fn test_no_timeout_by_default() {
            let plain = timeouts(
                SuiteBuilder::new(ClassDef::<T>::new("S").test("testPlain", |_| Ok(()))),
                &RunnerConfig::default(),
            );
            assert_eq!(plain["testPlain"], 0);
        }
    }
}
