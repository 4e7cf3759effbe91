//! Method enumeration across class levels.
//!
//! Methods are grouped per level (leaf first). Overridden instance methods
//! and shadowed static methods of ancestors are dropped so that each
//! signature resolves to the most-derived declaration, the way virtual
//! dispatch would.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::result::{RunnerError, RunnerResult};
use crate::suite::{MethodDecl, MethodRole, SuiteClass, Visibility};

/// Methods per class level, leaf first
pub type MethodLevels = Vec<Vec<Arc<MethodDecl>>>;

/// All declared methods, sorted by name (then parameter count) within each level.
#[must_use]
pub fn all_declared_methods(suite: &SuiteClass) -> MethodLevels {
    suite
        .levels()
        .iter()
        .map(|level| {
            let mut methods: Vec<Arc<MethodDecl>> = level.methods().to_vec();
            methods.sort_by(|a, b| a.signature().cmp(&b.signature()));
            methods
        })
        .collect()
}

/// Fail if one level declares the same signature twice.
pub fn check_ambiguous(suite: &SuiteClass) -> RunnerResult<()> {
    for level in suite.levels() {
        let mut seen = HashSet::new();
        for m in level.methods() {
            if !seen.insert(m.signature()) {
                return Err(RunnerError::validation(format!(
                    "Ambiguous method declaration: {}#{} ({} parameter(s)) is declared more than once",
                    level.name(),
                    m.name(),
                    m.param_count()
                )));
            }
        }
    }
    Ok(())
}

/// Keep methods with the given role.
#[must_use]
pub fn with_role(levels: &MethodLevels, role: MethodRole) -> MethodLevels {
    levels
        .iter()
        .map(|level| level.iter().filter(|m| m.role() == role).cloned().collect())
        .collect()
}

/// Drop instance methods overridden by a more-derived level.
///
/// Private methods never override or get overridden. Package-private
/// methods are only overridden from the same package.
#[must_use]
pub fn remove_overrides(levels: &MethodLevels) -> MethodLevels {
    let mut derived: HashMap<(String, usize), Vec<String>> = HashMap::new();
    let mut out = Vec::with_capacity(levels.len());
    for level in levels {
        let kept: Vec<Arc<MethodDecl>> = level
            .iter()
            .filter(|m| !is_overridden(m, &derived))
            .cloned()
            .collect();
        for m in level {
            if !m.is_static() && m.visibility() != Visibility::Private {
                derived
                    .entry((m.name().to_string(), m.param_count()))
                    .or_default()
                    .push(m.package().to_string());
            }
        }
        out.push(kept);
    }
    out
}

fn is_overridden(m: &MethodDecl, derived: &HashMap<(String, usize), Vec<String>>) -> bool {
    if m.is_static() || m.visibility() == Visibility::Private {
        return false;
    }
    let Some(packages) = derived.get(&(m.name().to_string(), m.param_count())) else {
        return false;
    };
    match m.visibility() {
        Visibility::Package => packages.iter().any(|p| p == m.package()),
        _ => true,
    }
}

/// Drop static methods hidden by a same-signature static method of a
/// more-derived level.
#[must_use]
pub fn remove_shadowed(levels: &MethodLevels) -> MethodLevels {
    let mut hidden: HashSet<(String, usize)> = HashSet::new();
    let mut out = Vec::with_capacity(levels.len());
    for level in levels {
        let kept: Vec<Arc<MethodDecl>> = level
            .iter()
            .filter(|m| {
                !(m.is_static()
                    && m.visibility() != Visibility::Private
                    && hidden.contains(&(m.name().to_string(), m.param_count())))
            })
            .cloned()
            .collect();
        for m in level {
            if m.is_static() && m.visibility() != Visibility::Private {
                hidden.insert((m.name().to_string(), m.param_count()));
            }
        }
        out.push(kept);
    }
    out
}

/// Concatenate levels in order.
#[must_use]
pub fn flatten(levels: &MethodLevels) -> Vec<Arc<MethodDecl>> {
    levels.iter().flatten().cloned().collect()
}

/// Resolved methods of a role: overrides and shadowed statics removed.
#[must_use]
pub fn resolve(levels: &MethodLevels, role: MethodRole) -> MethodLevels {
    with_role(&remove_shadowed(&remove_overrides(levels)), role)
}

/// Hooks of a role in execution order.
///
/// Before-hooks run root level first, after-hooks leaf level first.
/// Within a level the order is shuffled with a generator seeded from
/// `runner_seed`.
#[must_use]
pub fn hooks_in_order(levels: &MethodLevels, role: MethodRole, runner_seed: u64) -> Vec<Arc<MethodDecl>> {
    let mut resolved = resolve(levels, role);
    if matches!(role, MethodRole::BeforeAll | MethodRole::BeforeEach) {
        resolved.reverse();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(runner_seed);
    for level in &mut resolved {
        level.shuffle(&mut rng);
    }
    flatten(&resolved)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::suite::{ClassDef, MethodDef, SuiteBuilder};

    #[derive(Default)]
    struct T;

    fn names(methods: &[Arc<MethodDecl>]) -> Vec<String> {
        methods.iter().map(|m| format!("{}#{}", m.declaring_class(), m.name())).collect()
    }

    mod override_tests {
        use super::*;

        #[test]
        fn test_public_override_removed_from_parent() {
            let suite = SuiteBuilder::new(ClassDef::<T>::new("p.Child").test("testA", |_| Ok(())))
                .extends(ClassDef::new("p.Parent").test("testA", |_| Ok(())).test("testB", |_| Ok(())))
                .build();
            let resolved = flatten(&resolve(&all_declared_methods(&suite), MethodRole::Test));
            assert_eq!(names(&resolved), vec!["p.Child#testA", "p.Parent#testB"]);
        }

        #[test]
        fn test_unannotated_override_hides_test() {
            let suite = SuiteBuilder::new(ClassDef::<T>::new("p.Child").method(MethodDef::plain("testA")))
                .extends(ClassDef::new("p.Parent").test("testA", |_| Ok(())))
                .build();
            assert!(flatten(&resolve(&all_declared_methods(&suite), MethodRole::Test)).is_empty());
        }

        #[test]
        fn test_private_methods_do_not_override() {
            let suite = SuiteBuilder::new(
                ClassDef::<T>::new("p.Child").method(MethodDef::before_each("setUp", |_| Ok(())).visibility(Visibility::Private)),
            )
            .extends(ClassDef::new("p.Parent").before_each("setUp", |_| Ok(())))
            .build();
            let resolved = flatten(&resolve(&all_declared_methods(&suite), MethodRole::BeforeEach));
            assert_eq!(resolved.len(), 2);
        }

        #[test]
        fn test_package_private_needs_same_package() {
            let other_pkg = SuiteBuilder::new(ClassDef::<T>::new("a.Child").method(MethodDef::plain("helper")))
                .extends(ClassDef::new("b.Parent").method(
                    MethodDef::test("helper", |_| Ok(())).visibility(Visibility::Package),
                ))
                .build();
            assert_eq!(flatten(&resolve(&all_declared_methods(&other_pkg), MethodRole::Test)).len(), 1);

            let same_pkg = SuiteBuilder::new(ClassDef::<T>::new("a.Child").method(MethodDef::plain("helper")))
                .extends(ClassDef::new("a.Parent").method(
                    MethodDef::test("helper", |_| Ok(())).visibility(Visibility::Package),
                ))
                .build();
            assert!(flatten(&resolve(&all_declared_methods(&same_pkg), MethodRole::Test)).is_empty());
        }

        #[test]
        fn test_static_shadowing() {
            let suite = SuiteBuilder::new(ClassDef::<T>::new("p.Child").before_all("setUpClass", || Ok(())))
                .extends(ClassDef::new("p.Parent").before_all("setUpClass", || Ok(())))
                .build();
            let resolved = flatten(&resolve(&all_declared_methods(&suite), MethodRole::BeforeAll));
            assert_eq!(names(&resolved), vec!["p.Child#setUpClass"]);
        }
    }

    mod ordering_tests {
        use super::*;

        fn hooked_suite() -> SuiteClass {
            SuiteBuilder::new(
                ClassDef::<T>::new("p.Child")
                    .before_each("c1", |_| Ok(()))
                    .before_each("c2", |_| Ok(()))
                    .after_each("ca", |_| Ok(())),
            )
            .extends(
                ClassDef::new("p.Parent")
                    .before_each("p1", |_| Ok(()))
                    .after_each("pa", |_| Ok(())),
            )
            .build()
        }

        #[test]
        fn test_before_hooks_root_first() {
            let levels = all_declared_methods(&hooked_suite());
            let order = hooks_in_order(&levels, MethodRole::BeforeEach, 42);
            assert_eq!(order[0].name(), "p1");
            assert_eq!(order.len(), 3);
        }

        #[test]
        fn test_after_hooks_leaf_first() {
            let levels = all_declared_methods(&hooked_suite());
            let order = hooks_in_order(&levels, MethodRole::AfterEach, 42);
            assert_eq!(names(&order), vec!["p.Child#ca", "p.Parent#pa"]);
        }

        #[test]
        fn test_order_reproducible_per_seed() {
            let levels = all_declared_methods(&hooked_suite());
            let a = names(&hooks_in_order(&levels, MethodRole::BeforeEach, 7));
            let b = names(&hooks_in_order(&levels, MethodRole::BeforeEach, 7));
            assert_eq!(a, b);
        }

        #[test]
        fn test_declared_sorted_by_name() {
            let suite = SuiteBuilder::new(
                ClassDef::<T>::new("S").test("zeta", |_| Ok(())).test("alpha", |_| Ok(())),
            )
            .build();
            let levels = all_declared_methods(&suite);
            assert_eq!(levels[0][0].name(), "alpha");
        }
    }

    mod ambiguity_tests {
        use super::*;

        #[test]
        fn test_duplicate_signature_rejected() {
            let suite = SuiteBuilder::new(
                ClassDef::<T>::new("S").test("testA", |_| Ok(())).test("testA", |_| Ok(())),
            )
            .build();
            assert!(check_ambiguous(&suite).is_err());
        }

        #[test]
        fn test_same_name_other_arity_allowed() {
            let suite = SuiteBuilder::new(
                ClassDef::<T>::new("S")
                    .test("testA", |_| Ok(()))
                    .method(MethodDef::plain("testA").param_count(1)),
            )
            .build();
            assert!(check_ambiguous(&suite).is_ok());
        }
    }
}
