//! Built-in demo suites the worker can run by name.

use randomized_runner::{
    random_bool, random_int_between, ClassDef, MethodDef, ParamSet, RandomizedContext, Repeat, SuiteBuilder,
    SuiteClass, TestGroup, Throwable,
};

type SuiteFactory = fn() -> SuiteClass;

const SUITES: &[(&str, SuiteFactory)] = &[
    ("demo.Arithmetic", arithmetic),
    ("demo.Repeated", repeated),
    ("demo.Parameterized", parameterized),
    ("demo.Groups", groups),
    ("demo.Failing", failing),
];

/// Names of all registered suites
#[must_use]
pub fn names() -> Vec<&'static str> {
    SUITES.iter().map(|(name, _)| *name).collect()
}

/// Build the suite registered under `name`
#[must_use]
pub fn find(name: &str) -> Option<SuiteClass> {
    SUITES.iter().find(|(n, _)| *n == name).map(|(_, build)| build())
}

#[derive(Debug, Default)]
struct Arithmetic;

fn arithmetic() -> SuiteClass {
    SuiteBuilder::new(
        ClassDef::<Arithmetic>::new("demo.Arithmetic")
            .before_all("checkContext", || {
                RandomizedContext::current()?;
                Ok(())
            })
            .test("testAdditionCommutes", |_| {
                let a = random_int_between(-1_000, 1_000)?;
                let b = random_int_between(-1_000, 1_000)?;
                assert_eq!(a + b, b + a);
                Ok(())
            })
            .test("testDoubleNegation", |_| {
                let a = random_int_between(i64::from(i32::MIN), i64::from(i32::MAX))?;
                assert_eq!(-(-a), a);
                Ok(())
            }),
    )
    .default_constructor()
    .build()
}

#[derive(Debug, Default)]
struct Repeated;

fn repeated() -> SuiteClass {
    SuiteBuilder::new(
        ClassDef::<Repeated>::new("demo.Repeated")
            .method(
                MethodDef::test("testCoinFlip", |_| {
                    random_bool()?;
                    Ok(())
                })
                .repeat(Repeat::new(3)),
            )
            .method(
                MethodDef::test("testFixedSeeds", |_| {
                    let chain = RandomizedContext::current()?.seed_chain()?;
                    if chain.len() < 2 {
                        return Err(Throwable::failure("seed chain too short"));
                    }
                    Ok(())
                })
                .seeds(["A", "B"]),
            ),
    )
    .default_constructor()
    .build()
}

#[derive(Debug)]
struct Parameterized {
    width: i64,
}

fn parameterized() -> SuiteClass {
    SuiteBuilder::new(
        ClassDef::<Parameterized>::new("demo.Parameterized")
            .parameters("widths", || Ok(vec![ParamSet::new().with(1_i64), ParamSet::new().with(8_i64)]))
            .test("testWidthPositive", |s| {
                if s.width > 0 {
                    Ok(())
                } else {
                    Err(Throwable::failure(format!("width {} not positive", s.width)))
                }
            }),
    )
    .constructor(1, |params| {
        params
            .get::<i64>(0)
            .map(|width| Parameterized { width: *width })
            .ok_or_else(|| Throwable::failure("missing width"))
    })
    .param_names([Some("width")])
    .build()
}

#[derive(Debug, Default)]
struct Groups;

fn groups() -> SuiteClass {
    SuiteBuilder::new(
        ClassDef::<Groups>::new("demo.Groups")
            .test("testAlways", |_| Ok(()))
            .method(MethodDef::test("testNightly", |_| Ok(())).group(TestGroup::nightly()))
            .method(MethodDef::test("testSlow", |_| Ok(())).group(TestGroup::new("slow").enabled(false))),
    )
    .default_constructor()
    .build()
}

#[derive(Debug, Default)]
struct Failing;

fn failing() -> SuiteClass {
    SuiteBuilder::new(
        ClassDef::<Failing>::new("demo.Failing")
            .test("testPasses", |_| Ok(()))
            .test("testAlwaysFails", |_| {
                let value = random_int_between(0, 10)?;
                Err(Throwable::failure(format!("unlucky value {value}")))
            }),
    )
    .default_constructor()
    .build()
}
