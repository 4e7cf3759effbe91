//! Suite declaration model.
//!
//! A suite is declared level by level with [`ClassDef`]: the leaf first,
//! then its ancestors via [`SuiteBuilder::extends`]. Every level carries its
//! own metadata and methods. Bodies are typed closures over the suite's
//! instance type `T`; [`SuiteBuilder::build`] erases them into a
//! [`SuiteClass`] the runner can drive without knowing `T`.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Default)]
//! struct MathTests;
//!
//! let suite = SuiteBuilder::new(
//!     ClassDef::<MathTests>::new("demo.MathTests")
//!         .before_all("setUpClass", || Ok(()))
//!         .test("testAddition", |_t| {
//!             let a = random_int_between(0, 100)?;
//!             assert_eq!(a + 0, a);
//!             Ok(())
//!         }),
//! )
//! .default_constructor()
//! .build();
//! ```

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::annotations::{
    ClassAnnotations, ExpectedError, MethodAnnotations, Repeat, TestGroup, ThreadLeaks,
};
use crate::notifier::RunListener;
use crate::rules::MethodRule;
use crate::throwable::{TestResult, Throwable};
use crate::validators::ClassValidator;

/// A constructed test instance
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Method or constructor visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Visible everywhere
    Public,
    /// Visible to subclasses
    Protected,
    /// Visible within the declaring package
    Package,
    /// Visible within the declaring level only
    Private,
}

/// Lifecycle role of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodRole {
    /// Runs once before any test
    BeforeAll,
    /// Runs before every test
    BeforeEach,
    /// A test
    Test,
    /// Runs after every test
    AfterEach,
    /// Runs once after all tests
    AfterAll,
    /// Produces constructor parameter sets
    ParametersFactory,
    /// No lifecycle role
    Plain,
}

impl fmt::Display for MethodRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeforeAll => "BeforeClass",
            Self::BeforeEach => "Before",
            Self::Test => "Test",
            Self::AfterEach => "After",
            Self::AfterAll => "AfterClass",
            Self::ParametersFactory => "ParametersFactory",
            Self::Plain => "Plain",
        };
        f.write_str(name)
    }
}

/// One constructor argument: a display label plus the value
#[derive(Clone)]
pub struct ParamValue {
    label: String,
    value: Arc<dyn Any + Send + Sync>,
}

impl ParamValue {
    /// Value labelled by its `Display` output
    pub fn new<V: Any + Send + Sync + fmt::Display>(value: V) -> Self {
        Self {
            label: value.to_string(),
            value: Arc::new(value),
        }
    }

    /// Value with an explicit label
    pub fn labeled<V: Any + Send + Sync>(label: impl Into<String>, value: V) -> Self {
        Self {
            label: label.into(),
            value: Arc::new(value),
        }
    }

    /// Display label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Typed access to the value
    #[must_use]
    pub fn get<V: Any>(&self) -> Option<&V> {
        self.value.downcast_ref::<V>()
    }
}

impl fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ParamValue").field(&self.label).finish()
    }
}

/// One tuple of constructor arguments
#[derive(Debug, Clone, Default)]
pub struct ParamSet {
    values: Vec<ParamValue>,
}

impl ParamSet {
    /// Empty tuple
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value labelled by its `Display` output
    #[must_use]
    pub fn with<V: Any + Send + Sync + fmt::Display>(mut self, value: V) -> Self {
        self.values.push(ParamValue::new(value));
        self
    }

    /// Append a prepared value
    #[must_use]
    pub fn with_value(mut self, value: ParamValue) -> Self {
        self.values.push(value);
        self
    }

    /// Number of values
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the tuple is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&ParamValue> {
        self.values.get(index)
    }

    /// Typed value at `index`
    #[must_use]
    pub fn get<V: Any>(&self, index: usize) -> Option<&V> {
        self.values.get(index).and_then(ParamValue::get::<V>)
    }

    /// All values
    pub fn iter(&self) -> impl Iterator<Item = &ParamValue> {
        self.values.iter()
    }
}

type StaticBody = Arc<dyn Fn() -> TestResult + Send + Sync>;
type InstanceBody = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> TestResult + Send + Sync>;
type FactoryBody = Arc<dyn Fn() -> Result<Vec<ParamSet>, Throwable> + Send + Sync>;

#[derive(Clone)]
enum Body {
    Static(StaticBody),
    Instance(InstanceBody),
    Factory(FactoryBody),
}

/// A type-erased method declaration
#[derive(Clone)]
pub struct MethodDecl {
    name: String,
    role: MethodRole,
    visibility: Visibility,
    param_count: usize,
    annotations: MethodAnnotations,
    body: Body,
    declaring_class: String,
    package: String,
}

impl MethodDecl {
    /// Method name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lifecycle role
    #[must_use]
    pub const fn role(&self) -> MethodRole {
        self.role
    }

    /// Visibility
    #[must_use]
    pub const fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Whether the method is public
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// Declared parameter count
    #[must_use]
    pub const fn param_count(&self) -> usize {
        self.param_count
    }

    /// Whether the method runs without an instance
    #[must_use]
    pub const fn is_static(&self) -> bool {
        !matches!(self.body, Body::Instance(_))
    }

    /// Metadata
    #[must_use]
    pub const fn annotations(&self) -> &MethodAnnotations {
        &self.annotations
    }

    /// Name of the level that declares this method
    #[must_use]
    pub fn declaring_class(&self) -> &str {
        &self.declaring_class
    }

    /// Package of the declaring level
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Name and parameter count, the identity used for overriding
    #[must_use]
    pub fn signature(&self) -> (&str, usize) {
        (&self.name, self.param_count)
    }

    /// Invoke the body. Instance methods need an instance.
    pub fn invoke(&self, instance: Option<&(dyn Any + Send + Sync)>) -> TestResult {
        match (&self.body, instance) {
            (Body::Static(f), _) => f(),
            (Body::Instance(f), Some(instance)) => f(instance),
            (Body::Instance(_), None) => Err(Throwable::error(
                "NullPointerException",
                format!("Instance method {}#{} invoked without an instance", self.declaring_class, self.name),
            )),
            (Body::Factory(f), _) => f().map(|_| ()),
        }
    }

    /// Run a parameters factory
    pub(crate) fn invoke_factory(&self) -> Result<Vec<ParamSet>, Throwable> {
        match &self.body {
            Body::Factory(f) => f(),
            _ => Err(Throwable::error(
                "IllegalArgumentException",
                format!("{}#{} is not a parameters factory", self.declaring_class, self.name),
            )),
        }
    }
}

impl fmt::Debug for MethodDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDecl")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("visibility", &self.visibility)
            .field("static", &self.is_static())
            .field("param_count", &self.param_count)
            .field("declaring_class", &self.declaring_class)
            .finish()
    }
}

fn erase_instance<T, F>(f: F) -> InstanceBody
where
    T: Any + Send + Sync,
    F: Fn(&T) -> TestResult + Send + Sync + 'static,
{
    Arc::new(move |instance: &(dyn Any + Send + Sync)| match instance.downcast_ref::<T>() {
        Some(typed) => f(typed),
        None => Err(Throwable::error(
            "ClassCastException",
            format!("Instance is not a {}", std::any::type_name::<T>()),
        )),
    })
}

/// Typed method declaration for a suite over `T`
pub struct MethodDef<T> {
    decl: MethodDecl,
    _marker: PhantomData<fn(&T)>,
}

impl<T> fmt::Debug for MethodDef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.decl.fmt(f)
    }
}

impl<T: Any + Send + Sync> MethodDef<T> {
    fn from_body(name: impl Into<String>, role: MethodRole, body: Body) -> Self {
        Self {
            decl: MethodDecl {
                name: name.into(),
                role,
                visibility: Visibility::Public,
                param_count: 0,
                annotations: MethodAnnotations::default(),
                body,
                declaring_class: String::new(),
                package: String::new(),
            },
            _marker: PhantomData,
        }
    }

    /// Instance method with an arbitrary role
    pub fn instance<F>(name: impl Into<String>, role: MethodRole, f: F) -> Self
    where
        F: Fn(&T) -> TestResult + Send + Sync + 'static,
    {
        Self::from_body(name, role, Body::Instance(erase_instance(f)))
    }

    /// Static method with an arbitrary role
    pub fn static_fn<F>(name: impl Into<String>, role: MethodRole, f: F) -> Self
    where
        F: Fn() -> TestResult + Send + Sync + 'static,
    {
        Self::from_body(name, role, Body::Static(Arc::new(f)))
    }

    /// A test
    pub fn test<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T) -> TestResult + Send + Sync + 'static,
    {
        Self::instance(name, MethodRole::Test, f)
    }

    /// A before-each hook
    pub fn before_each<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T) -> TestResult + Send + Sync + 'static,
    {
        Self::instance(name, MethodRole::BeforeEach, f)
    }

    /// An after-each hook
    pub fn after_each<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T) -> TestResult + Send + Sync + 'static,
    {
        Self::instance(name, MethodRole::AfterEach, f)
    }

    /// A before-all hook
    pub fn before_all<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> TestResult + Send + Sync + 'static,
    {
        Self::static_fn(name, MethodRole::BeforeAll, f)
    }

    /// An after-all hook
    pub fn after_all<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> TestResult + Send + Sync + 'static,
    {
        Self::static_fn(name, MethodRole::AfterAll, f)
    }

    /// A parameters factory
    pub fn parameters<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Result<Vec<ParamSet>, Throwable> + Send + Sync + 'static,
    {
        Self::from_body(name, MethodRole::ParametersFactory, Body::Factory(Arc::new(f)))
    }

    /// An instance method without lifecycle role
    pub fn plain(name: impl Into<String>) -> Self {
        Self::instance(name, MethodRole::Plain, |_: &T| Ok(()))
    }

    /// A static method without lifecycle role
    pub fn plain_static(name: impl Into<String>) -> Self {
        Self::static_fn(name, MethodRole::Plain, || Ok(()))
    }

    /// Set visibility
    #[must_use]
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.decl.visibility = visibility;
        self
    }

    /// Declare the method as taking `count` parameters
    #[must_use]
    pub fn param_count(mut self, count: usize) -> Self {
        self.decl.param_count = count;
        self
    }

    /// Seed (`random` or one hex value)
    #[must_use]
    pub fn seed(mut self, seed: impl Into<String>) -> Self {
        self.decl.annotations.seed = Some(seed.into());
        self
    }

    /// Several seeds, each a separate candidate family
    #[must_use]
    pub fn seeds<I, S>(mut self, seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.decl.annotations.seeds = seeds.into_iter().map(Into::into).collect();
        self
    }

    /// Repetition
    #[must_use]
    pub fn repeat(mut self, repeat: Repeat) -> Self {
        self.decl.annotations.repeat = Some(repeat);
        self
    }

    /// Dedicated timeout annotation
    #[must_use]
    pub fn timeout_ms(mut self, millis: u64) -> Self {
        self.decl.annotations.timeout_ms = Some(millis);
        self
    }

    /// Timeout carried by the test declaration
    #[must_use]
    pub fn test_timeout_ms(mut self, millis: u64) -> Self {
        self.decl.annotations.test_timeout_ms = Some(millis);
        self
    }

    /// Expected error
    #[must_use]
    pub fn expected(mut self, expected: ExpectedError) -> Self {
        self.decl.annotations.expected = Some(expected);
        self
    }

    /// Skip unconditionally
    #[must_use]
    pub fn ignore(mut self) -> Self {
        self.decl.annotations.ignored = true;
        self
    }

    /// Add a test group
    #[must_use]
    pub fn group(mut self, group: TestGroup) -> Self {
        self.decl.annotations.groups.push(group);
        self
    }

    /// Thread-leak policy
    #[must_use]
    pub fn thread_leaks(mut self, policy: ThreadLeaks) -> Self {
        self.decl.annotations.thread_leaks = Some(policy);
        self
    }
}

/// One class level of a suite over instance type `T`
pub struct ClassDef<T> {
    name: String,
    package: String,
    annotations: ClassAnnotations,
    methods: Vec<MethodDecl>,
    _marker: PhantomData<fn(&T)>,
}

impl<T> fmt::Debug for ClassDef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("annotations", &self.annotations)
            .field("methods", &self.methods)
            .finish()
    }
}

fn package_of(name: &str) -> String {
    if let Some(idx) = name.rfind("::") {
        name[..idx].to_string()
    } else if let Some(idx) = name.rfind('.') {
        name[..idx].to_string()
    } else {
        String::new()
    }
}

impl<T: Any + Send + Sync> ClassDef<T> {
    /// Declare a level. The package is the name up to the last `.` or `::`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            package: package_of(&name),
            name,
            annotations: ClassAnnotations::default(),
            methods: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Override the package
    #[must_use]
    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// Suite seed: `random`, `runner` or `runner:method`
    #[must_use]
    pub fn seed(mut self, seed: impl Into<String>) -> Self {
        self.annotations.seed = Some(seed.into());
        self
    }

    /// Repetition for every test
    #[must_use]
    pub fn repeat(mut self, repeat: Repeat) -> Self {
        self.annotations.repeat = Some(repeat);
        self
    }

    /// Timeout for every test
    #[must_use]
    pub fn timeout_ms(mut self, millis: u64) -> Self {
        self.annotations.timeout_ms = Some(millis);
        self
    }

    /// Thread-leak policy
    #[must_use]
    pub fn thread_leaks(mut self, policy: ThreadLeaks) -> Self {
        self.annotations.thread_leaks = Some(policy);
        self
    }

    /// Add a test group to every test
    #[must_use]
    pub fn group(mut self, group: TestGroup) -> Self {
        self.annotations.groups.push(group);
        self
    }

    /// Subscribe a listener, created fresh for every run
    #[must_use]
    pub fn listener<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn RunListener> + Send + Sync + 'static,
    {
        self.annotations.listeners.push(Arc::new(move || Ok(factory())));
        self
    }

    /// Subscribe a listener whose construction may fail
    #[must_use]
    pub fn listener_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn RunListener>, Throwable> + Send + Sync + 'static,
    {
        self.annotations.listeners.push(Arc::new(factory));
        self
    }

    /// Add a validator
    #[must_use]
    pub fn validator<V: ClassValidator + 'static>(mut self, validator: V) -> Self {
        self.annotations.validators.push(Arc::new(validator));
        self
    }

    /// Add a rule read from the test instance
    #[must_use]
    pub fn rule<F>(mut self, field: F) -> Self
    where
        F: Fn(&T) -> Arc<dyn MethodRule> + Send + Sync + 'static,
    {
        self.annotations.rules.push(Arc::new(move |instance: &(dyn Any + Send + Sync)| {
            instance.downcast_ref::<T>().map(&field)
        }));
        self
    }

    /// Declare a method
    #[must_use]
    pub fn method(mut self, method: MethodDef<T>) -> Self {
        self.methods.push(method.decl);
        self
    }

    /// Declare a test
    #[must_use]
    pub fn test<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T) -> TestResult + Send + Sync + 'static,
    {
        self.method(MethodDef::test(name, f))
    }

    /// Declare a before-each hook
    #[must_use]
    pub fn before_each<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T) -> TestResult + Send + Sync + 'static,
    {
        self.method(MethodDef::before_each(name, f))
    }

    /// Declare an after-each hook
    #[must_use]
    pub fn after_each<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T) -> TestResult + Send + Sync + 'static,
    {
        self.method(MethodDef::after_each(name, f))
    }

    /// Declare a before-all hook
    #[must_use]
    pub fn before_all<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> TestResult + Send + Sync + 'static,
    {
        self.method(MethodDef::before_all(name, f))
    }

    /// Declare an after-all hook
    #[must_use]
    pub fn after_all<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> TestResult + Send + Sync + 'static,
    {
        self.method(MethodDef::after_all(name, f))
    }

    /// Declare a parameters factory
    #[must_use]
    pub fn parameters<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Result<Vec<ParamSet>, Throwable> + Send + Sync + 'static,
    {
        self.method(MethodDef::parameters(name, f))
    }

    fn into_level(self) -> ClassLevel {
        let methods = self
            .methods
            .into_iter()
            .map(|mut m| {
                m.declaring_class = self.name.clone();
                m.package = self.package.clone();
                Arc::new(m)
            })
            .collect();
        ClassLevel {
            name: self.name,
            package: self.package,
            annotations: self.annotations,
            methods,
        }
    }
}

/// One erased class level
#[derive(Debug, Clone)]
pub struct ClassLevel {
    name: String,
    package: String,
    annotations: ClassAnnotations,
    methods: Vec<Arc<MethodDecl>>,
}

impl ClassLevel {
    /// Level name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Level package
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Level metadata
    #[must_use]
    pub const fn annotations(&self) -> &ClassAnnotations {
        &self.annotations
    }

    /// Methods in declaration order
    #[must_use]
    pub fn methods(&self) -> &[Arc<MethodDecl>] {
        &self.methods
    }
}

type CreateFn = Arc<dyn Fn(&ParamSet) -> Result<Instance, Throwable> + Send + Sync>;

/// Erased constructor
#[derive(Clone)]
pub struct Constructor {
    arity: usize,
    param_names: Vec<Option<String>>,
    visibility: Visibility,
    create: CreateFn,
}

impl Constructor {
    /// Declared parameter count
    #[must_use]
    pub const fn arity(&self) -> usize {
        self.arity
    }

    /// Visibility
    #[must_use]
    pub const fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Declared name of parameter `index`
    #[must_use]
    pub fn param_name(&self, index: usize) -> Option<&str> {
        self.param_names.get(index).and_then(|n| n.as_deref())
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("arity", &self.arity)
            .field("param_names", &self.param_names)
            .field("visibility", &self.visibility)
            .finish()
    }
}

/// Assembles a [`SuiteClass`] from typed levels
pub struct SuiteBuilder<T> {
    levels: Vec<ClassLevel>,
    constructor: Option<Constructor>,
    is_public: bool,
    is_abstract: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for SuiteBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteBuilder")
            .field("levels", &self.levels)
            .field("constructor", &self.constructor)
            .finish()
    }
}

impl<T: Any + Send + Sync> SuiteBuilder<T> {
    /// Start from the leaf level
    #[must_use]
    pub fn new(leaf: ClassDef<T>) -> Self {
        Self {
            levels: vec![leaf.into_level()],
            constructor: None,
            is_public: true,
            is_abstract: false,
            _marker: PhantomData,
        }
    }

    /// Add the next ancestor level
    #[must_use]
    pub fn extends(mut self, parent: ClassDef<T>) -> Self {
        self.levels.push(parent.into_level());
        self
    }

    /// Constructor taking `arity` parameters
    #[must_use]
    pub fn constructor<F>(mut self, arity: usize, create: F) -> Self
    where
        F: Fn(&ParamSet) -> Result<T, Throwable> + Send + Sync + 'static,
    {
        self.constructor = Some(Constructor {
            arity,
            param_names: Vec::new(),
            visibility: Visibility::Public,
            create: Arc::new(move |params: &ParamSet| create(params).map(|t| Arc::new(t) as Instance)),
        });
        self
    }

    /// Name constructor parameters (used in test names)
    #[must_use]
    pub fn param_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        if let Some(constructor) = &mut self.constructor {
            constructor.param_names = names.into_iter().map(|n| n.map(Into::into)).collect();
        }
        self
    }

    /// Set constructor visibility
    #[must_use]
    pub fn constructor_visibility(mut self, visibility: Visibility) -> Self {
        if let Some(constructor) = &mut self.constructor {
            constructor.visibility = visibility;
        }
        self
    }

    /// Mark the suite as not public
    #[must_use]
    pub fn non_public(mut self) -> Self {
        self.is_public = false;
        self
    }

    /// Mark the suite as abstract
    #[must_use]
    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Erase into a runnable suite
    #[must_use]
    pub fn build(self) -> SuiteClass {
        SuiteClass {
            inner: Arc::new(SuiteInner {
                levels: self.levels,
                constructor: self.constructor,
                is_public: self.is_public,
                is_abstract: self.is_abstract,
            }),
        }
    }
}

impl<T: Any + Send + Sync + Default> SuiteBuilder<T> {
    /// Zero-argument constructor using `T::default()`
    #[must_use]
    pub fn default_constructor(self) -> Self {
        self.constructor(0, |_| Ok(T::default()))
    }
}

#[derive(Debug)]
struct SuiteInner {
    levels: Vec<ClassLevel>,
    constructor: Option<Constructor>,
    is_public: bool,
    is_abstract: bool,
}

/// A type-erased suite, cheap to clone
#[derive(Debug, Clone)]
pub struct SuiteClass {
    inner: Arc<SuiteInner>,
}

impl SuiteClass {
    /// Name of the leaf level
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.levels.first().map_or("", |l| l.name.as_str())
    }

    /// Levels, leaf first
    #[must_use]
    pub fn levels(&self) -> &[ClassLevel] {
        &self.inner.levels
    }

    /// Constructor, if declared
    #[must_use]
    pub fn constructor(&self) -> Option<&Constructor> {
        self.inner.constructor.as_ref()
    }

    /// Whether the suite is public
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.inner.is_public
    }

    /// Whether the suite is abstract
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.inner.is_abstract
    }

    /// First value found walking levels leaf to root
    pub fn find_class_annotation<R>(&self, f: impl Fn(&ClassAnnotations) -> Option<R>) -> Option<R> {
        self.inner.levels.iter().find_map(|l| f(&l.annotations))
    }

    /// Create an instance for a parameter tuple
    pub fn instantiate(&self, params: &ParamSet) -> Result<Instance, Throwable> {
        let constructor = self.constructor().ok_or_else(|| {
            Throwable::error(
                "InstantiationException",
                format!("Suite {} declares no constructor", self.name()),
            )
        })?;
        if constructor.arity != params.len() {
            return Err(Throwable::error(
                "IllegalArgumentException",
                format!(
                    "Constructor of {} expects {} argument(s), parameter set has {}",
                    self.name(),
                    constructor.arity,
                    params.len()
                ),
            ));
        }
        (constructor.create)(params)
    }
}
