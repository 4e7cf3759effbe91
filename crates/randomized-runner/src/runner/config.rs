//! Runner Configuration
//!
//! Global switches recognized by the runner. They are usually read from
//! `tests.*` properties or `TESTS_*` environment variables and override
//! anything declared on a suite.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::randomness::SeedChain;
use crate::result::{RunnerError, RunnerResult};

/// Global seed override: `runner[:method]`
pub const SYSPROP_RANDOM_SEED: &str = "tests.seed";
/// Global iteration count override
pub const SYSPROP_ITERATIONS: &str = "tests.iters";
/// Run only the suite with this exact name
pub const SYSPROP_TESTCLASS: &str = "tests.class";
/// Run only tests with this exact method name
pub const SYSPROP_TESTMETHOD: &str = "tests.method";
/// Number of interrupt (then stop) attempts on a runaway thread
pub const SYSPROP_KILLATTEMPTS: &str = "tests.killattempts";
/// Milliseconds to wait between kill attempts
pub const SYSPROP_KILLWAIT: &str = "tests.killwait";
/// Default test timeout in milliseconds (0 disables)
pub const SYSPROP_TIMEOUT: &str = "tests.timeout";
/// Enable stack trace filtering
pub const SYSPROP_STACKFILTERING: &str = "tests.stackfiltering";
/// Enable nightly-only tests
pub const SYSPROP_NIGHTLY: &str = "tests.nightly";

/// Default number of kill attempts
pub const DEFAULT_KILL_ATTEMPTS: u32 = 10;
/// Default wait between kill attempts (ms)
pub const DEFAULT_KILL_WAIT_MS: u64 = 1000;
/// Default test timeout (ms); 0 means no timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 0;

const PROPERTY_PREFIX: &str = "tests.";
const ENV_PREFIX: &str = "TESTS_";

/// Configuration for a runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Global seed override
    pub seed: Option<SeedChain>,
    /// Global iteration count override (positive)
    pub iterations: Option<u32>,
    /// Exact suite name filter
    pub test_class: Option<String>,
    /// Exact method name filter
    pub test_method: Option<String>,
    /// Glob filter on method names
    pub method_glob: Option<String>,
    /// Interrupt/stop attempts on a runaway thread
    pub kill_attempts: u32,
    /// Wait between kill attempts (ms)
    pub kill_wait_ms: u64,
    /// Default test timeout (ms); 0 disables
    pub timeout_ms: u64,
    /// Filter runner frames from stack traces
    pub stack_filtering: bool,
    /// Run tests in the nightly group
    pub nightly: bool,
    /// Remaining `tests.*` properties (test group switches)
    pub properties: BTreeMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            seed: None,
            iterations: None,
            test_class: None,
            test_method: None,
            method_glob: None,
            kill_attempts: DEFAULT_KILL_ATTEMPTS,
            kill_wait_ms: DEFAULT_KILL_WAIT_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            stack_filtering: true,
            nightly: false,
            properties: BTreeMap::new(),
        }
    }
}

/// Parse a boolean switch: `true/false/on/off/yes/no`, case-insensitive.
pub fn parse_bool(key: &str, value: &str) -> RunnerResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" => Ok(true),
        "false" | "off" | "no" => Ok(false),
        other => Err(RunnerError::config(format!(
            "Property {key} must be a boolean (true/false/on/off/yes/no), got '{other}'"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> RunnerResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| RunnerError::config(format!("Property {key} must be a number, got '{value}': {e}")))
}

fn positive_iterations(value: u32) -> RunnerResult<u32> {
    if value == 0 {
        Err(RunnerError::config(format!(
            "Property {SYSPROP_ITERATIONS} must be a positive integer, got 0"
        )))
    } else {
        Ok(value)
    }
}

impl RunnerConfig {
    /// Create a new builder
    #[must_use]
    pub fn builder() -> RunnerConfigBuilder {
        RunnerConfigBuilder::default()
    }

    /// Build from a property map. Empty values count as unset.
    pub fn from_properties<'a, I>(properties: I) -> RunnerResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        for (key, value) in properties {
            if value.trim().is_empty() {
                continue;
            }
            match key {
                SYSPROP_RANDOM_SEED => config.seed = Some(SeedChain::parse(value)?),
                SYSPROP_ITERATIONS => {
                    config.iterations = Some(positive_iterations(parse_number(key, value)?)?);
                }
                SYSPROP_TESTCLASS => config.test_class = Some(value.trim().to_string()),
                SYSPROP_TESTMETHOD => config.test_method = Some(value.trim().to_string()),
                SYSPROP_KILLATTEMPTS => config.kill_attempts = parse_number(key, value)?,
                SYSPROP_KILLWAIT => config.kill_wait_ms = parse_number(key, value)?,
                SYSPROP_TIMEOUT => config.timeout_ms = parse_number(key, value)?,
                SYSPROP_STACKFILTERING => config.stack_filtering = parse_bool(key, value)?,
                SYSPROP_NIGHTLY => config.nightly = parse_bool(key, value)?,
                other if other.starts_with(PROPERTY_PREFIX) => {
                    config.properties.insert(other.to_string(), value.trim().to_string());
                }
                _ => {}
            }
        }
        Ok(config)
    }

    /// Build from `TESTS_*` environment variables (`TESTS_SEED` -> `tests.seed`).
    pub fn from_env() -> RunnerResult<Self> {
        let vars: Vec<(String, String)> = std::env::vars()
            .filter_map(|(k, v)| env_key_to_property(&k).map(|p| (p, v)))
            .collect();
        Self::from_properties(vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Raw value of a `tests.*` property (e.g. a test group switch)
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// The configuration as `tests.*` key/value pairs
    #[must_use]
    pub fn to_properties(&self) -> BTreeMap<String, String> {
        let mut out = self.properties.clone();
        if let Some(seed) = &self.seed {
            out.insert(SYSPROP_RANDOM_SEED.into(), seed.to_string());
        }
        if let Some(iters) = self.iterations {
            out.insert(SYSPROP_ITERATIONS.into(), iters.to_string());
        }
        if let Some(class) = &self.test_class {
            out.insert(SYSPROP_TESTCLASS.into(), class.clone());
        }
        if let Some(method) = &self.test_method {
            out.insert(SYSPROP_TESTMETHOD.into(), method.clone());
        }
        out.insert(SYSPROP_KILLATTEMPTS.into(), self.kill_attempts.to_string());
        out.insert(SYSPROP_KILLWAIT.into(), self.kill_wait_ms.to_string());
        out.insert(SYSPROP_TIMEOUT.into(), self.timeout_ms.to_string());
        out.insert(SYSPROP_STACKFILTERING.into(), self.stack_filtering.to_string());
        out.insert(SYSPROP_NIGHTLY.into(), self.nightly.to_string());
        out
    }
}

fn env_key_to_property(key: &str) -> Option<String> {
    let rest = key.strip_prefix(ENV_PREFIX)?;
    if rest.is_empty() {
        return None;
    }
    Some(format!(
        "{PROPERTY_PREFIX}{}",
        rest.to_ascii_lowercase().replace('_', ".")
    ))
}

/// Builder for `RunnerConfig`
#[derive(Debug, Clone, Default)]
pub struct RunnerConfigBuilder {
    config: RunnerConfig,
}

impl RunnerConfigBuilder {
    /// Start from an existing configuration
    #[must_use]
    pub fn from_config(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Set the global seed chain
    #[must_use]
    pub fn seed(mut self, seed: SeedChain) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Set the global iteration override
    #[must_use]
    pub fn iterations(mut self, iterations: u32) -> Self {
        self.config.iterations = Some(iterations);
        self
    }

    /// Run only the named suite
    #[must_use]
    pub fn test_class(mut self, class: impl Into<String>) -> Self {
        self.config.test_class = Some(class.into());
        self
    }

    /// Run only tests with this method name
    #[must_use]
    pub fn test_method(mut self, method: impl Into<String>) -> Self {
        self.config.test_method = Some(method.into());
        self
    }

    /// Run only tests whose method name matches the glob
    #[must_use]
    pub fn method_glob(mut self, pattern: impl Into<String>) -> Self {
        self.config.method_glob = Some(pattern.into());
        self
    }

    /// Set kill attempts
    #[must_use]
    pub fn kill_attempts(mut self, attempts: u32) -> Self {
        self.config.kill_attempts = attempts;
        self
    }

    /// Set wait between kill attempts
    #[must_use]
    pub fn kill_wait_ms(mut self, millis: u64) -> Self {
        self.config.kill_wait_ms = millis;
        self
    }

    /// Set the default test timeout
    #[must_use]
    pub fn timeout_ms(mut self, millis: u64) -> Self {
        self.config.timeout_ms = millis;
        self
    }

    /// Enable/disable stack filtering
    #[must_use]
    pub fn stack_filtering(mut self, enabled: bool) -> Self {
        self.config.stack_filtering = enabled;
        self
    }

    /// Enable/disable nightly tests
    #[must_use]
    pub fn nightly(mut self, enabled: bool) -> Self {
        self.config.nightly = enabled;
        self
    }

    /// Set an arbitrary `tests.*` property (e.g. a group switch)
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.properties.insert(key.into(), value.into());
        self
    }

    /// Build, validating the iteration count
    pub fn build(self) -> RunnerResult<RunnerConfig> {
        if let Some(iters) = self.config.iterations {
            positive_iterations(iters)?;
        }
        if let Some(pattern) = &self.config.method_glob {
            glob::Pattern::new(pattern)
                .map_err(|e| RunnerError::config(format!("Invalid method glob '{pattern}': {e}")))?;
        }
        Ok(self.config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod defaults_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = RunnerConfig::default();
            assert_eq!(config.kill_attempts, 10);
            assert_eq!(config.kill_wait_ms, 1000);
            assert_eq!(config.timeout_ms, 0);
            assert!(config.stack_filtering);
            assert!(!config.nightly);
            assert!(config.seed.is_none());
        }
    }

    mod properties_tests {
        use super::*;

        #[test]
        fn test_from_properties() {
            let config = RunnerConfig::from_properties([
                ("tests.seed", "DEADBEEF:CAFE"),
                ("tests.iters", "5"),
                ("tests.class", "pkg.Suite"),
                ("tests.method", "testFoo"),
                ("tests.killattempts", "3"),
                ("tests.killwait", "50"),
                ("tests.timeout", "200"),
                ("tests.stackfiltering", "off"),
                ("tests.nightly", "yes"),
                ("tests.slow", "false"),
                ("other.key", "ignored"),
            ])
            .unwrap();
            assert_eq!(config.seed, Some(SeedChain::with_method(0xDEADBEEF, 0xCAFE)));
            assert_eq!(config.iterations, Some(5));
            assert_eq!(config.test_class.as_deref(), Some("pkg.Suite"));
            assert_eq!(config.test_method.as_deref(), Some("testFoo"));
            assert_eq!(config.kill_attempts, 3);
            assert_eq!(config.kill_wait_ms, 50);
            assert_eq!(config.timeout_ms, 200);
            assert!(!config.stack_filtering);
            assert!(config.nightly);
            assert_eq!(config.property("tests.slow"), Some("false"));
            assert!(config.property("other.key").is_none());
        }

        #[test]
        fn test_empty_values_are_unset() {
            let config = RunnerConfig::from_properties([("tests.seed", ""), ("tests.iters", " ")]).unwrap();
            assert!(config.seed.is_none());
            assert!(config.iterations.is_none());
        }

        #[test]
        fn test_invalid_values_are_config_errors() {
            assert!(RunnerConfig::from_properties([("tests.seed", "A:B:C")]).unwrap_err().is_config());
            assert!(RunnerConfig::from_properties([("tests.iters", "0")]).unwrap_err().is_config());
            assert!(RunnerConfig::from_properties([("tests.iters", "-1")]).unwrap_err().is_config());
            assert!(RunnerConfig::from_properties([("tests.nightly", "maybe")]).unwrap_err().is_config());
        }

        #[test]
        fn test_round_trip_properties() {
            let config = RunnerConfig::builder()
                .seed(SeedChain::runner(0xAB))
                .iterations(3)
                .nightly(true)
                .property("tests.slow", "on")
                .build()
                .unwrap();
            let props = config.to_properties();
            let back = RunnerConfig::from_properties(props.iter().map(|(k, v)| (k.as_str(), v.as_str()))).unwrap();
            assert_eq!(back, config);
        }

        #[test]
        fn test_env_key_mapping() {
            assert_eq!(env_key_to_property("TESTS_SEED").as_deref(), Some("tests.seed"));
            assert_eq!(env_key_to_property("TESTS_KILLATTEMPTS").as_deref(), Some("tests.killattempts"));
            assert_eq!(env_key_to_property("TESTS_MY_GROUP").as_deref(), Some("tests.my.group"));
            assert!(env_key_to_property("TESTS_").is_none());
            assert!(env_key_to_property("PATH").is_none());
        }
    }

    mod builder_tests {
        use super::*;

        #[test]
        fn test_builder_rejects_zero_iterations() {
            assert!(RunnerConfig::builder().iterations(0).build().is_err());
        }

        #[test]
        fn test_builder_rejects_bad_glob() {
            assert!(RunnerConfig::builder().method_glob("[").build().is_err());
            assert!(RunnerConfig::builder().method_glob("test*").build().is_ok());
        }

        #[test]
        fn test_parse_bool_variants() {
            for v in ["true", "ON", "Yes"] {
                assert!(parse_bool("k", v).unwrap());
            }
            for v in ["false", "off", "NO"] {
                assert!(!parse_bool("k", v).unwrap());
            }
        }
    }
}
