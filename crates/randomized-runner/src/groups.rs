//! Test group switches.

use std::collections::BTreeMap;

use crate::annotations::{TestGroup, NIGHTLY_GROUP};
use crate::result::{RunnerError, RunnerResult};
use crate::runner::config::{parse_bool, RunnerConfig, SYSPROP_NIGHTLY};

/// Resolves whether test groups are enabled for a run.
#[derive(Debug, Clone, Default)]
pub struct GroupEvaluator {
    nightly: bool,
    properties: BTreeMap<String, String>,
}

impl GroupEvaluator {
    /// Evaluator over the switches of a configuration
    #[must_use]
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            nightly: config.nightly,
            properties: config.properties.clone(),
        }
    }

    /// Whether nightly mode is on
    #[must_use]
    pub const fn is_nightly(&self) -> bool {
        self.nightly
    }

    /// Whether `group` is enabled.
    ///
    /// An explicit property value wins over the group's default. The
    /// nightly group also follows the nightly toggle.
    pub fn is_enabled(&self, group: &TestGroup) -> RunnerResult<bool> {
        let property = group.property_name();
        if let Some(value) = self.properties.get(&property) {
            return parse_bool(&property, value);
        }
        if group.name() == NIGHTLY_GROUP || property == SYSPROP_NIGHTLY {
            return Ok(self.nightly || group.is_enabled_by_default());
        }
        Ok(group.is_enabled_by_default())
    }

    /// First disabled group, if any
    pub fn first_disabled<'a>(
        &self,
        groups: impl IntoIterator<Item = &'a TestGroup>,
    ) -> RunnerResult<Option<&'a TestGroup>> {
        for group in groups {
            if !self.is_enabled(group)? {
                return Ok(Some(group));
            }
        }
        Ok(None)
    }

    /// Reason reported when a candidate is skipped because of `group`
    #[must_use]
    pub fn ignore_reason(&self, group: &TestGroup) -> String {
        format!(
            "'{}' test group is disabled (@{}, {}={})",
            group.name(),
            group.name(),
            group.property_name(),
            self.properties
                .get(&group.property_name())
                .map_or("<unset>", String::as_str)
        )
    }

    /// Fail on a group property that is not a boolean
    pub fn validate(&self, groups: &[TestGroup]) -> RunnerResult<()> {
        for group in groups {
            self.is_enabled(group).map_err(|e| {
                RunnerError::config(format!("Invalid switch for test group '{}': {e}", group.name()))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_without_property() {
        let eval = GroupEvaluator::default();
        assert!(eval.is_enabled(&TestGroup::new("slow")).unwrap());
        assert!(!eval.is_enabled(&TestGroup::new("slow").enabled(false)).unwrap());
        assert!(!eval.is_enabled(&TestGroup::nightly()).unwrap());
    }

    #[test]
    fn test_property_overrides_default() {
        let config = RunnerConfig::builder()
            .property("tests.slow", "off")
            .property("tests.heavy", "yes")
            .build()
            .unwrap();
        let eval = GroupEvaluator::new(&config);
        assert!(!eval.is_enabled(&TestGroup::new("slow")).unwrap());
        assert!(eval.is_enabled(&TestGroup::new("heavy").enabled(false)).unwrap());
    }

    #[test]
    fn test_nightly_toggle() {
        let config = RunnerConfig::builder().nightly(true).build().unwrap();
        let eval = GroupEvaluator::new(&config);
        assert!(eval.is_nightly());
        assert!(eval.is_enabled(&TestGroup::nightly()).unwrap());
    }

    #[test]
    fn test_invalid_switch_is_config_error() {
        let config = RunnerConfig::builder()
            .property("tests.slow", "maybe")
            .build()
            .unwrap();
        let eval = GroupEvaluator::new(&config);
        let err = eval.validate(&[TestGroup::new("slow")]).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_first_disabled_and_reason() {
        let eval = GroupEvaluator::default();
        let groups = [TestGroup::new("a"), TestGroup::new("b").enabled(false)];
        let disabled = eval.first_disabled(&groups).unwrap().unwrap();
        assert_eq!(disabled.name(), "b");
        assert!(eval.ignore_reason(disabled).contains("tests.b=<unset>"));
    }
}
