//! Activation requests.

use std::collections::BTreeMap;

use crate::model::{RuleId, Severity};

/// A request to activate (or reset) one rule.
///
/// Unset fields fall back to stored, inherited, or default values when the
/// request is resolved against a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleActivation {
    rule_id: RuleId,
    severity: Option<Severity>,
    prioritized: Option<bool>,
    params: BTreeMap<String, String>,
    reset: bool,
    cascade: bool,
}

impl RuleActivation {
    pub fn new(rule_id: impl Into<RuleId>) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity: None,
            prioritized: None,
            params: BTreeMap::new(),
            reset: false,
            cascade: false,
        }
    }

    /// A request that restores the parent's values, or the rule defaults
    /// when the profile has no parent.
    pub fn reset(rule_id: impl Into<RuleId>) -> Self {
        Self {
            reset: true,
            ..Self::new(rule_id)
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_prioritized(mut self, prioritized: bool) -> Self {
        self.prioritized = Some(prioritized);
        self
    }

    /// Request a parameter value. An empty value means "unset".
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn rule_id(&self) -> &RuleId {
        &self.rule_id
    }

    pub fn severity(&self) -> Option<Severity> {
        self.severity
    }

    pub fn prioritized(&self) -> Option<bool> {
        self.prioritized
    }

    pub fn is_reset(&self) -> bool {
        self.reset
    }

    /// True when this request was derived from a parent's activation.
    pub fn is_cascade(&self) -> bool {
        self.cascade
    }

    /// Whether the request names this parameter at all.
    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// The requested value of a parameter, treating empty values as absent.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// The same request as seen by a child profile during propagation.
    pub(crate) fn as_cascade(&self) -> Self {
        Self {
            cascade: true,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_param_counts_as_absent() {
        let activation = RuleActivation::new("java:S1")
            .with_param("max", "")
            .with_param("min", "3");
        assert!(activation.has_param("max"));
        assert_eq!(activation.param("max"), None);
        assert_eq!(activation.param("min"), Some("3"));
    }

    #[test]
    fn cascade_copy_keeps_values() {
        let activation = RuleActivation::new("java:S1").with_severity(Severity::Blocker);
        let cascaded = activation.as_cascade();
        assert!(cascaded.is_cascade());
        assert!(!activation.is_cascade());
        assert_eq!(cascaded.severity(), Some(Severity::Blocker));
    }
}
