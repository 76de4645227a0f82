//! Collaborators the engine is wired to: rule catalog, profile store,
//! change indexer, and clock.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::change::ActiveRuleChange;
use crate::error::StoreError;
use crate::model::{ActiveRule, ActiveRuleKey, Profile, ProfileId, Rule, RuleId, RuleParam, RuleStatus};

/// Read access to rule definitions.
pub trait RuleCatalog {
    fn rule(&self, id: &RuleId) -> Result<Option<Rule>, StoreError>;

    fn params(&self, id: &RuleId) -> Result<Vec<RuleParam>, StoreError> {
        Ok(self.rule(id)?.map(|rule| rule.params).unwrap_or_default())
    }

    /// Rule ids matching the filter, in a stable order.
    fn search(&self, filter: &RuleFilter) -> Result<Vec<RuleId>, StoreError>;
}

/// Selects rules for bulk operations.
///
/// Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleFilter {
    pub languages: Vec<String>,
    pub repositories: Vec<String>,
    pub rule_ids: Vec<RuleId>,
    pub statuses: Vec<RuleStatus>,
    pub include_templates: bool,
}

impl RuleFilter {
    pub fn language(language: impl Into<String>) -> Self {
        Self {
            languages: vec![language.into()],
            ..Self::default()
        }
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repositories.push(repository.into());
        self
    }

    pub fn with_rule(mut self, rule_id: impl Into<RuleId>) -> Self {
        self.rule_ids.push(rule_id.into());
        self
    }

    pub fn with_status(mut self, status: RuleStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn matches(&self, rule: &Rule) -> bool {
        (self.include_templates || !rule.is_template)
            && (self.languages.is_empty() || self.languages.contains(&rule.language))
            && (self.repositories.is_empty()
                || self.repositories.iter().any(|r| r == rule.id.repository()))
            && (self.rule_ids.is_empty() || self.rule_ids.contains(&rule.id))
            && (self.statuses.is_empty() || self.statuses.contains(&rule.status))
    }
}

/// Transactional storage of profiles and active rules.
pub trait ProfileStore {
    type Transaction<'a>: StoreTransaction
    where
        Self: 'a;

    fn begin(&mut self) -> Result<Self::Transaction<'_>, StoreError>;
}

/// A unit of work against a [`ProfileStore`].
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards
/// everything written through it.
pub trait StoreTransaction {
    fn profile(&self, id: &ProfileId) -> Result<Option<Profile>, StoreError>;

    /// All profiles of a language, ordered by name.
    fn profiles_by_language(&self, language: &str) -> Result<Vec<Profile>, StoreError>;

    /// The profile and all of its descendants.
    fn load_profile_subtree(&self, root: &ProfileId) -> Result<Vec<Profile>, StoreError>;

    fn insert_profile(&mut self, profile: &Profile) -> Result<(), StoreError>;

    fn update_profile(&mut self, profile: &Profile) -> Result<(), StoreError>;

    fn delete_profile(&mut self, id: &ProfileId) -> Result<(), StoreError>;

    fn update_profile_timestamp(&mut self, id: &ProfileId, at: u64) -> Result<(), StoreError>;

    /// Active rules for every (profile, rule) pair in the cross product.
    fn load_active_rules(
        &self,
        profile_ids: &[ProfileId],
        rule_ids: &[RuleId],
    ) -> Result<Vec<ActiveRule>, StoreError>;

    fn active_rules_of_profile(&self, id: &ProfileId) -> Result<Vec<ActiveRule>, StoreError>;

    fn active_rules_of_rule(&self, rule_id: &RuleId) -> Result<Vec<ActiveRule>, StoreError>;

    fn insert_active_rule(&mut self, rule: &ActiveRule) -> Result<(), StoreError>;

    fn update_active_rule(&mut self, rule: &ActiveRule) -> Result<(), StoreError>;

    fn delete_active_rule(&mut self, key: &ActiveRuleKey) -> Result<(), StoreError>;

    /// Whether a built-in profile of this name was ever registered.
    fn is_builtin_registered(&self, language: &str, name: &str) -> Result<bool, StoreError>;

    fn mark_builtin_registered(&mut self, language: &str, name: &str) -> Result<(), StoreError>;

    fn default_profile(&self, language: &str) -> Result<Option<ProfileId>, StoreError>;

    fn set_default_profile(
        &mut self,
        language: &str,
        id: Option<&ProfileId>,
    ) -> Result<(), StoreError>;

    fn commit(self) -> Result<(), StoreError>
    where
        Self: Sized;
}

/// Receives the ledger of every committed operation.
pub trait ChangeIndexer {
    fn on_changes(&mut self, changes: &[ActiveRuleChange]);
}

impl ChangeIndexer for () {
    fn on_changes(&mut self, _changes: &[ActiveRuleChange]) {}
}

/// Indexer that only logs what it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingIndexer;

impl ChangeIndexer for TracingIndexer {
    fn on_changes(&mut self, changes: &[ActiveRuleChange]) {
        for change in changes {
            debug!(
                change = %change.change_type,
                key = %change.key,
                severity = %change.severity,
                inheritance = %change.inheritance,
                "indexing active rule change"
            );
        }
    }
}

/// Source of timestamps, in milliseconds since the epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}
