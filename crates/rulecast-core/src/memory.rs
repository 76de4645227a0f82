//! In-memory implementations of the engine's collaborators.
//!
//! [`MemoryStore`] gives every transaction a private copy of the data and
//! swaps it in on commit, so an operation that fails halfway leaves nothing
//! behind.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::change::ActiveRuleChange;
use crate::error::StoreError;
use crate::model::{ActiveRule, ActiveRuleKey, Profile, ProfileId, Rule, RuleId};
use crate::store::{ChangeIndexer, Clock, ProfileStore, RuleCatalog, RuleFilter, StoreTransaction};

/// Rule catalog backed by a map.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    rules: BTreeMap<RuleId, Rule>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a rule.
    pub fn insert(&mut self, rule: Rule) {
        self.rules.insert(rule.id.clone(), rule);
    }

    pub fn get_mut(&mut self, id: &RuleId) -> Option<&mut Rule> {
        self.rules.get_mut(id)
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }
}

impl FromIterator<Rule> for MemoryCatalog {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for rule in iter {
            catalog.insert(rule);
        }
        catalog
    }
}

impl RuleCatalog for MemoryCatalog {
    fn rule(&self, id: &RuleId) -> Result<Option<Rule>, StoreError> {
        Ok(self.rules.get(id).cloned())
    }

    fn search(&self, filter: &RuleFilter) -> Result<Vec<RuleId>, StoreError> {
        Ok(self
            .rules
            .values()
            .filter(|rule| filter.matches(rule))
            .map(|rule| rule.id.clone())
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    profiles: BTreeMap<ProfileId, Profile>,
    active_rules: BTreeMap<ActiveRuleKey, ActiveRule>,
    registered: BTreeSet<(String, String)>,
    defaults: BTreeMap<String, ProfileId>,
}

/// Profile store backed by maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: State,
    commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a profile outside of any transaction.
    pub fn seed_profile(&mut self, profile: Profile) {
        self.state.profiles.insert(profile.id.clone(), profile);
    }

    /// Insert an active rule outside of any transaction.
    pub fn seed_active_rule(&mut self, active_rule: ActiveRule) {
        self.state
            .active_rules
            .insert(active_rule.key.clone(), active_rule);
    }

    pub fn profile(&self, id: &ProfileId) -> Option<&Profile> {
        self.state.profiles.get(id)
    }

    /// Look a profile up by language and name.
    pub fn find_profile(&self, language: &str, name: &str) -> Option<&Profile> {
        self.state
            .profiles
            .values()
            .find(|p| p.language == language && p.name == name)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.state.profiles.values()
    }

    pub fn active_rule(&self, profile_id: &ProfileId, rule_id: &RuleId) -> Option<&ActiveRule> {
        self.state
            .active_rules
            .get(&ActiveRuleKey::new(profile_id.clone(), rule_id.clone()))
    }

    pub fn active_rules_of(&self, profile_id: &ProfileId) -> Vec<&ActiveRule> {
        self.state
            .active_rules
            .values()
            .filter(|ar| &ar.key.profile_id == profile_id)
            .collect()
    }

    pub fn active_rules(&self) -> impl Iterator<Item = &ActiveRule> {
        self.state.active_rules.values()
    }

    pub fn default_profile(&self, language: &str) -> Option<&ProfileId> {
        self.state.defaults.get(language)
    }

    /// Number of transactions committed so far.
    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl ProfileStore for MemoryStore {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn begin(&mut self) -> Result<Self::Transaction<'_>, StoreError> {
        Ok(MemoryTransaction {
            working: self.state.clone(),
            store: self,
        })
    }
}

/// A copy-on-begin transaction over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction<'a> {
    store: &'a mut MemoryStore,
    working: State,
}

impl MemoryTransaction<'_> {
    fn require_profile(&self, id: &ProfileId) -> Result<(), StoreError> {
        if self.working.profiles.contains_key(id) {
            Ok(())
        } else {
            Err(StoreError(format!("unknown profile {id}")))
        }
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn profile(&self, id: &ProfileId) -> Result<Option<Profile>, StoreError> {
        Ok(self.working.profiles.get(id).cloned())
    }

    fn profiles_by_language(&self, language: &str) -> Result<Vec<Profile>, StoreError> {
        let mut profiles: Vec<Profile> = self
            .working
            .profiles
            .values()
            .filter(|p| p.language == language)
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(profiles)
    }

    fn load_profile_subtree(&self, root: &ProfileId) -> Result<Vec<Profile>, StoreError> {
        let mut subtree = Vec::new();
        let mut pending = vec![root.clone()];
        let mut seen = BTreeSet::new();
        while let Some(id) = pending.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(profile) = self.working.profiles.get(&id) {
                subtree.push(profile.clone());
            }
            pending.extend(
                self.working
                    .profiles
                    .values()
                    .filter(|p| p.parent_id.as_ref() == Some(&id))
                    .map(|p| p.id.clone()),
            );
        }
        Ok(subtree)
    }

    fn insert_profile(&mut self, profile: &Profile) -> Result<(), StoreError> {
        if self.working.profiles.contains_key(&profile.id) {
            return Err(StoreError(format!("duplicate profile id {}", profile.id)));
        }
        self.working
            .profiles
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    fn update_profile(&mut self, profile: &Profile) -> Result<(), StoreError> {
        self.require_profile(&profile.id)?;
        self.working
            .profiles
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    fn delete_profile(&mut self, id: &ProfileId) -> Result<(), StoreError> {
        self.require_profile(id)?;
        self.working.profiles.remove(id);
        self.working
            .active_rules
            .retain(|key, _| &key.profile_id != id);
        self.working.defaults.retain(|_, default| default != id);
        Ok(())
    }

    fn update_profile_timestamp(&mut self, id: &ProfileId, at: u64) -> Result<(), StoreError> {
        match self.working.profiles.get_mut(id) {
            Some(profile) => {
                profile.rules_updated_at = Some(at);
                Ok(())
            }
            None => Err(StoreError(format!("unknown profile {id}"))),
        }
    }

    fn load_active_rules(
        &self,
        profile_ids: &[ProfileId],
        rule_ids: &[RuleId],
    ) -> Result<Vec<ActiveRule>, StoreError> {
        let mut rows = Vec::new();
        for profile_id in profile_ids {
            for rule_id in rule_ids {
                let key = ActiveRuleKey::new(profile_id.clone(), rule_id.clone());
                if let Some(row) = self.working.active_rules.get(&key) {
                    rows.push(row.clone());
                }
            }
        }
        Ok(rows)
    }

    fn active_rules_of_profile(&self, id: &ProfileId) -> Result<Vec<ActiveRule>, StoreError> {
        Ok(self
            .working
            .active_rules
            .values()
            .filter(|ar| &ar.key.profile_id == id)
            .cloned()
            .collect())
    }

    fn active_rules_of_rule(&self, rule_id: &RuleId) -> Result<Vec<ActiveRule>, StoreError> {
        Ok(self
            .working
            .active_rules
            .values()
            .filter(|ar| &ar.key.rule_id == rule_id)
            .cloned()
            .collect())
    }

    fn insert_active_rule(&mut self, rule: &ActiveRule) -> Result<(), StoreError> {
        self.require_profile(&rule.key.profile_id)?;
        if self.working.active_rules.contains_key(&rule.key) {
            return Err(StoreError(format!("duplicate active rule {}", rule.key)));
        }
        self.working
            .active_rules
            .insert(rule.key.clone(), rule.clone());
        Ok(())
    }

    fn update_active_rule(&mut self, rule: &ActiveRule) -> Result<(), StoreError> {
        match self.working.active_rules.get_mut(&rule.key) {
            Some(row) => {
                *row = rule.clone();
                Ok(())
            }
            None => Err(StoreError(format!("unknown active rule {}", rule.key))),
        }
    }

    fn delete_active_rule(&mut self, key: &ActiveRuleKey) -> Result<(), StoreError> {
        self.working
            .active_rules
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError(format!("unknown active rule {key}")))
    }

    fn is_builtin_registered(&self, language: &str, name: &str) -> Result<bool, StoreError> {
        Ok(self
            .working
            .registered
            .contains(&(language.to_string(), name.to_string())))
    }

    fn mark_builtin_registered(&mut self, language: &str, name: &str) -> Result<(), StoreError> {
        self.working
            .registered
            .insert((language.to_string(), name.to_string()));
        Ok(())
    }

    fn default_profile(&self, language: &str) -> Result<Option<ProfileId>, StoreError> {
        Ok(self.working.defaults.get(language).cloned())
    }

    fn set_default_profile(
        &mut self,
        language: &str,
        id: Option<&ProfileId>,
    ) -> Result<(), StoreError> {
        match id {
            Some(id) => {
                self.require_profile(id)?;
                self.working
                    .defaults
                    .insert(language.to_string(), id.clone());
            }
            None => {
                self.working.defaults.remove(language);
            }
        }
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        self.store.state = self.working;
        self.store.commits += 1;
        Ok(())
    }
}

/// Indexer that keeps every batch it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingIndexer {
    pub batches: Vec<Vec<ActiveRuleChange>>,
}

impl RecordingIndexer {
    pub fn changes(&self) -> impl Iterator<Item = &ActiveRuleChange> {
        self.batches.iter().flatten()
    }
}

impl ChangeIndexer for RecordingIndexer {
    fn on_changes(&mut self, changes: &[ActiveRuleChange]) {
        self.batches.push(changes.to_vec());
    }
}

/// Clock that returns a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

/// Clock that moves forward by one millisecond on every read.
#[derive(Debug, Default)]
pub struct TickingClock(AtomicU64);

impl TickingClock {
    pub fn starting_at(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }
}

impl Clock for TickingClock {
    fn now(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Inheritance, Severity};

    fn row(profile: &str) -> ActiveRule {
        ActiveRule {
            key: ActiveRuleKey::new(profile, "xoo:x1"),
            severity: Severity::Major,
            prioritized: false,
            inheritance: Inheritance::None,
            params: Default::default(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let mut store = MemoryStore::new();
        store.seed_profile(Profile::new("p", "P", "xoo"));
        {
            let mut tx = store.begin().expect("begin");
            tx.insert_active_rule(&row("p")).expect("insert");
        }
        assert!(store.active_rules().next().is_none());
        assert_eq!(store.commits(), 0);

        let mut tx = store.begin().expect("begin");
        tx.insert_active_rule(&row("p")).expect("insert");
        tx.commit().expect("commit");
        assert_eq!(store.active_rules().count(), 1);
        assert_eq!(store.commits(), 1);
    }

    #[test]
    fn subtree_includes_root_and_all_descendants() {
        let mut store = MemoryStore::new();
        let root = Profile::new("root", "Root", "xoo");
        let mut child = Profile::new("child", "Child", "xoo");
        child.parent_id = Some(root.id.clone());
        let mut grandchild = Profile::new("grandchild", "Grandchild", "xoo");
        grandchild.parent_id = Some(child.id.clone());
        let other = Profile::new("other", "Other", "xoo");
        for p in [root, child, grandchild, other] {
            store.seed_profile(p);
        }

        let tx = store.begin().expect("begin");
        let mut ids: Vec<String> = tx
            .load_profile_subtree(&ProfileId::from("root"))
            .unwrap()
            .into_iter()
            .map(|p| p.id.0)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["child", "grandchild", "root"]);
    }

    #[test]
    fn deleting_a_profile_removes_its_rules_and_default() {
        let mut store = MemoryStore::new();
        store.seed_profile(Profile::new("p", "P", "xoo"));
        store.seed_active_rule(row("p"));
        let mut tx = store.begin().expect("begin");
        tx.set_default_profile("xoo", Some(&ProfileId::from("p"))).unwrap();
        tx.delete_profile(&ProfileId::from("p")).unwrap();
        tx.commit().unwrap();
        assert!(store.active_rules().next().is_none());
        assert!(store.default_profile("xoo").is_none());
    }
}
