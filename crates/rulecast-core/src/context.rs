//! In-memory snapshot of everything an activation touches.
//!
//! [`ActivationSnapshot::load`] reads, in a handful of queries, the rules of a
//! request, the base profile with its parent and descendants, and every
//! active rule joining them. Activation then works on the snapshot through a
//! [`RuleCursor`], one (profile, rule) pair at a time, and writes its own
//! results back so that descendants observe their parent's fresh values.

use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use crate::error::{ActivationError, Result};
use crate::model::{ActiveRule, ActiveRuleKey, Profile, ProfileId, Rule, RuleId};
use crate::store::{RuleCatalog, StoreTransaction};

#[derive(Debug, Clone)]
pub struct ActivationSnapshot {
    base: ProfileId,
    rules: HashMap<RuleId, Rule>,
    profiles: HashMap<ProfileId, Profile>,
    children: HashMap<ProfileId, Vec<ProfileId>>,
    active_rules: HashMap<ActiveRuleKey, ActiveRule>,
}

/// The state of one rule in one profile, detached from the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCursor {
    pub profile: Profile,
    pub rule: Rule,
    /// The active rule of this profile, if any.
    pub current: Option<ActiveRule>,
    /// The active rule of the parent profile, if any.
    pub parent: Option<ActiveRule>,
    /// Direct children of the profile, in a stable order.
    pub children: Vec<ProfileId>,
}

impl ActivationSnapshot {
    /// Load the snapshot for `profile` and the given rules.
    ///
    /// Fails with [`ActivationError::RuleNotFound`] when a rule is unknown to
    /// the catalog.
    pub fn load<T, C>(tx: &T, catalog: &C, profile: &Profile, rule_ids: &[RuleId]) -> Result<Self>
    where
        T: StoreTransaction + ?Sized,
        C: RuleCatalog + ?Sized,
    {
        let unique: BTreeSet<&RuleId> = rule_ids.iter().collect();
        let mut rules = HashMap::with_capacity(unique.len());
        for id in unique {
            let rule = catalog
                .rule(id)?
                .ok_or_else(|| ActivationError::RuleNotFound(id.clone()))?;
            rules.insert(id.clone(), rule);
        }

        let mut profiles: HashMap<ProfileId, Profile> = tx
            .load_profile_subtree(&profile.id)?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        profiles.insert(profile.id.clone(), profile.clone());

        if let Some(parent_id) = &profile.parent_id {
            let parent = tx
                .profile(parent_id)?
                .ok_or_else(|| ActivationError::ProfileNotFound(parent_id.clone()))?;
            profiles.insert(parent.id.clone(), parent);
        }

        let mut children: HashMap<ProfileId, Vec<ProfileId>> = HashMap::new();
        let mut descendants: Vec<&Profile> = profiles
            .values()
            .filter(|p| p.id != profile.id && Some(&p.id) != profile.parent_id.as_ref())
            .collect();
        descendants.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        for child in descendants {
            if let Some(parent_id) = &child.parent_id {
                children
                    .entry(parent_id.clone())
                    .or_default()
                    .push(child.id.clone());
            }
        }

        let profile_ids: Vec<ProfileId> = profiles.keys().cloned().collect();
        let rule_ids: Vec<RuleId> = rules.keys().cloned().collect();
        let active_rules = tx
            .load_active_rules(&profile_ids, &rule_ids)?
            .into_iter()
            .map(|ar| (ar.key.clone(), ar))
            .collect();

        trace!(
            profile = %profile.id,
            profiles = profile_ids.len(),
            rules = rule_ids.len(),
            "loaded activation snapshot"
        );

        Ok(Self {
            base: profile.id.clone(),
            rules,
            profiles,
            children,
            active_rules,
        })
    }

    pub fn base_profile(&self) -> &Profile {
        self.profile(&self.base)
    }

    /// Panics if the profile was not loaded.
    pub fn profile(&self, id: &ProfileId) -> &Profile {
        match self.profiles.get(id) {
            Some(profile) => profile,
            None => panic!("profile {id} is not part of the activation snapshot"),
        }
    }

    /// Panics if the rule was not loaded.
    pub fn rule(&self, id: &RuleId) -> &Rule {
        match self.rules.get(id) {
            Some(rule) => rule,
            None => panic!("rule {id} is not part of the activation snapshot"),
        }
    }

    pub fn active_rule(&self, profile_id: &ProfileId, rule_id: &RuleId) -> Option<&ActiveRule> {
        self.active_rules
            .get(&ActiveRuleKey::new(profile_id.clone(), rule_id.clone()))
    }

    pub fn children(&self, id: &ProfileId) -> &[ProfileId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Position the cursor on `rule_id` in `profile_id`.
    pub fn bind(&self, profile_id: &ProfileId, rule_id: &RuleId) -> RuleCursor {
        bind(self, profile_id, rule_id)
    }

    pub(crate) fn record(&mut self, active_rule: ActiveRule) {
        self.active_rules.insert(active_rule.key.clone(), active_rule);
    }

    pub(crate) fn forget(&mut self, key: &ActiveRuleKey) {
        self.active_rules.remove(key);
    }
}

/// Resolve the cursor for one (profile, rule) pair of a loaded snapshot.
///
/// This is a pure function of the snapshot. It panics if either the profile
/// or the rule was not loaded, as that can only be an engine bug.
pub fn bind(snapshot: &ActivationSnapshot, profile_id: &ProfileId, rule_id: &RuleId) -> RuleCursor {
    let profile = snapshot.profile(profile_id).clone();
    let rule = snapshot.rule(rule_id).clone();
    let current = snapshot.active_rule(profile_id, rule_id).cloned();
    let parent = profile
        .parent_id
        .as_ref()
        .and_then(|parent_id| snapshot.active_rule(parent_id, rule_id))
        .cloned();
    let children = snapshot.children(profile_id).to_vec();
    RuleCursor {
        profile,
        rule,
        current,
        parent,
        children,
    }
}
