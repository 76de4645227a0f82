//! Single-rule activation and deactivation with propagation to descendants.
//!
//! Both operations walk the profile tree breadth-first from the base
//! profile. For each node the decision is computed by pure functions of the
//! [`RuleCursor`], then persisted and written back to the snapshot, so a
//! child always resolves against the values its parent just received.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, trace};

use crate::activation::RuleActivation;
use crate::change::{ActiveRuleChange, ChangeType};
use crate::context::{ActivationSnapshot, RuleCursor};
use crate::error::{ActivationError, Result};
use crate::model::{ActiveRule, ActiveRuleKey, Inheritance, ProfileId, RuleId, RuleStatus, Severity};
use crate::settings::EngineSettings;
use crate::store::{Clock, StoreTransaction};

/// Applies activation requests to a snapshot and a store transaction.
#[derive(Clone, Copy)]
pub struct RuleActivator<'a> {
    clock: &'a dyn Clock,
    settings: &'a EngineSettings,
}

/// Resolved values of an active rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleValues {
    pub severity: Severity,
    pub prioritized: bool,
    pub params: BTreeMap<String, String>,
}

impl RuleValues {
    fn of(active_rule: &ActiveRule) -> Self {
        Self {
            severity: active_rule.severity,
            prioritized: active_rule.prioritized,
            params: active_rule.params.clone(),
        }
    }

    /// Whether these values equal the parent's. Parameters the parent has
    /// but these values lack are not compared.
    pub fn same_as(&self, parent: Option<&ActiveRule>) -> bool {
        parent.is_some_and(|parent| {
            parent.severity == self.severity
                && parent.prioritized == self.prioritized
                && self
                    .params
                    .iter()
                    .all(|(name, value)| parent.param(name) == Some(value.as_str()))
        })
    }
}

/// What to do at one node of the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub change: Option<ActiveRuleChange>,
    /// Whether the request continues to the node's children.
    pub propagate: bool,
}

impl Decision {
    fn halt() -> Self {
        Self {
            change: None,
            propagate: false,
        }
    }
}

impl<'a> RuleActivator<'a> {
    pub fn new(clock: &'a dyn Clock, settings: &'a EngineSettings) -> Self {
        Self { clock, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        self.settings
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Activate a rule on the snapshot's base profile and propagate it to
    /// every descendant.
    ///
    /// Returns the ledger in breadth-first order, starting with the base
    /// profile's own change when it has one.
    pub fn activate<T>(
        &self,
        tx: &mut T,
        snapshot: &mut ActivationSnapshot,
        activation: &RuleActivation,
    ) -> Result<Vec<ActiveRuleChange>>
    where
        T: StoreTransaction + ?Sized,
    {
        let rule_id = activation.rule_id().clone();
        let mut changes = Vec::new();
        let mut touched = BTreeSet::new();
        let mut queue = VecDeque::from([(snapshot.base_profile().id.clone(), activation.clone())]);

        while let Some((profile_id, request)) = queue.pop_front() {
            let cursor = snapshot.bind(&profile_id, &rule_id);
            check_activable(&cursor)?;
            let decision = decide_activation(&cursor, &request)?;

            if let Some(change) = decision.change {
                trace!(%change, "activation step");
                self.persist(tx, snapshot, &cursor, &change)?;
                touched.insert(profile_id.clone());
                changes.push(change);
            }
            if decision.propagate {
                for child in cursor.children {
                    queue.push_back((child, request.as_cascade()));
                }
            }
        }

        self.touch(tx, touched)?;
        debug!(rule = %rule_id, changes = changes.len(), "activated rule");
        Ok(changes)
    }

    /// Deactivate a rule on the snapshot's base profile and every descendant
    /// that has it.
    ///
    /// Without `force`, an inherited row is rejected unless the settings
    /// allow it. A missing row yields an empty ledger.
    pub fn deactivate<T>(
        &self,
        tx: &mut T,
        snapshot: &mut ActivationSnapshot,
        rule_id: &RuleId,
        force: bool,
    ) -> Result<Vec<ActiveRuleChange>>
    where
        T: StoreTransaction + ?Sized,
    {
        let mut changes = Vec::new();
        let mut touched = BTreeSet::new();
        let mut queue = VecDeque::from([(snapshot.base_profile().id.clone(), false)]);

        while let Some((profile_id, cascading)) = queue.pop_front() {
            let cursor = snapshot.bind(&profile_id, rule_id);
            let Some(current) = &cursor.current else {
                continue;
            };
            if !force
                && !cascading
                && current.is_inherited()
                && !self.settings.allow_deactivate_inherited
            {
                return Err(ActivationError::InheritedRule(rule_id.clone()));
            }

            let change = ActiveRuleChange::deactivated(current);
            self.persist(tx, snapshot, &cursor, &change)?;
            touched.insert(profile_id);
            changes.push(change);

            for child in cursor.children {
                queue.push_back((child, true));
            }
        }

        self.touch(tx, touched)?;
        debug!(rule = %rule_id, changes = changes.len(), "deactivated rule");
        Ok(changes)
    }

    /// Clear the inheritance tag of an overriding row whose profile lost its
    /// parent.
    pub fn detach<T>(
        &self,
        tx: &mut T,
        snapshot: &mut ActivationSnapshot,
        rule_id: &RuleId,
    ) -> Result<Option<ActiveRuleChange>>
    where
        T: StoreTransaction + ?Sized,
    {
        let base = snapshot.base_profile().id.clone();
        let cursor = snapshot.bind(&base, rule_id);
        let Some(current) = &cursor.current else {
            return Ok(None);
        };
        if current.inheritance == Inheritance::None {
            return Ok(None);
        }

        let change = change_from(ChangeType::Updated, &cursor, RuleValues::of(current), Inheritance::None);
        self.persist(tx, snapshot, &cursor, &change)?;
        self.touch(tx, [base])?;
        Ok(Some(change))
    }

    fn persist<T>(
        &self,
        tx: &mut T,
        snapshot: &mut ActivationSnapshot,
        cursor: &RuleCursor,
        change: &ActiveRuleChange,
    ) -> Result<()>
    where
        T: StoreTransaction + ?Sized,
    {
        let now = self.clock.now();
        match (change.change_type, &cursor.current) {
            (ChangeType::Activated, _) => {
                let row = ActiveRule {
                    key: change.key.clone(),
                    severity: change.severity,
                    prioritized: change.prioritized,
                    inheritance: change.inheritance,
                    params: change.params.clone(),
                    created_at: now,
                    updated_at: now,
                };
                tx.insert_active_rule(&row)?;
                snapshot.record(row);
            }
            (ChangeType::Updated, Some(current)) => {
                let row = ActiveRule {
                    severity: change.severity,
                    prioritized: change.prioritized,
                    inheritance: change.inheritance,
                    params: change.params.clone(),
                    updated_at: now,
                    ..current.clone()
                };
                tx.update_active_rule(&row)?;
                snapshot.record(row);
            }
            (ChangeType::Deactivated, Some(_)) => {
                tx.delete_active_rule(&change.key)?;
                snapshot.forget(&change.key);
            }
            (change_type, None) => {
                panic!("{change_type} change for {} without a stored active rule", change.key)
            }
        }
        Ok(())
    }

    fn touch<T>(&self, tx: &mut T, profiles: impl IntoIterator<Item = ProfileId>) -> Result<()>
    where
        T: StoreTransaction + ?Sized,
    {
        let now = self.clock.now();
        for profile in profiles {
            tx.update_profile_timestamp(&profile, now)?;
        }
        Ok(())
    }
}

/// Reject rules that can never be active in this profile.
pub fn check_activable(cursor: &RuleCursor) -> Result<()> {
    let rule = &cursor.rule;
    if rule.status == RuleStatus::Removed {
        return Err(ActivationError::RuleRemoved(rule.id.clone()));
    }
    if rule.is_template {
        return Err(ActivationError::RuleIsTemplate(rule.id.clone()));
    }
    if rule.language != cursor.profile.language {
        return Err(ActivationError::LanguageMismatch {
            rule: rule.id.clone(),
            rule_language: rule.language.clone(),
            profile: cursor.profile.name.clone(),
            profile_language: cursor.profile.language.clone(),
        });
    }
    Ok(())
}

/// Decide the change, if any, a request makes at the cursor's node.
pub fn decide_activation(cursor: &RuleCursor, request: &RuleActivation) -> Result<Decision> {
    let cascading = request.is_cascade();

    let Some(current) = &cursor.current else {
        if request.is_reset() {
            return Ok(Decision::halt());
        }
        let values = resolve_values(cursor, request)?;
        let inheritance = if cascading || values.same_as(cursor.parent.as_ref()) {
            Inheritance::Inherited
        } else {
            Inheritance::None
        };
        return Ok(Decision {
            change: Some(change_from(ChangeType::Activated, cursor, values, inheritance)),
            propagate: true,
        });
    };

    if cascading {
        match current.inheritance {
            Inheritance::Overrides => return Ok(Decision::halt()),
            // A profile that activated the rule on its own now receives it
            // from its parent as well: keep its values, mark the divergence.
            Inheritance::None => {
                return Ok(Decision {
                    change: Some(change_from(
                        ChangeType::Updated,
                        cursor,
                        RuleValues::of(current),
                        Inheritance::Overrides,
                    )),
                    propagate: false,
                });
            }
            Inheritance::Inherited => {}
        }
    }

    let values = resolve_values(cursor, request)?;
    let inheritance = match &cursor.parent {
        Some(parent) if !cascading => {
            if values.same_as(Some(parent)) {
                Inheritance::Inherited
            } else {
                Inheritance::Overrides
            }
        }
        _ => current.inheritance,
    };

    let change = (values != RuleValues::of(current) || inheritance != current.inheritance)
        .then(|| change_from(ChangeType::Updated, cursor, values, inheritance));
    Ok(Decision {
        change,
        propagate: true,
    })
}

/// Resolve severity, prioritized flag, and parameter values for a request.
pub fn resolve_values(cursor: &RuleCursor, request: &RuleActivation) -> Result<RuleValues> {
    let rule = &cursor.rule;
    let parent = cursor.parent.as_ref();
    let current = cursor.current.as_ref();
    // Custom rules carry their parameters from the template instance.
    let custom = rule.is_custom();
    let requested = |name: &str| if custom { None } else { request.param(name) };
    let names = |name: &str| !custom && request.has_param(name);

    let mut values = if request.is_reset() {
        RuleValues {
            severity: parent.map_or(rule.default_severity, |p| p.severity),
            prioritized: parent.is_some_and(|p| p.prioritized),
            params: BTreeMap::new(),
        }
    } else if cursor.profile.is_built_in {
        RuleValues {
            severity: request.severity().unwrap_or(rule.default_severity),
            prioritized: request.prioritized().unwrap_or(false),
            params: BTreeMap::new(),
        }
    } else {
        // Stored values count as the profile's own unless they were inherited.
        let own = current.filter(|ar| !ar.is_inherited());
        RuleValues {
            severity: request
                .severity()
                .or(own.map(|ar| ar.severity))
                .or(parent.map(|p| p.severity))
                .or(current.map(|ar| ar.severity))
                .unwrap_or(rule.default_severity),
            prioritized: request
                .prioritized()
                .or(own.map(|ar| ar.prioritized))
                .or(parent.map(|p| p.prioritized))
                .or(current.map(|ar| ar.prioritized))
                .unwrap_or(false),
            params: BTreeMap::new(),
        }
    };

    for param in &rule.params {
        let name = param.name.as_str();
        let default = param.default_value.as_deref().filter(|v| !v.is_empty());
        let value = if request.is_reset() {
            parent.and_then(|p| p.param(name)).or(default)
        } else if cursor.profile.is_built_in {
            requested(name).or(default)
        } else if names(name) {
            requested(name)
                .or(parent.and_then(|p| p.param(name)))
                .or(default)
        } else {
            let own = current.filter(|ar| !ar.is_inherited());
            own.and_then(|ar| ar.param(name))
                .or(parent.and_then(|p| p.param(name)))
                .or(current.and_then(|ar| ar.param(name)))
                .or(default)
        };

        if let Some(value) = value {
            param
                .param_type
                .validate(value, param.multiple)
                .map_err(ActivationError::InvalidParam)?;
            values.params.insert(param.name.clone(), value.to_string());
        }
    }
    Ok(values)
}

fn change_from(
    change_type: ChangeType,
    cursor: &RuleCursor,
    values: RuleValues,
    inheritance: Inheritance,
) -> ActiveRuleChange {
    ActiveRuleChange {
        change_type,
        key: ActiveRuleKey::new(cursor.profile.id.clone(), cursor.rule.id.clone()),
        severity: values.severity,
        prioritized: values.prioritized,
        inheritance,
        params: values.params,
    }
}
