//! Profile tree maintenance: attaching, detaching, and deleting profiles.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::activation::RuleActivation;
use crate::change::ActiveRuleChange;
use crate::context::ActivationSnapshot;
use crate::engine::Session;
use crate::error::{ActivationError, Result, StoreError};
use crate::model::{Inheritance, Profile, ProfileId, RuleId};
use crate::store::{RuleCatalog, StoreTransaction};

/// Ids of the ancestors of `profile`, nearest first.
///
/// A parent chain that loops back on itself is reported as a store error.
pub fn ancestors<T>(tx: &T, profile: &Profile) -> Result<Vec<ProfileId>>
where
    T: StoreTransaction + ?Sized,
{
    let mut seen = HashSet::from([profile.id.clone()]);
    let mut chain = Vec::new();
    let mut next = profile.parent_id.clone();
    while let Some(parent_id) = next {
        if !seen.insert(parent_id.clone()) {
            return Err(StoreError::new(format!(
                "profile hierarchy above {} contains a cycle through {parent_id}",
                profile.id
            ))
            .into());
        }
        next = tx
            .profile(&parent_id)?
            .ok_or_else(|| ActivationError::ProfileNotFound(parent_id.clone()))?
            .parent_id;
        chain.push(parent_id);
    }
    Ok(chain)
}

/// Whether `candidate` is `profile` itself or one of its descendants.
pub fn is_self_or_descendant<T>(tx: &T, profile: &ProfileId, candidate: &Profile) -> Result<bool>
where
    T: StoreTransaction + ?Sized,
{
    Ok(&candidate.id == profile || ancestors(tx, candidate)?.contains(profile))
}

/// Attach `profile` to `parent` and replay the parent's active rules on it.
///
/// Rules of the old parent are released first, as by [`remove_parent`].
/// Replay failures on individual rules are logged and skipped.
pub fn set_parent<C, T>(
    session: &Session<'_, C>,
    tx: &mut T,
    profile: &Profile,
    parent: &Profile,
) -> Result<Vec<ActiveRuleChange>>
where
    C: RuleCatalog + ?Sized,
    T: StoreTransaction + ?Sized,
{
    if profile.language != parent.language {
        return Err(ActivationError::ParentLanguageMismatch {
            profile: profile.name.clone(),
            profile_language: profile.language.clone(),
            parent: parent.name.clone(),
            parent_language: parent.language.clone(),
        });
    }
    if is_self_or_descendant(&*tx, &profile.id, parent)? {
        return Err(ActivationError::CyclicParent {
            profile: profile.name.clone(),
            parent: parent.name.clone(),
        });
    }
    if profile.parent_id.as_ref() == Some(&parent.id) {
        return Ok(Vec::new());
    }

    let mut changes = remove_parent(session, tx, profile)?;

    let mut attached = tx
        .profile(&profile.id)?
        .ok_or_else(|| ActivationError::ProfileNotFound(profile.id.clone()))?;
    attached.parent_id = Some(parent.id.clone());
    tx.update_profile(&attached)?;
    info!(profile = %attached.name, parent = %parent.name, "set parent profile");

    let mut rule_ids = Vec::new();
    for row in tx.active_rules_of_profile(&parent.id)? {
        if session.catalog.rule(&row.key.rule_id)?.is_some() {
            rule_ids.push(row.key.rule_id);
        } else {
            warn!(rule = %row.key.rule_id, "parent rule is missing from the catalog, skipping");
        }
    }

    let mut snapshot = ActivationSnapshot::load(&*tx, session.catalog, &attached, &rule_ids)?;
    for rule_id in rule_ids {
        match session
            .activator
            .activate(tx, &mut snapshot, &RuleActivation::new(rule_id.clone()))
        {
            Ok(replayed) => changes.extend(replayed),
            Err(err) if err.is_validation() => {
                warn!(rule = %rule_id, profile = %attached.name, "cannot inherit rule: {err}");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(changes)
}

/// Detach `profile` from its parent.
///
/// Inherited rules are deactivated (descendants included) and overriding
/// rules become the profile's own. A profile without a parent is left as is.
pub fn remove_parent<C, T>(
    session: &Session<'_, C>,
    tx: &mut T,
    profile: &Profile,
) -> Result<Vec<ActiveRuleChange>>
where
    C: RuleCatalog + ?Sized,
    T: StoreTransaction + ?Sized,
{
    let Some(old_parent) = &profile.parent_id else {
        return Ok(Vec::new());
    };

    let mut detached = profile.clone();
    detached.parent_id = None;
    tx.update_profile(&detached)?;
    debug!(profile = %detached.name, parent = %old_parent, "removed parent profile");

    let mut rows = tx.active_rules_of_profile(&detached.id)?;
    rows.retain(|row| row.inheritance != Inheritance::None);
    rows.sort_by(|a, b| a.key.rule_id.cmp(&b.key.rule_id));
    let rule_ids: Vec<RuleId> = rows.iter().map(|row| row.key.rule_id.clone()).collect();

    let mut snapshot = ActivationSnapshot::load(&*tx, session.catalog, &detached, &rule_ids)?;
    let mut changes = Vec::new();
    for row in rows {
        if row.is_inherited() {
            changes.extend(session.activator.deactivate(
                tx,
                &mut snapshot,
                &row.key.rule_id,
                true,
            )?);
        } else if row.is_overriding() {
            changes.extend(session.activator.detach(tx, &mut snapshot, &row.key.rule_id)?);
        }
    }
    Ok(changes)
}

/// Delete a profile and all of its descendants, leaves first.
///
/// Returns the deactivation of every active rule the deleted profiles had.
pub fn delete_profile<T>(tx: &mut T, profile: &Profile) -> Result<Vec<ActiveRuleChange>>
where
    T: StoreTransaction + ?Sized,
{
    let subtree = tx.load_profile_subtree(&profile.id)?;
    let mut ordered = Vec::with_capacity(subtree.len());
    for p in &subtree {
        ordered.push((ancestors(&*tx, p)?.len(), p));
    }
    ordered.sort_by(|(da, a), (db, b)| db.cmp(da).then_with(|| a.id.cmp(&b.id)));

    let mut changes = Vec::new();
    for (_, doomed) in ordered {
        for row in tx.active_rules_of_profile(&doomed.id)? {
            tx.delete_active_rule(&row.key)?;
            changes.push(ActiveRuleChange::deactivated(&row));
        }
        if tx.default_profile(&doomed.language)?.as_ref() == Some(&doomed.id) {
            tx.set_default_profile(&doomed.language, None)?;
        }
        tx.delete_profile(&doomed.id)?;
        info!(profile = %doomed.name, language = %doomed.language, "deleted profile");
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::ProfileStore;

    #[test]
    fn detects_self_and_descendants() {
        let mut store = MemoryStore::new();
        let root = Profile::new("root", "Root", "xoo");
        let mut child = Profile::new("child", "Child", "xoo");
        child.parent_id = Some(root.id.clone());
        let other = Profile::new("other", "Other", "xoo");
        for p in [root.clone(), child.clone(), other.clone()] {
            store.seed_profile(p);
        }
        let tx = store.begin().expect("begin");

        assert!(is_self_or_descendant(&tx, &root.id, &root).unwrap());
        assert!(is_self_or_descendant(&tx, &root.id, &child).unwrap());
        assert!(!is_self_or_descendant(&tx, &child.id, &root).unwrap());
        assert!(!is_self_or_descendant(&tx, &root.id, &other).unwrap());
    }

    #[test]
    fn ancestors_are_listed_nearest_first() {
        let mut store = MemoryStore::new();
        let root = Profile::new("root", "Root", "xoo");
        let mut child = Profile::new("child", "Child", "xoo");
        child.parent_id = Some(root.id.clone());
        let mut grandchild = Profile::new("grandchild", "Grandchild", "xoo");
        grandchild.parent_id = Some(child.id.clone());
        for p in [root.clone(), child.clone(), grandchild.clone()] {
            store.seed_profile(p);
        }
        let tx = store.begin().expect("begin");

        assert!(ancestors(&tx, &root).unwrap().is_empty());
        assert_eq!(ancestors(&tx, &grandchild).unwrap(), vec![child.id, root.id]);
    }

    #[test]
    fn looping_parent_chain_is_a_store_error() {
        let mut store = MemoryStore::new();
        let mut a = Profile::new("a", "A", "xoo");
        a.parent_id = Some(ProfileId::from("b"));
        let mut b = Profile::new("b", "B", "xoo");
        b.parent_id = Some(ProfileId::from("a"));
        let mut c = Profile::new("c", "C", "xoo");
        c.parent_id = Some(ProfileId::from("a"));
        for p in [a.clone(), b, c.clone()] {
            store.seed_profile(p);
        }
        let tx = store.begin().expect("begin");

        let err = ancestors(&tx, &c).unwrap_err();
        assert!(matches!(err, ActivationError::Store(_)));
        assert!(!err.is_validation());
        assert!(is_self_or_descendant(&tx, &ProfileId::from("x"), &a).is_err());
    }
}
