//! Propagation of activations and deactivations through profile trees.

mod common;

use common::*;
use rulecast_core::{ActiveRuleKey, ChangeType, Inheritance, RuleActivation, Severity};

// ============================================================================
// Activation cascade
// ============================================================================

/// The walk-through: activate on the root, override in the middle, then cut
/// the middle profile loose.
#[test]
fn root_child_grandchild_scenario() {
    let mut engine = engine();
    let (root, kid, grandchild) = chain(&mut engine);

    let changes = engine.activate(&root, &RuleActivation::new(X1)).unwrap();
    assert_eq!(changes.len(), 3);
    assert!(changes.iter().all(|c| c.is(ChangeType::Activated)));
    assert_eq!(changes[0].key.profile_id, root);
    assert_eq!(changes[1].key.profile_id, kid);
    assert_eq!(changes[2].key.profile_id, grandchild);
    assert_active(&engine, &root, X1, Severity::Major, Inheritance::None);
    assert_active(&engine, &kid, X1, Severity::Major, Inheritance::Inherited);
    assert_active(&engine, &grandchild, X1, Severity::Major, Inheritance::Inherited);

    let changes = engine
        .activate(&kid, &RuleActivation::new(X1).with_severity(Severity::Blocker))
        .unwrap();
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(|c| c.is(ChangeType::Updated)));
    assert!(changes.iter().all(|c| c.key.profile_id != root));
    assert_active(&engine, &root, X1, Severity::Major, Inheritance::None);
    assert_active(&engine, &kid, X1, Severity::Blocker, Inheritance::Overrides);
    assert_active(&engine, &grandchild, X1, Severity::Blocker, Inheritance::Inherited);
    assert_inheritance_consistent(&engine);

    let changes = engine.remove_parent(&kid).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].change_type, ChangeType::Updated);
    assert_eq!(changes[0].key.profile_id, kid);
    assert_eq!(changes[0].inheritance, Inheritance::None);
    assert_active(&engine, &kid, X1, Severity::Blocker, Inheritance::None);
    assert_active(&engine, &grandchild, X1, Severity::Blocker, Inheritance::Inherited);
    assert!(engine.store().profile(&kid).unwrap().parent_id.is_none());
    assert_inheritance_consistent(&engine);
}

/// Parameters flow down with the severity.
#[test]
fn cascade_carries_parameters() {
    let mut engine = engine();
    let (root, kid, grandchild) = chain(&mut engine);

    engine
        .activate(&root, &RuleActivation::new(X1).with_param("max", "3"))
        .unwrap();

    for profile in [&root, &kid, &grandchild] {
        assert_eq!(active(&engine, profile, X1).unwrap().param("max"), Some("3"));
    }

    engine
        .activate(&root, &RuleActivation::new(X1).with_param("max", "5"))
        .unwrap();

    for profile in [&kid, &grandchild] {
        assert_eq!(active(&engine, profile, X1).unwrap().param("max"), Some("5"));
    }
    assert_inheritance_consistent(&engine);
}

/// An ancestor's change never touches a profile that overrides the rule, nor
/// anything below it.
#[test]
fn override_isolates_the_subtree() {
    let mut engine = engine();
    let (root, kid, grandchild) = chain(&mut engine);
    engine.activate(&root, &RuleActivation::new(X1)).unwrap();
    engine
        .activate(
            &kid,
            &RuleActivation::new(X1)
                .with_severity(Severity::Blocker)
                .with_param("max", "1"),
        )
        .unwrap();
    let kid_before = active(&engine, &kid, X1).unwrap();
    let grandchild_before = active(&engine, &grandchild, X1).unwrap();

    let changes = engine
        .activate(
            &root,
            &RuleActivation::new(X1)
                .with_severity(Severity::Critical)
                .with_param("max", "99"),
        )
        .unwrap();

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].key.profile_id, root);
    assert_eq!(active(&engine, &kid, X1).unwrap(), kid_before);
    assert_eq!(active(&engine, &grandchild, X1).unwrap(), grandchild_before);
    assert_inheritance_consistent(&engine);
}

/// A profile that activated a rule on its own is marked as overriding when
/// an ancestor activates the same rule, and keeps its values.
#[test]
fn own_activation_becomes_override_on_cascade() {
    let mut engine = engine();
    let (root, kid, grandchild) = chain(&mut engine);
    engine
        .activate(&kid, &RuleActivation::new(X2).with_severity(Severity::Critical))
        .unwrap();
    assert_active(&engine, &kid, X2, Severity::Critical, Inheritance::None);
    assert_active(&engine, &grandchild, X2, Severity::Critical, Inheritance::Inherited);

    let changes = engine.activate(&root, &RuleActivation::new(X2)).unwrap();

    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].change_type, ChangeType::Activated);
    assert_eq!(changes[1].change_type, ChangeType::Updated);
    assert_eq!(changes[1].key.profile_id, kid);
    assert_active(&engine, &root, X2, Severity::Minor, Inheritance::None);
    assert_active(&engine, &kid, X2, Severity::Critical, Inheritance::Overrides);
    assert_active(&engine, &grandchild, X2, Severity::Critical, Inheritance::Inherited);
}

/// Reset brings an overriding profile back in line with its parent, and the
/// descendants follow.
#[test]
fn reset_restores_parent_values() {
    let mut engine = engine();
    let (root, kid, grandchild) = chain(&mut engine);
    engine
        .activate(&root, &RuleActivation::new(X1).with_severity(Severity::Critical))
        .unwrap();
    engine
        .activate(
            &kid,
            &RuleActivation::new(X1)
                .with_severity(Severity::Info)
                .with_param("max", "2"),
        )
        .unwrap();

    let changes = engine.reset(&ActiveRuleKey::new(kid.clone(), rule(X1))).unwrap();

    assert_eq!(changes.len(), 2);
    let row = assert_active(&engine, &kid, X1, Severity::Critical, Inheritance::Inherited);
    assert_eq!(row.param("max"), Some("10"));
    assert_active(&engine, &grandchild, X1, Severity::Critical, Inheritance::Inherited);
    assert_inheritance_consistent(&engine);
}

/// Reset on a parent leaves overriding descendants alone.
#[test]
fn reset_does_not_reach_overriding_descendants() {
    let mut engine = engine();
    let (root, kid, grandchild) = chain(&mut engine);
    engine.activate(&root, &RuleActivation::new(X1)).unwrap();
    engine
        .activate(&kid, &RuleActivation::new(X1).with_severity(Severity::Critical))
        .unwrap();
    engine
        .activate(&grandchild, &RuleActivation::new(X1).with_severity(Severity::Info))
        .unwrap();

    engine.reset(&ActiveRuleKey::new(kid.clone(), rule(X1))).unwrap();

    assert_active(&engine, &kid, X1, Severity::Major, Inheritance::Inherited);
    assert_active(&engine, &grandchild, X1, Severity::Info, Inheritance::Overrides);
}

/// Activating a rule the child lacks, with values that differ from the
/// parent, gives an untagged row.
#[test]
fn diverging_new_activation_on_child_is_untagged() {
    let mut engine = engine();
    let parent = profile(&mut engine, "Parent");
    let kid = child(&mut engine, "Kid", &parent);
    engine.activate(&parent, &RuleActivation::new(X1)).unwrap();
    engine
        .activate(&kid, &RuleActivation::new(X1).with_severity(Severity::Blocker))
        .unwrap();
    engine
        .deactivate(&ActiveRuleKey::new(kid.clone(), rule(X1)), false)
        .unwrap();

    let changes = engine
        .activate(&kid, &RuleActivation::new(X1).with_severity(Severity::Critical))
        .unwrap();

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].change_type, ChangeType::Activated);
    assert_eq!(changes[0].inheritance, Inheritance::None);
    assert_active(&engine, &kid, X1, Severity::Critical, Inheritance::None);

    // Detaching has nothing to release
    assert!(engine.remove_parent(&kid).unwrap().is_empty());
    assert_active(&engine, &kid, X1, Severity::Critical, Inheritance::None);
}

/// An untagged row on a child is marked as overriding by the next ancestor
/// change, keeping its own values.
#[test]
fn ancestor_change_tags_untagged_child_row() {
    let mut engine = engine();
    let parent = profile(&mut engine, "Parent");
    let kid = child(&mut engine, "Kid", &parent);
    engine.activate(&parent, &RuleActivation::new(X1)).unwrap();
    engine
        .activate(&kid, &RuleActivation::new(X1).with_severity(Severity::Blocker))
        .unwrap();
    engine
        .deactivate(&ActiveRuleKey::new(kid.clone(), rule(X1)), false)
        .unwrap();
    engine
        .activate(&kid, &RuleActivation::new(X1).with_severity(Severity::Critical))
        .unwrap();

    let changes = engine
        .activate(&parent, &RuleActivation::new(X1).with_severity(Severity::Info))
        .unwrap();

    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(|c| c.is(ChangeType::Updated)));
    assert_eq!(changes[1].key.profile_id, kid);
    assert_eq!(changes[1].inheritance, Inheritance::Overrides);
    assert_active(&engine, &kid, X1, Severity::Critical, Inheritance::Overrides);
    assert_inheritance_consistent(&engine);
}

/// Siblings are visited in name order after their parent.
#[test]
fn ledger_is_breadth_first() {
    let mut engine = engine();
    let root = profile(&mut engine, "Root");
    let b = child(&mut engine, "B", &root);
    let a = child(&mut engine, "A", &root);
    let a1 = child(&mut engine, "A1", &a);

    let changes = engine.activate(&root, &RuleActivation::new(X3)).unwrap();

    let order: Vec<_> = changes.iter().map(|c| c.key.profile_id.clone()).collect();
    assert_eq!(order, vec![root, a, b, a1]);
}

// ============================================================================
// Deactivation cascade
// ============================================================================

/// Deactivation on an ancestor removes the rule from every descendant,
/// overriding ones included.
#[test]
fn deactivation_cascades_through_overrides() {
    let mut engine = engine();
    let (root, kid, grandchild) = chain(&mut engine);
    engine.activate(&root, &RuleActivation::new(X1)).unwrap();
    engine
        .activate(&kid, &RuleActivation::new(X1).with_severity(Severity::Blocker))
        .unwrap();

    let changes = engine
        .deactivate(&ActiveRuleKey::new(root.clone(), rule(X1)), false)
        .unwrap();

    assert_eq!(changes.len(), 3);
    assert!(changes.iter().all(|c| c.is(ChangeType::Deactivated)));
    assert_inactive(&engine, &root, X1);
    assert_inactive(&engine, &kid, X1);
    assert_inactive(&engine, &grandchild, X1);
}

/// Activation stops at an override while deactivation goes through it.
#[test]
fn overrides_stop_activation_but_not_deactivation() {
    let mut engine = engine();
    let (root, kid, grandchild) = chain(&mut engine);
    engine.activate(&root, &RuleActivation::new(X1)).unwrap();
    engine
        .activate(&kid, &RuleActivation::new(X1).with_severity(Severity::Blocker))
        .unwrap();

    let changes = engine
        .activate(&root, &RuleActivation::new(X1).with_severity(Severity::Info))
        .unwrap();
    assert_eq!(changes.len(), 1);
    assert_active(&engine, &kid, X1, Severity::Blocker, Inheritance::Overrides);
    assert_active(&engine, &grandchild, X1, Severity::Blocker, Inheritance::Inherited);

    let changes = engine
        .deactivate(&ActiveRuleKey::new(root.clone(), rule(X1)), true)
        .unwrap();
    assert_eq!(changes.len(), 3);
    assert_inactive(&engine, &kid, X1);
    assert_inactive(&engine, &grandchild, X1);
}

/// The cascade does not jump over a profile that lacks the rule.
#[test]
fn deactivation_cascade_stops_at_profiles_without_the_rule() {
    let mut engine = engine().with_settings(rulecast_core::EngineSettings {
        allow_deactivate_inherited: true,
        ..Default::default()
    });
    let (root, kid, grandchild) = chain(&mut engine);
    engine.activate(&root, &RuleActivation::new(X1)).unwrap();
    engine
        .deactivate(&ActiveRuleKey::new(kid.clone(), rule(X1)), false)
        .unwrap();
    // The grandchild lost the rule together with its parent
    assert_inactive(&engine, &grandchild, X1);

    engine
        .activate(&grandchild, &RuleActivation::new(X1).with_severity(Severity::Info))
        .unwrap();
    let changes = engine
        .deactivate(&ActiveRuleKey::new(root.clone(), rule(X1)), false)
        .unwrap();

    assert_eq!(changes.len(), 1);
    assert_active(&engine, &grandchild, X1, Severity::Info, Inheritance::None);
}
