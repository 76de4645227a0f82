//! Common test utilities.

#![allow(dead_code)]

use rulecast_core::memory::{MemoryCatalog, MemoryStore, RecordingIndexer, TickingClock};
use rulecast_core::{
    ActiveRule, Inheritance, ParamType, Profile, ProfileEngine, ProfileId, Rule, RuleId, RuleParam,
    RuleStatus, Severity,
};

pub type Engine = ProfileEngine<MemoryCatalog, MemoryStore, RecordingIndexer>;

pub const XOO: &str = "xoo";

/// Rule with an integer `max` parameter (default 10) and a free `format`.
pub const X1: &str = "xoo:x1";
/// Rule without parameters, default severity MINOR.
pub const X2: &str = "xoo:x2";
/// Rule without parameters, default severity INFO.
pub const X3: &str = "xoo:x3";
pub const REMOVED: &str = "xoo:removed";
pub const TEMPLATE: &str = "xoo:template";
/// Custom rule instantiated from [`TEMPLATE`].
pub const CUSTOM: &str = "xoo:custom";
pub const JS1: &str = "js:j1";

/// The catalog every test starts from.
pub fn catalog() -> MemoryCatalog {
    let mut template = Rule::new(TEMPLATE, XOO, Severity::Major)
        .with_param(RuleParam::new("pattern", ParamType::Str));
    template.is_template = true;

    let mut custom = Rule::new(CUSTOM, XOO, Severity::Major)
        .with_param(RuleParam::new("pattern", ParamType::Str).with_default("a.*"));
    custom.template_id = Some(RuleId::from(TEMPLATE));

    [
        Rule::new(X1, XOO, Severity::Major)
            .with_param(RuleParam::new("max", ParamType::Integer).with_default("10"))
            .with_param(RuleParam::new("format", ParamType::Str)),
        Rule::new(X2, XOO, Severity::Minor),
        Rule::new(X3, XOO, Severity::Info),
        Rule::new(REMOVED, XOO, Severity::Major).with_status(RuleStatus::Removed),
        template,
        custom,
        Rule::new(JS1, "js", Severity::Major),
    ]
    .into_iter()
    .collect()
}

pub fn engine() -> Engine {
    ProfileEngine::new(catalog(), MemoryStore::new(), RecordingIndexer::default())
        .with_clock(TickingClock::starting_at(1_000))
}

pub fn rule(id: &str) -> RuleId {
    RuleId::from(id)
}

/// Create a root custom profile.
pub fn profile(engine: &mut Engine, name: &str) -> ProfileId {
    engine
        .create_profile(XOO, name, None)
        .expect("Failed to create profile")
        .0
        .id
}

/// Create a custom profile under `parent`.
pub fn child(engine: &mut Engine, name: &str, parent: &ProfileId) -> ProfileId {
    engine
        .create_profile(XOO, name, Some(parent))
        .expect("Failed to create child profile")
        .0
        .id
}

/// Root → Child → Grandchild.
pub fn chain(engine: &mut Engine) -> (ProfileId, ProfileId, ProfileId) {
    let root = profile(engine, "Root");
    let child_id = child(engine, "Child", &root);
    let grandchild = child(engine, "Grandchild", &child_id);
    (root, child_id, grandchild)
}

/// Insert a built-in profile directly into the store.
pub fn builtin(engine: &mut Engine, id: &str, name: &str) -> ProfileId {
    let mut profile = Profile::new(id, name, XOO);
    profile.is_built_in = true;
    engine.store_mut().seed_profile(profile);
    ProfileId::from(id)
}

pub fn active(engine: &Engine, profile: &ProfileId, rule_id: &str) -> Option<ActiveRule> {
    engine.store().active_rule(profile, &rule(rule_id)).cloned()
}

#[track_caller]
pub fn assert_active(
    engine: &Engine,
    profile: &ProfileId,
    rule_id: &str,
    severity: Severity,
    inheritance: Inheritance,
) -> ActiveRule {
    let row = active(engine, profile, rule_id)
        .unwrap_or_else(|| panic!("{rule_id} should be active on {profile}"));
    assert_eq!(row.severity, severity, "severity of {rule_id} on {profile}");
    assert_eq!(row.inheritance, inheritance, "inheritance of {rule_id} on {profile}");
    row
}

#[track_caller]
pub fn assert_inactive(engine: &Engine, profile: &ProfileId, rule_id: &str) {
    assert!(
        active(engine, profile, rule_id).is_none(),
        "{rule_id} should not be active on {profile}"
    );
}

/// Every INHERITED row carries exactly its parent's severity and parameters.
#[track_caller]
pub fn assert_inheritance_consistent(engine: &Engine) {
    let store = engine.store();
    for row in store.active_rules().filter(|ar| ar.is_inherited()) {
        let profile = store.profile(&row.key.profile_id).expect("profile of active rule");
        let parent_id = profile
            .parent_id
            .as_ref()
            .unwrap_or_else(|| panic!("{} is INHERITED without a parent", row.key));
        let parent_row = store
            .active_rule(parent_id, &row.key.rule_id)
            .unwrap_or_else(|| panic!("{} is INHERITED but the parent lacks the rule", row.key));
        assert_eq!(row.severity, parent_row.severity, "severity of {}", row.key);
        assert_eq!(row.params, parent_row.params, "params of {}", row.key);
    }
}
