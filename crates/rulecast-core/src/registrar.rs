//! Synchronization of built-in profiles with their declarations.
//!
//! Declarations come from language plugins (or a config file). For each
//! language, registration creates built-in profiles that were never
//! registered before, brings existing ones in line with their declared
//! rules, renames custom profiles that
//! collide with a built-in name, demotes built-ins nobody declares anymore,
//! and makes sure the language has a usable default profile.

use facet::Facet;
use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::activation::RuleActivation;
use crate::change::ActiveRuleChange;
use crate::context::ActivationSnapshot;
use crate::engine::{Session, allocate_profile_id};
use crate::error::Result;
use crate::model::{Profile, ProfileId, RuleId, RuleStatus, Severity};
use crate::store::{RuleCatalog, StoreTransaction};

/// A built-in profile as declared by a language plugin.
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct DeclaredProfile {
    pub name: String,
    pub language: String,
    /// Preferred as the language's default profile.
    #[facet(default)]
    pub is_default: bool,
    #[facet(default)]
    pub rules: Vec<DeclaredRule>,
}

/// A rule of a declared built-in profile, with optional overrides of the
/// rule's default severity and parameters.
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct DeclaredRule {
    pub rule: RuleId,
    #[facet(default)]
    pub severity: Option<Severity>,
    #[facet(default)]
    pub prioritized: Option<bool>,
    #[facet(default)]
    pub params: BTreeMap<String, String>,
}

impl DeclaredRule {
    pub fn new(rule: impl Into<RuleId>) -> Self {
        Self {
            rule: rule.into(),
            severity: None,
            prioritized: None,
            params: BTreeMap::new(),
        }
    }

    fn to_activation(&self) -> RuleActivation {
        let mut activation = RuleActivation::new(self.rule.clone()).with_params(self.params.clone());
        if let Some(severity) = self.severity {
            activation = activation.with_severity(severity);
        }
        if let Some(prioritized) = self.prioritized {
            activation = activation.with_prioritized(prioritized);
        }
        activation
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct RenamedProfile {
    pub id: ProfileId,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct DefaultAssignment {
    pub language: String,
    pub profile: ProfileId,
}

/// What registration did, across all languages.
#[derive(Debug, Clone, Default, PartialEq, Facet)]
pub struct RegistrationReport {
    pub created: Vec<ProfileId>,
    pub updated: Vec<ProfileId>,
    /// Custom profiles renamed to free a built-in name.
    pub renamed: Vec<RenamedProfile>,
    /// Built-in profiles turned into custom ones.
    pub demoted: Vec<RenamedProfile>,
    pub defaults: Vec<DefaultAssignment>,
    pub changes: Vec<ActiveRuleChange>,
}

impl RegistrationReport {
    pub(crate) fn merge(&mut self, other: RegistrationReport) {
        self.created.extend(other.created);
        self.updated.extend(other.updated);
        self.renamed.extend(other.renamed);
        self.demoted.extend(other.demoted);
        self.defaults.extend(other.defaults);
        self.changes.extend(other.changes);
    }
}

/// Group declarations by language, in language order.
pub(crate) fn by_language(declared: &[DeclaredProfile]) -> BTreeMap<String, Vec<&DeclaredProfile>> {
    let mut grouped: BTreeMap<String, Vec<&DeclaredProfile>> = BTreeMap::new();
    for profile in declared {
        grouped
            .entry(profile.language.clone())
            .or_default()
            .push(profile);
    }
    grouped
}

/// Register the built-in profiles of one language.
pub fn register_language<C, T>(
    session: &Session<'_, C>,
    tx: &mut T,
    language: &str,
    declared: &[&DeclaredProfile],
) -> Result<RegistrationReport>
where
    C: RuleCatalog + ?Sized,
    T: StoreTransaction + ?Sized,
{
    let mut report = RegistrationReport::default();
    let declared = merge_declarations(declared);
    let existing = tx.profiles_by_language(language)?;

    for decl in &declared {
        let activations = usable_rules(session.catalog, language, decl)?;
        match existing.iter().find(|p| p.name == decl.name) {
            Some(profile) if profile.is_built_in => {
                update_builtin(session, tx, profile, &activations, &mut report)?;
            }
            found => {
                if tx.is_builtin_registered(language, &decl.name)? {
                    info!(
                        language,
                        name = %decl.name,
                        "built-in profile was registered before, not creating it again"
                    );
                    continue;
                }
                if let Some(custom) = found {
                    let renamed = rename_outdated(session, tx, custom)?;
                    warn!(
                        from = %renamed.from,
                        to = %renamed.to,
                        "custom profile collides with a built-in profile, renaming it"
                    );
                    report.renamed.push(renamed);
                }
                create_builtin(session, tx, language, &decl.name, &activations, &mut report)?;
            }
        }
    }

    let declared_names: BTreeSet<&str> = declared.iter().map(|d| d.name.as_str()).collect();
    for profile in tx.profiles_by_language(language)? {
        if profile.is_built_in && !declared_names.contains(profile.name.as_str()) {
            let demoted = rename_outdated(session, tx, &profile)?;
            tx.update_profile(&Profile {
                name: demoted.to.clone(),
                is_built_in: false,
                ..profile
            })?;
            info!(from = %demoted.from, to = %demoted.to, "built-in profile is no longer declared, demoting it");
            report.demoted.push(demoted);
        }
    }

    assign_default(session, tx, language, &declared, &mut report)?;
    Ok(report)
}

/// Merge declarations sharing a name. Later rule declarations win.
fn merge_declarations(declared: &[&DeclaredProfile]) -> Vec<DeclaredProfile> {
    let mut merged: BTreeMap<String, DeclaredProfile> = BTreeMap::new();
    for decl in declared {
        match merged.get_mut(&decl.name) {
            Some(existing) => {
                existing.is_default |= decl.is_default;
                for rule in &decl.rules {
                    existing.rules.retain(|r| r.rule != rule.rule);
                    existing.rules.push(rule.clone());
                }
            }
            None => {
                merged.insert(decl.name.clone(), (*decl).clone());
            }
        }
    }
    merged.into_values().collect()
}

/// Activations for the declared rules that can actually be activated.
fn usable_rules<C>(catalog: &C, language: &str, decl: &DeclaredProfile) -> Result<Vec<RuleActivation>>
where
    C: RuleCatalog + ?Sized,
{
    let mut activations = Vec::with_capacity(decl.rules.len());
    for declared in &decl.rules {
        let Some(rule) = catalog.rule(&declared.rule)? else {
            warn!(profile = %decl.name, rule = %declared.rule, "declared rule does not exist, skipping");
            continue;
        };
        if rule.status == RuleStatus::Removed {
            warn!(profile = %decl.name, rule = %declared.rule, "declared rule was removed, skipping");
            continue;
        }
        if rule.language != language || rule.is_template {
            warn!(profile = %decl.name, rule = %declared.rule, "declared rule cannot be activated, skipping");
            continue;
        }
        activations.push(declared.to_activation());
    }
    Ok(activations)
}

fn create_builtin<C, T>(
    session: &Session<'_, C>,
    tx: &mut T,
    language: &str,
    name: &str,
    activations: &[RuleActivation],
    report: &mut RegistrationReport,
) -> Result<()>
where
    C: RuleCatalog + ?Sized,
    T: StoreTransaction + ?Sized,
{
    let mut profile = Profile::new(allocate_profile_id(&*tx, language, name)?, name, language);
    profile.is_built_in = true;
    tx.insert_profile(&profile)?;
    tx.mark_builtin_registered(language, name)?;

    let changes = apply(session, tx, &profile, activations, &[])?;
    info!(language, name, rules = changes.len(), "registered built-in profile");
    report.created.push(profile.id);
    report.changes.extend(changes);
    Ok(())
}

fn update_builtin<C, T>(
    session: &Session<'_, C>,
    tx: &mut T,
    profile: &Profile,
    activations: &[RuleActivation],
    report: &mut RegistrationReport,
) -> Result<()>
where
    C: RuleCatalog + ?Sized,
    T: StoreTransaction + ?Sized,
{
    let declared: BTreeSet<&RuleId> = activations.iter().map(|a| a.rule_id()).collect();
    let mut stale = Vec::new();
    for row in tx.active_rules_of_profile(&profile.id)? {
        if declared.contains(&row.key.rule_id) {
            continue;
        }
        if session.catalog.rule(&row.key.rule_id)?.is_some() {
            stale.push(row.key.rule_id);
        } else {
            warn!(profile = %profile.name, rule = %row.key.rule_id, "active rule is missing from the catalog, leaving it");
        }
    }

    let changes = apply(session, tx, profile, activations, &stale)?;
    if changes.is_empty() {
        debug!(profile = %profile.name, "built-in profile is up to date");
    } else {
        info!(profile = %profile.name, changes = changes.len(), "updated built-in profile");
        report.updated.push(profile.id.clone());
        report.changes.extend(changes);
    }
    Ok(())
}

/// Activate `activations` on a built-in profile and force-deactivate `stale`.
fn apply<C, T>(
    session: &Session<'_, C>,
    tx: &mut T,
    profile: &Profile,
    activations: &[RuleActivation],
    stale: &[RuleId],
) -> Result<Vec<ActiveRuleChange>>
where
    C: RuleCatalog + ?Sized,
    T: StoreTransaction + ?Sized,
{
    let mut rule_ids: Vec<RuleId> = activations.iter().map(|a| a.rule_id().clone()).collect();
    rule_ids.extend(stale.iter().cloned());
    let mut snapshot = ActivationSnapshot::load(&*tx, session.catalog, profile, &rule_ids)?;

    let mut changes = Vec::new();
    for activation in activations {
        match session.activator.activate(tx, &mut snapshot, activation) {
            Ok(applied) => changes.extend(applied),
            Err(err) if err.is_validation() => {
                warn!(profile = %profile.name, rule = %activation.rule_id(), "cannot activate declared rule: {err}");
            }
            Err(err) => return Err(err),
        }
    }
    for rule_id in stale {
        changes.extend(session.activator.deactivate(tx, &mut snapshot, rule_id, true)?);
    }
    Ok(changes)
}

/// Rename a profile with the outdated suffix, picking a free name.
fn rename_outdated<C, T>(session: &Session<'_, C>, tx: &mut T, profile: &Profile) -> Result<RenamedProfile>
where
    C: RuleCatalog + ?Sized,
    T: StoreTransaction + ?Sized,
{
    let taken: BTreeSet<String> = tx
        .profiles_by_language(&profile.language)?
        .into_iter()
        .map(|p| p.name)
        .collect();
    let suffix = &session.activator.settings().outdated_suffix;
    let mut name = format!("{}{suffix}", profile.name);
    let mut n = 2;
    while taken.contains(&name) {
        name = format!("{}{suffix} {n}", profile.name);
        n += 1;
    }

    let mut renamed = profile.clone();
    renamed.name = name.clone();
    tx.update_profile(&renamed)?;
    Ok(RenamedProfile {
        id: profile.id.clone(),
        from: profile.name.clone(),
        to: name,
    })
}

/// Keep the current default if it still has rules, otherwise pick the
/// declared default, then the preferred name, then the first built-in.
fn assign_default<C, T>(
    session: &Session<'_, C>,
    tx: &mut T,
    language: &str,
    declared: &[DeclaredProfile],
    report: &mut RegistrationReport,
) -> Result<()>
where
    C: RuleCatalog + ?Sized,
    T: StoreTransaction + ?Sized,
{
    let profiles = tx.profiles_by_language(language)?;
    if let Some(current) = tx.default_profile(language)? {
        if profiles.iter().any(|p| p.id == current) && !tx.active_rules_of_profile(&current)?.is_empty() {
            return Ok(());
        }
    }

    let preferred = &session.activator.settings().default_profile_name;
    let chosen = declared
        .iter()
        .filter(|d| d.is_default)
        .find_map(|d| profiles.iter().find(|p| p.is_built_in && p.name == d.name))
        .or_else(|| profiles.iter().find(|p| p.is_built_in && &p.name == preferred))
        .or_else(|| profiles.iter().find(|p| p.is_built_in))
        .or_else(|| profiles.first());

    if let Some(profile) = chosen {
        tx.set_default_profile(language, Some(&profile.id))?;
        info!(language, profile = %profile.name, "set default profile");
        report.defaults.push(DefaultAssignment {
            language: language.to_string(),
            profile: profile.id.clone(),
        });
    }
    Ok(())
}
