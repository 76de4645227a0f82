//! The engine facade: every public operation runs in its own store
//! transaction and hands its ledger to the change indexer after commit.

use tracing::{info, instrument, warn};

use crate::activation::RuleActivation;
use crate::activator::RuleActivator;
use crate::change::{ActiveRuleChange, BulkChangeResult};
use crate::context::ActivationSnapshot;
use crate::error::{ActivationError, Result};
use crate::model::{ActiveRuleKey, Profile, ProfileId, RuleId, Severity};
use crate::registrar::{self, DeclaredProfile, RegistrationReport};
use crate::settings::EngineSettings;
use crate::store::{ChangeIndexer, Clock, ProfileStore, RuleCatalog, RuleFilter, StoreTransaction, SystemClock};
use crate::tree;

/// Borrowed collaborators shared by the steps of one operation.
pub struct Session<'a, C: ?Sized> {
    pub(crate) catalog: &'a C,
    pub(crate) activator: RuleActivator<'a>,
}

impl<'a, C: ?Sized> Session<'a, C> {
    pub fn new(catalog: &'a C, activator: RuleActivator<'a>) -> Self {
        Self { catalog, activator }
    }
}

/// Rule activation engine over a catalog, a profile store, and an indexer.
pub struct ProfileEngine<C, S, I = ()> {
    catalog: C,
    store: S,
    indexer: I,
    clock: Box<dyn Clock>,
    settings: EngineSettings,
}

impl<C, S, I> ProfileEngine<C, S, I>
where
    C: RuleCatalog,
    S: ProfileStore,
    I: ChangeIndexer,
{
    pub fn new(catalog: C, store: S, indexer: I) -> Self {
        Self {
            catalog,
            store,
            indexer,
            clock: Box::new(SystemClock),
            settings: EngineSettings::default(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut C {
        &mut self.catalog
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn indexer(&self) -> &I {
        &self.indexer
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Create a custom profile, optionally attached to a parent whose rules
    /// it then inherits.
    #[instrument(level = "debug", skip_all, fields(language = %language, name = %name))]
    pub fn create_profile(
        &mut self,
        language: &str,
        name: &str,
        parent: Option<&ProfileId>,
    ) -> Result<(Profile, Vec<ActiveRuleChange>)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ActivationError::EmptyProfileName);
        }
        let session = Session::new(&self.catalog, RuleActivator::new(&*self.clock, &self.settings));
        let mut tx = self.store.begin()?;
        if tx
            .profiles_by_language(language)?
            .iter()
            .any(|p| p.name == name)
        {
            return Err(ActivationError::DuplicateProfile {
                language: language.to_string(),
                name: name.to_string(),
            });
        }

        let id = allocate_profile_id(&tx, language, name)?;
        let profile = Profile::new(id, name, language);
        tx.insert_profile(&profile)?;
        info!(profile = %profile.id, "created profile");

        let changes = match parent {
            Some(parent_id) => {
                let parent = load_profile(&tx, parent_id)?;
                tree::set_parent(&session, &mut tx, &profile, &parent)?
            }
            None => Vec::new(),
        };
        let profile = load_profile(&tx, &profile.id)?;
        tx.commit()?;
        self.publish(&changes);
        Ok((profile, changes))
    }

    /// Activate one rule on a profile and its descendants.
    #[instrument(level = "debug", skip_all, fields(profile = %profile_id, rule = %activation.rule_id()))]
    pub fn activate(
        &mut self,
        profile_id: &ProfileId,
        activation: &RuleActivation,
    ) -> Result<Vec<ActiveRuleChange>> {
        self.activate_all(profile_id, std::slice::from_ref(activation))
    }

    /// Activate several rules on one profile, all or nothing.
    pub fn activate_all(
        &mut self,
        profile_id: &ProfileId,
        activations: &[RuleActivation],
    ) -> Result<Vec<ActiveRuleChange>> {
        let activator = RuleActivator::new(&*self.clock, &self.settings);
        let mut tx = self.store.begin()?;
        let profile = load_profile(&tx, profile_id)?;
        check_writable(&profile)?;

        let rule_ids: Vec<RuleId> = activations.iter().map(|a| a.rule_id().clone()).collect();
        let mut snapshot = ActivationSnapshot::load(&tx, &self.catalog, &profile, &rule_ids)?;
        let mut changes = Vec::new();
        for activation in activations {
            changes.extend(activator.activate(&mut tx, &mut snapshot, activation)?);
        }
        tx.commit()?;
        self.publish(&changes);
        Ok(changes)
    }

    /// Restore a rule to its parent's values, or the rule defaults.
    pub fn reset(&mut self, key: &ActiveRuleKey) -> Result<Vec<ActiveRuleChange>> {
        self.activate(&key.profile_id, &RuleActivation::reset(key.rule_id.clone()))
    }

    /// Deactivate one rule on a profile and its descendants.
    ///
    /// `force` is reserved for system operations: it bypasses the read-only
    /// check of built-in profiles and the inherited-rule guard.
    #[instrument(level = "debug", skip_all, fields(key = %key))]
    pub fn deactivate(&mut self, key: &ActiveRuleKey, force: bool) -> Result<Vec<ActiveRuleChange>> {
        let activator = RuleActivator::new(&*self.clock, &self.settings);
        let mut tx = self.store.begin()?;
        let profile = load_profile(&tx, &key.profile_id)?;
        if !force {
            check_writable(&profile)?;
        }
        let rule_ids = [key.rule_id.clone()];
        let mut snapshot = ActivationSnapshot::load(&tx, &self.catalog, &profile, &rule_ids)?;
        let changes = activator.deactivate(&mut tx, &mut snapshot, &key.rule_id, force)?;
        tx.commit()?;
        self.publish(&changes);
        Ok(changes)
    }

    /// Activate every rule matching `filter`, recording failures per rule.
    #[instrument(level = "debug", skip_all, fields(profile = %profile_id))]
    pub fn bulk_activate(
        &mut self,
        profile_id: &ProfileId,
        filter: &RuleFilter,
        severity: Option<Severity>,
        prioritized: Option<bool>,
    ) -> Result<BulkChangeResult> {
        self.bulk(profile_id, filter, BulkAction::Activate { severity, prioritized })
    }

    /// Deactivate every rule matching `filter`, recording failures per rule.
    #[instrument(level = "debug", skip_all, fields(profile = %profile_id))]
    pub fn bulk_deactivate(
        &mut self,
        profile_id: &ProfileId,
        filter: &RuleFilter,
    ) -> Result<BulkChangeResult> {
        self.bulk(profile_id, filter, BulkAction::Deactivate)
    }

    fn bulk(&mut self, profile_id: &ProfileId, filter: &RuleFilter, action: BulkAction) -> Result<BulkChangeResult> {
        let activator = RuleActivator::new(&*self.clock, &self.settings);
        let rule_ids = self.catalog.search(filter)?;
        let mut tx = self.store.begin()?;
        let profile = load_profile(&tx, profile_id)?;
        check_writable(&profile)?;

        let mut snapshot = ActivationSnapshot::load(&tx, &self.catalog, &profile, &rule_ids)?;
        let mut result = BulkChangeResult::default();
        for rule_id in &rule_ids {
            let outcome = match action {
                BulkAction::Activate { severity, prioritized } => {
                    let mut activation = RuleActivation::new(rule_id.clone());
                    if let Some(severity) = severity {
                        activation = activation.with_severity(severity);
                    }
                    if let Some(prioritized) = prioritized {
                        activation = activation.with_prioritized(prioritized);
                    }
                    activator.activate(&mut tx, &mut snapshot, &activation)
                }
                BulkAction::Deactivate => activator.deactivate(&mut tx, &mut snapshot, rule_id, false),
            };
            match outcome {
                Ok(changes) => result.record_success(changes),
                Err(err) if err.is_validation() => {
                    warn!(rule = %rule_id, profile = %profile.name, "bulk change rejected: {err}");
                    result.record_failure(rule_id.clone(), err.to_string());
                }
                Err(err) => return Err(err),
            }
        }
        tx.commit()?;
        self.publish(&result.changes);
        info!(
            profile = %profile.name,
            succeeded = result.succeeded,
            failed = result.failed,
            "bulk change done"
        );
        Ok(result)
    }

    /// Set or clear the parent of a profile.
    #[instrument(level = "debug", skip_all, fields(profile = %profile_id))]
    pub fn set_parent(
        &mut self,
        profile_id: &ProfileId,
        parent_id: Option<&ProfileId>,
    ) -> Result<Vec<ActiveRuleChange>> {
        let session = Session::new(&self.catalog, RuleActivator::new(&*self.clock, &self.settings));
        let mut tx = self.store.begin()?;
        let profile = load_profile(&tx, profile_id)?;
        check_writable(&profile)?;
        let changes = match parent_id {
            Some(parent_id) => {
                let parent = load_profile(&tx, parent_id)?;
                tree::set_parent(&session, &mut tx, &profile, &parent)?
            }
            None => tree::remove_parent(&session, &mut tx, &profile)?,
        };
        tx.commit()?;
        self.publish(&changes);
        Ok(changes)
    }

    pub fn remove_parent(&mut self, profile_id: &ProfileId) -> Result<Vec<ActiveRuleChange>> {
        self.set_parent(profile_id, None)
    }

    /// Deactivate a rule everywhere it is active, ancestors before
    /// descendants.
    #[instrument(level = "debug", skip_all, fields(rule = %rule_id))]
    pub fn delete_rule(&mut self, rule_id: &RuleId) -> Result<Vec<ActiveRuleChange>> {
        if self.catalog.rule(rule_id)?.is_none() {
            return Err(ActivationError::RuleNotFound(rule_id.clone()));
        }
        let activator = RuleActivator::new(&*self.clock, &self.settings);
        let mut tx = self.store.begin()?;

        let mut holders = Vec::new();
        for row in tx.active_rules_of_rule(rule_id)? {
            let profile = load_profile(&tx, &row.key.profile_id)?;
            holders.push((tree::ancestors(&tx, &profile)?.len(), profile));
        }
        holders.sort_by(|(da, a), (db, b)| da.cmp(db).then_with(|| a.id.cmp(&b.id)));

        let rule_ids = [rule_id.clone()];
        let mut changes = Vec::new();
        for (_, profile) in holders {
            let mut snapshot = ActivationSnapshot::load(&tx, &self.catalog, &profile, &rule_ids)?;
            changes.extend(activator.deactivate(&mut tx, &mut snapshot, rule_id, true)?);
        }
        tx.commit()?;
        self.publish(&changes);
        Ok(changes)
    }

    /// Delete a custom profile and all of its descendants.
    #[instrument(level = "debug", skip_all, fields(profile = %profile_id))]
    pub fn delete_profile(&mut self, profile_id: &ProfileId) -> Result<Vec<ActiveRuleChange>> {
        let mut tx = self.store.begin()?;
        let profile = load_profile(&tx, profile_id)?;
        check_writable(&profile)?;
        let changes = tree::delete_profile(&mut tx, &profile)?;
        tx.commit()?;
        self.publish(&changes);
        Ok(changes)
    }

    /// Synchronize built-in profiles with their declarations, one language
    /// per transaction.
    pub fn register_builtins(&mut self, declared: &[DeclaredProfile]) -> Result<RegistrationReport> {
        let mut report = RegistrationReport::default();
        for (language, profiles) in registrar::by_language(declared) {
            let session = Session::new(&self.catalog, RuleActivator::new(&*self.clock, &self.settings));
            let mut tx = self.store.begin()?;
            let outcome = registrar::register_language(&session, &mut tx, &language, &profiles)?;
            tx.commit()?;
            self.publish(&outcome.changes);
            report.merge(outcome);
        }
        Ok(report)
    }

    fn publish(&mut self, changes: &[ActiveRuleChange]) {
        if !changes.is_empty() {
            self.indexer.on_changes(changes);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BulkAction {
    Activate {
        severity: Option<Severity>,
        prioritized: Option<bool>,
    },
    Deactivate,
}

pub(crate) fn load_profile<T>(tx: &T, id: &ProfileId) -> Result<Profile>
where
    T: StoreTransaction + ?Sized,
{
    tx.profile(id)?
        .ok_or_else(|| ActivationError::ProfileNotFound(id.clone()))
}

fn check_writable(profile: &Profile) -> Result<()> {
    if profile.is_built_in {
        return Err(ActivationError::BuiltInReadOnly(profile.name.clone()));
    }
    Ok(())
}

/// Derive a readable, unused profile id from the language and name.
pub(crate) fn allocate_profile_id<T>(tx: &T, language: &str, name: &str) -> Result<ProfileId>
where
    T: StoreTransaction + ?Sized,
{
    let mut slug = String::with_capacity(language.len() + name.len() + 1);
    for c in format!("{language}-{name}").chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();

    let mut candidate = ProfileId::new(slug.clone());
    let mut n = 2;
    while tx.profile(&candidate)?.is_some() {
        candidate = ProfileId::new(format!("{slug}-{n}"));
        n += 1;
    }
    Ok(candidate)
}
