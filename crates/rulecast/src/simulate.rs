//! Run a configured workspace through the activation engine.
//!
//! The catalog and the store are in memory: every run starts from an empty
//! store, registers the declared built-in profiles, creates the custom
//! profiles, and then replays the scripted operations in order.

use eyre::{Result, WrapErr};
use tracing::{info, warn};

use rulecast_core::memory::{MemoryCatalog, MemoryStore};
use rulecast_core::{
    ActivationError, ActiveRule, ActiveRuleChange, ActiveRuleKey, BulkChangeResult, ProfileEngine,
    ProfileId, RegistrationReport, RuleActivation, RuleFilter, RuleId, RuleStatus, TracingIndexer,
};

use crate::config::{Action, Config, OperationConfig};

pub type Engine = ProfileEngine<MemoryCatalog, MemoryStore, TracingIndexer>;

/// Everything a simulation did.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub registration: RegistrationReport,
    /// Changes made while creating the configured profiles.
    pub setup_changes: Vec<ActiveRuleChange>,
    pub steps: Vec<StepReport>,
    /// Final state of every profile, by language then name.
    pub profiles: Vec<ProfileSummary>,
}

impl SimulationReport {
    pub fn rejected(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step.outcome, StepOutcome::Rejected(_)))
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct StepReport {
    /// 1-based position in the script.
    pub index: usize,
    pub action: Action,
    pub target: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone)]
pub enum StepOutcome {
    Changes(Vec<ActiveRuleChange>),
    Bulk(BulkChangeResult),
    /// The engine refused the operation; nothing was written.
    Rejected(String),
}

impl StepOutcome {
    pub fn changes(&self) -> &[ActiveRuleChange] {
        match self {
            StepOutcome::Changes(changes) => changes,
            StepOutcome::Bulk(result) => &result.changes,
            StepOutcome::Rejected(_) => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileSummary {
    pub id: ProfileId,
    pub name: String,
    pub language: String,
    pub parent: Option<ProfileId>,
    pub is_built_in: bool,
    pub is_default: bool,
    pub active_rules: Vec<ActiveRule>,
}

/// Build the engine described by `config`, without running anything.
pub fn build_engine(config: &Config) -> Result<Engine> {
    let mut catalog = MemoryCatalog::new();
    for rule in &config.rules {
        catalog.insert(rule.to_rule()?);
    }
    Ok(ProfileEngine::new(catalog, MemoryStore::new(), TracingIndexer)
        .with_settings(config.settings.to_settings()))
}

/// Run the whole simulation.
pub fn run(config: &Config) -> Result<SimulationReport> {
    let mut engine = build_engine(config)?;

    let registration = engine
        .register_builtins(&config.builtin_profiles)
        .wrap_err("Failed to register built-in profiles")?;
    info!(
        created = registration.created.len(),
        updated = registration.updated.len(),
        "registered built-in profiles"
    );

    let mut setup_changes = Vec::new();
    for profile in &config.profiles {
        let parent = profile
            .parent
            .as_deref()
            .map(|name| resolve_profile(&engine, name, Some(&profile.language)))
            .transpose()?;
        let (_, changes) = engine
            .create_profile(&profile.language, &profile.name, parent.as_ref())
            .wrap_err_with(|| format!("Failed to create profile '{}'", profile.name))?;
        setup_changes.extend(changes);
    }

    let mut steps = Vec::with_capacity(config.operations.len());
    for (position, operation) in config.operations.iter().enumerate() {
        let index = position + 1;
        let target = describe(operation);
        let outcome = match run_operation(&mut engine, operation) {
            Ok(outcome) => outcome,
            Err(Failure::Engine(err)) if err.is_validation() || err.is_not_found() => {
                warn!(step = index, action = operation.action.as_str(), %err, "operation rejected");
                StepOutcome::Rejected(err.to_string())
            }
            Err(Failure::Engine(err)) => {
                return Err(err).wrap_err_with(|| {
                    format!("Operation {index} ({}) failed", operation.action.as_str())
                });
            }
            Err(Failure::Config(err)) => {
                return Err(err).wrap_err_with(|| {
                    format!("Operation {index} ({}) is invalid", operation.action.as_str())
                });
            }
        };
        steps.push(StepReport {
            index,
            action: operation.action,
            target,
            outcome,
        });
    }

    Ok(SimulationReport {
        registration,
        setup_changes,
        steps,
        profiles: summarize(engine.store()),
    })
}

enum Failure {
    Engine(ActivationError),
    Config(eyre::Report),
}

impl From<ActivationError> for Failure {
    fn from(err: ActivationError) -> Self {
        Failure::Engine(err)
    }
}

impl From<eyre::Report> for Failure {
    fn from(err: eyre::Report) -> Self {
        Failure::Config(err)
    }
}

fn run_operation(
    engine: &mut Engine,
    op: &OperationConfig,
) -> std::result::Result<StepOutcome, Failure> {
    let outcome = match op.action {
        Action::Activate => {
            let profile = profile_of(engine, op)?;
            let rule = rule_of(op)?;
            let activation = if op.reset {
                RuleActivation::reset(rule)
            } else {
                let mut activation = RuleActivation::new(rule).with_params(op.params.clone());
                if let Some(severity) = op.severity {
                    activation = activation.with_severity(severity);
                }
                if let Some(prioritized) = op.prioritized {
                    activation = activation.with_prioritized(prioritized);
                }
                activation
            };
            StepOutcome::Changes(engine.activate(&profile, &activation)?)
        }
        Action::Deactivate => {
            let key = ActiveRuleKey::new(profile_of(engine, op)?, rule_of(op)?);
            StepOutcome::Changes(engine.deactivate(&key, op.force)?)
        }
        Action::BulkActivate => {
            let profile = profile_of(engine, op)?;
            let filter = filter_of(engine, &profile, op);
            StepOutcome::Bulk(engine.bulk_activate(&profile, &filter, op.severity, op.prioritized)?)
        }
        Action::BulkDeactivate => {
            let profile = profile_of(engine, op)?;
            let filter = filter_of(engine, &profile, op);
            StepOutcome::Bulk(engine.bulk_deactivate(&profile, &filter)?)
        }
        Action::SetParent => {
            let profile = profile_of(engine, op)?;
            let language = engine
                .store()
                .profile(&profile)
                .map(|p| p.language.clone());
            let parent = op
                .parent
                .as_deref()
                .map(|name| resolve_profile(engine, name, language.as_deref()))
                .transpose()?;
            StepOutcome::Changes(engine.set_parent(&profile, parent.as_ref())?)
        }
        Action::RemoveParent => {
            let profile = profile_of(engine, op)?;
            StepOutcome::Changes(engine.remove_parent(&profile)?)
        }
        Action::DeleteRule => {
            let rule = rule_of(op)?;
            let changes = engine.delete_rule(&rule)?;
            if let Some(rule) = engine.catalog_mut().get_mut(&rule) {
                rule.status = RuleStatus::Removed;
            }
            StepOutcome::Changes(changes)
        }
        Action::DeleteProfile => {
            let profile = profile_of(engine, op)?;
            StepOutcome::Changes(engine.delete_profile(&profile)?)
        }
    };
    Ok(outcome)
}

fn profile_of(engine: &Engine, op: &OperationConfig) -> Result<ProfileId> {
    let Some(name) = op.profile.as_deref() else {
        eyre::bail!("`profile` is required for {}", op.action.as_str());
    };
    resolve_profile(engine, name, op.language.as_deref())
}

fn rule_of(op: &OperationConfig) -> Result<RuleId> {
    match op.rule.as_deref() {
        Some(rule) => Ok(RuleId::from(rule)),
        None => eyre::bail!("`rule` is required for {}", op.action.as_str()),
    }
}

/// The bulk filter of an operation. Without an explicit language, rules of
/// the profile's language are selected.
fn filter_of(engine: &Engine, profile: &ProfileId, op: &OperationConfig) -> RuleFilter {
    let mut languages = op.languages.clone();
    if languages.is_empty() {
        languages.extend(engine.store().profile(profile).map(|p| p.language.clone()));
    }
    RuleFilter {
        languages,
        repositories: op.repositories.clone(),
        rule_ids: op.rules.iter().map(|r| RuleId::from(r.as_str())).collect(),
        statuses: op.statuses.clone(),
        include_templates: false,
    }
}

/// Find a profile by name, optionally restricted to one language.
pub fn resolve_profile(engine: &Engine, name: &str, language: Option<&str>) -> Result<ProfileId> {
    let matches: Vec<_> = engine
        .store()
        .profiles()
        .filter(|p| p.name == name && language.is_none_or(|l| p.language == l))
        .collect();
    match matches.as_slice() {
        [profile] => Ok(profile.id.clone()),
        [] => eyre::bail!("Unknown profile '{name}'"),
        _ => eyre::bail!("Profile name '{name}' is used by several languages, set `language`"),
    }
}

fn describe(op: &OperationConfig) -> String {
    let mut parts: Vec<&str> = Vec::new();
    parts.extend(op.profile.as_deref());
    parts.extend(op.rule.as_deref());
    if op.action == Action::SetParent {
        parts.push(op.parent.as_deref().unwrap_or("(none)"));
    }
    parts.join(" / ")
}

fn summarize(store: &MemoryStore) -> Vec<ProfileSummary> {
    let mut profiles: Vec<ProfileSummary> = store
        .profiles()
        .map(|p| ProfileSummary {
            id: p.id.clone(),
            name: p.name.clone(),
            language: p.language.clone(),
            parent: p.parent_id.clone(),
            is_built_in: p.is_built_in,
            is_default: store.default_profile(&p.language) == Some(&p.id),
            active_rules: store.active_rules_of(&p.id).into_iter().cloned().collect(),
        })
        .collect();
    profiles.sort_by(|a, b| (&a.language, &a.name).cmp(&(&b.language, &b.name)));
    profiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProfileConfig, RuleConfig};
    use rulecast_core::{Inheritance, Severity};

    fn rule(id: &str, severity: Severity) -> RuleConfig {
        RuleConfig {
            id: id.to_string(),
            language: "java".to_string(),
            severity,
            status: None,
            template: false,
            template_id: None,
            params: Vec::new(),
        }
    }

    fn op(action: Action, profile: &str, rule: Option<&str>) -> OperationConfig {
        OperationConfig {
            action,
            profile: Some(profile.to_string()),
            language: None,
            rule: rule.map(str::to_string),
            parent: None,
            severity: None,
            prioritized: None,
            params: Default::default(),
            reset: false,
            force: false,
            languages: Vec::new(),
            repositories: Vec::new(),
            rules: Vec::new(),
            statuses: Vec::new(),
        }
    }

    fn config() -> Config {
        Config {
            rules: vec![rule("java:S1", Severity::Major), rule("java:S2", Severity::Minor)],
            profiles: vec![
                ProfileConfig {
                    name: "Company".to_string(),
                    language: "java".to_string(),
                    parent: None,
                },
                ProfileConfig {
                    name: "Team".to_string(),
                    language: "java".to_string(),
                    parent: Some("Company".to_string()),
                },
            ],
            ..Config::default()
        }
    }

    #[test]
    fn activation_reaches_children() {
        let mut config = config();
        config.operations = vec![op(Action::Activate, "Company", Some("java:S1"))];

        let report = run(&config).unwrap();

        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.steps[0].outcome.changes().len(), 2);
        let team = report.profiles.iter().find(|p| p.name == "Team").unwrap();
        assert_eq!(team.active_rules.len(), 1);
        assert_eq!(team.active_rules[0].inheritance, Inheritance::Inherited);
    }

    #[test]
    fn rejected_operations_do_not_stop_the_run() {
        let mut config = config();
        config.operations = vec![
            op(Action::Activate, "Company", Some("java:S1")),
            op(Action::Deactivate, "Team", Some("java:S1")),
            op(Action::Activate, "Team", Some("java:S2")),
        ];

        let report = run(&config).unwrap();

        assert_eq!(report.rejected(), 1);
        assert!(matches!(
            &report.steps[1].outcome,
            StepOutcome::Rejected(message) if message.contains("inherited")
        ));
        assert_eq!(report.steps[2].outcome.changes().len(), 1);
    }

    #[test]
    fn unknown_profile_fails_the_run() {
        let mut config = config();
        config.operations = vec![op(Action::Activate, "Nobody", Some("java:S1"))];

        let err = run(&config).unwrap_err();

        assert!(format!("{err:#}").contains("Unknown profile 'Nobody'"));
    }

    #[test]
    fn deleted_rules_leave_the_catalog() {
        let mut config = config();
        config.operations = vec![
            op(Action::Activate, "Company", Some("java:S1")),
            OperationConfig {
                profile: None,
                ..op(Action::DeleteRule, "", Some("java:S1"))
            },
            op(Action::Activate, "Company", Some("java:S1")),
        ];

        let report = run(&config).unwrap();

        assert_eq!(report.steps[1].outcome.changes().len(), 2);
        assert!(matches!(
            &report.steps[2].outcome,
            StepOutcome::Rejected(message) if message == "Rule was removed: java:S1"
        ));
    }
}
