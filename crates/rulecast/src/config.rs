//! Configuration schema for rulecast
//!
//! A config file describes a whole workspace to simulate: the rule catalog,
//! the built-in profiles declared by language plugins, custom profiles, and
//! a script of operations to run against them.

use facet::Facet;
use std::collections::BTreeMap;
use std::path::Path;

use eyre::{Result, WrapErr};
use rulecast_core::{
    DeclaredProfile, EngineSettings, ParamType, Rule, RuleParam, RuleStatus, Severity,
};

pub const DEFAULT_CONFIG_PATH: &str = "rulecast.yaml";

/// Root configuration
#[derive(Debug, Clone, Default, Facet)]
pub struct Config {
    #[facet(default)]
    pub settings: SettingsConfig,

    /// The rule catalog
    #[facet(default)]
    pub rules: Vec<RuleConfig>,

    /// Profiles declared by language plugins
    #[facet(default)]
    pub builtin_profiles: Vec<DeclaredProfile>,

    /// Custom profiles, created in order after built-in registration
    #[facet(default)]
    pub profiles: Vec<ProfileConfig>,

    /// Operations to run, in order
    #[facet(default)]
    pub operations: Vec<OperationConfig>,
}

/// Engine settings; anything left out keeps its default.
#[derive(Debug, Clone, Default, Facet)]
#[facet(traits(Default))]
pub struct SettingsConfig {
    #[facet(default)]
    pub allow_deactivate_inherited: Option<bool>,
    #[facet(default)]
    pub default_profile_name: Option<String>,
    #[facet(default)]
    pub outdated_suffix: Option<String>,
}

impl SettingsConfig {
    pub fn to_settings(&self) -> EngineSettings {
        let defaults = EngineSettings::default();
        EngineSettings {
            allow_deactivate_inherited: self
                .allow_deactivate_inherited
                .unwrap_or(defaults.allow_deactivate_inherited),
            default_profile_name: self
                .default_profile_name
                .clone()
                .unwrap_or(defaults.default_profile_name),
            outdated_suffix: self
                .outdated_suffix
                .clone()
                .unwrap_or(defaults.outdated_suffix),
        }
    }
}

/// A catalog rule
#[derive(Debug, Clone, Facet)]
pub struct RuleConfig {
    /// Rule key, e.g. `java:S1234`
    pub id: String,
    pub language: String,
    pub severity: Severity,
    #[facet(default)]
    pub status: Option<RuleStatus>,
    #[facet(default)]
    pub template: bool,
    /// Template this custom rule was created from
    #[facet(default)]
    pub template_id: Option<String>,
    #[facet(default)]
    pub params: Vec<ParamConfig>,
}

#[derive(Debug, Clone, Facet)]
pub struct ParamConfig {
    pub name: String,
    /// Textual type, e.g. `INTEGER` or `SINGLE_SELECT_LIST,values="a,b"`
    #[facet(rename = "type", default)]
    pub param_type: Option<String>,
    #[facet(default)]
    pub default: Option<String>,
}

impl RuleConfig {
    pub fn to_rule(&self) -> Result<Rule> {
        let mut rule = Rule::new(self.id.as_str(), self.language.as_str(), self.severity)
            .with_status(self.status.unwrap_or_default());
        rule.is_template = self.template;
        rule.template_id = self.template_id.as_deref().map(Into::into);

        for param in &self.params {
            let text = param.param_type.as_deref().unwrap_or("STRING");
            let (param_type, multiple) = ParamType::parse(text)
                .map_err(|e| eyre::eyre!(e))
                .wrap_err_with(|| format!("Invalid type for parameter {} of {}", param.name, self.id))?;
            let mut definition = RuleParam::new(param.name.as_str(), param_type);
            definition.multiple = multiple;
            definition.default_value = param.default.clone();
            rule = rule.with_param(definition);
        }

        Ok(rule)
    }
}

/// A custom profile
#[derive(Debug, Clone, Facet)]
pub struct ProfileConfig {
    pub name: String,
    pub language: String,
    /// Name of the parent profile (same language)
    #[facet(default)]
    pub parent: Option<String>,
}

/// What an operation does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[facet(rename_all = "snake_case")]
#[repr(u8)]
pub enum Action {
    Activate,
    Deactivate,
    BulkActivate,
    BulkDeactivate,
    SetParent,
    RemoveParent,
    DeleteRule,
    DeleteProfile,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Activate => "activate",
            Action::Deactivate => "deactivate",
            Action::BulkActivate => "bulk_activate",
            Action::BulkDeactivate => "bulk_deactivate",
            Action::SetParent => "set_parent",
            Action::RemoveParent => "remove_parent",
            Action::DeleteRule => "delete_rule",
            Action::DeleteProfile => "delete_profile",
        }
    }
}

/// One scripted operation.
///
/// Profiles are referenced by name; `language` disambiguates names used by
/// several languages.
#[derive(Debug, Clone, Facet)]
pub struct OperationConfig {
    pub action: Action,

    #[facet(default)]
    pub profile: Option<String>,

    #[facet(default)]
    pub language: Option<String>,

    /// Rule key for activate, deactivate, and delete_rule
    #[facet(default)]
    pub rule: Option<String>,

    /// New parent for set_parent; omit to detach
    #[facet(default)]
    pub parent: Option<String>,

    #[facet(default)]
    pub severity: Option<Severity>,

    #[facet(default)]
    pub prioritized: Option<bool>,

    #[facet(default)]
    pub params: BTreeMap<String, String>,

    /// Restore the parent's values instead of applying the request
    #[facet(default)]
    pub reset: bool,

    /// Deactivate even when the rule is inherited or the profile is built-in
    #[facet(default)]
    pub force: bool,

    /// Bulk filter: rule languages
    #[facet(default)]
    pub languages: Vec<String>,

    /// Bulk filter: rule repositories
    #[facet(default)]
    pub repositories: Vec<String>,

    /// Bulk filter: explicit rule keys
    #[facet(default)]
    pub rules: Vec<String>,

    /// Bulk filter: rule statuses
    #[facet(default)]
    pub statuses: Vec<RuleStatus>,
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = facet_yaml::from_str(content).wrap_err("Failed to parse config")?;
        Ok(config)
    }

    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            eyre::bail!(
                "Config file not found at {}\n\n\
                 Create a config file describing your workspace:\n\n\
                 rules:\n  \
                   - id: \"java:S1\"\n    \
                     language: java\n    \
                     severity: MAJOR\n\
                 profiles:\n  \
                   - name: \"Company way\"\n    \
                     language: java\n\
                 operations:\n  \
                   - action: activate\n    \
                     profile: \"Company way\"\n    \
                     rule: \"java:S1\"",
                path.display()
            );
        }

        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = facet_yaml::from_str(&content)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}
