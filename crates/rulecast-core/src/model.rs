//! Persistent entities: rules, profiles, and the active rules that join them.

use facet::Facet;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::param_type::ParamType;

/// Identifier of a quality profile.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Facet)]
#[facet(transparent)]
pub struct ProfileId(pub String);

impl ProfileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ProfileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Rule key in `repository:key` form, for example `java:S1234`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Facet)]
#[facet(transparent)]
pub struct RuleId(pub String);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Repository part of the key (everything before the first `:`).
    pub fn repository(&self) -> &str {
        self.0.split_once(':').map_or("", |(repo, _)| repo)
    }

    /// Rule part of the key (everything after the first `:`).
    pub fn rule_key(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(_, key)| key)
    }
}

impl Display for RuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for RuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Issue severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Facet)]
#[facet(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Severity {
    Info,
    Minor,
    Major,
    Critical,
    Blocker,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Minor,
        Severity::Major,
        Severity::Critical,
        Severity::Blocker,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Minor => "MINOR",
            Severity::Major => "MAJOR",
            Severity::Critical => "CRITICAL",
            Severity::Blocker => "BLOCKER",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|severity| severity.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown severity '{s}'"))
    }
}

/// Lifecycle status of a rule in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Facet)]
#[facet(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum RuleStatus {
    Beta,
    Deprecated,
    #[default]
    Ready,
    Removed,
}

/// A rule parameter definition.
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct RuleParam {
    pub name: String,
    pub param_type: ParamType,
    #[facet(default)]
    pub default_value: Option<String>,
    /// Values are comma-separated and each entry is validated on its own.
    #[facet(default)]
    pub multiple: bool,
}

impl RuleParam {
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            default_value: None,
            multiple: false,
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// A rule as described by the catalog.
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct Rule {
    pub id: RuleId,
    pub language: String,
    pub default_severity: Severity,
    pub status: RuleStatus,
    /// Templates can only be instantiated into custom rules, never activated.
    pub is_template: bool,
    /// Set on custom rules created from a template.
    #[facet(default)]
    pub template_id: Option<RuleId>,
    #[facet(default)]
    pub params: Vec<RuleParam>,
}

impl Rule {
    pub fn new(id: impl Into<RuleId>, language: impl Into<String>, default_severity: Severity) -> Self {
        Self {
            id: id.into(),
            language: language.into(),
            default_severity,
            status: RuleStatus::Ready,
            is_template: false,
            template_id: None,
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: RuleParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_status(mut self, status: RuleStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_custom(&self) -> bool {
        self.template_id.is_some()
    }

    pub fn param(&self, name: &str) -> Option<&RuleParam> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// A named quality profile for one language.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub language: String,
    #[facet(default)]
    pub parent_id: Option<ProfileId>,
    /// Built-in profiles are maintained by the registrar and read-only for users.
    #[facet(default)]
    pub is_built_in: bool,
    /// Milliseconds since the epoch of the last change to this profile's rules.
    #[facet(default)]
    pub rules_updated_at: Option<u64>,
}

impl Profile {
    pub fn new(id: impl Into<ProfileId>, name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            language: language.into(),
            parent_id: None,
            is_built_in: false,
            rules_updated_at: None,
        }
    }
}

/// How an active rule relates to the same rule in the parent profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Facet)]
#[facet(rename_all = "SCREAMING_SNAKE_CASE")]
#[facet(traits(Default))]
#[repr(u8)]
pub enum Inheritance {
    /// Activated directly, no relationship with a parent.
    #[default]
    None,
    /// Mirrors the parent's activation.
    Inherited,
    /// Inherited from the parent but with diverging values.
    Overrides,
}

impl Display for Inheritance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Inheritance::None => "NONE",
            Inheritance::Inherited => "INHERITED",
            Inheritance::Overrides => "OVERRIDES",
        })
    }
}

/// Composite key of an active rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Facet)]
pub struct ActiveRuleKey {
    pub profile_id: ProfileId,
    pub rule_id: RuleId,
}

impl ActiveRuleKey {
    pub fn new(profile_id: impl Into<ProfileId>, rule_id: impl Into<RuleId>) -> Self {
        Self {
            profile_id: profile_id.into(),
            rule_id: rule_id.into(),
        }
    }
}

impl Display for ActiveRuleKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.profile_id, self.rule_id)
    }
}

/// A rule enabled in a profile, with its configured values.
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct ActiveRule {
    pub key: ActiveRuleKey,
    pub severity: Severity,
    #[facet(default)]
    pub prioritized: bool,
    #[facet(default)]
    pub inheritance: Inheritance,
    /// Parameter values, absent keys are unset.
    #[facet(default)]
    pub params: BTreeMap<String, String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl ActiveRule {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn is_inherited(&self) -> bool {
        self.inheritance == Inheritance::Inherited
    }

    pub fn is_overriding(&self) -> bool {
        self.inheritance == Inheritance::Overrides
    }
}
