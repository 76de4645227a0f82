//! Engine-wide settings.

/// Name preferred as the default profile of a language when the registrar
/// has to pick one.
pub const DEFAULT_PROFILE_NAME: &str = "Sonar way";

/// Appended to the name of profiles the registrar renames or demotes.
pub const OUTDATED_SUFFIX: &str = " (outdated copy)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Let users deactivate a rule a profile inherits from its parent.
    pub allow_deactivate_inherited: bool,
    pub default_profile_name: String,
    pub outdated_suffix: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            allow_deactivate_inherited: false,
            default_profile_name: DEFAULT_PROFILE_NAME.to_string(),
            outdated_suffix: OUTDATED_SUFFIX.to_string(),
        }
    }
}
