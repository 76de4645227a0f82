//! Error types for rule activation.

use thiserror::Error;

use crate::model::{ProfileId, RuleId};

/// Failure reported by a [`ProfileStore`](crate::store::ProfileStore) or
/// [`RuleCatalog`](crate::store::RuleCatalog) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors returned by engine operations.
///
/// Validation errors describe a request that cannot be honored. Bulk
/// operations and parent replay record them per rule and keep going; any
/// other error aborts the whole operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivationError {
    #[error("Rule not found: {0}")]
    RuleNotFound(RuleId),

    #[error("Quality profile not found: {0}")]
    ProfileNotFound(ProfileId),

    #[error("Rule was removed: {0}")]
    RuleRemoved(RuleId),

    #[error("Rule template can't be activated on a quality profile: {0}")]
    RuleIsTemplate(RuleId),

    #[error("{rule_language} rule {rule} cannot be activated on {profile_language} profile {profile}")]
    LanguageMismatch {
        rule: RuleId,
        rule_language: String,
        profile: String,
        profile_language: String,
    },

    #[error("The built-in profile {0} is read-only and can't be updated")]
    BuiltInReadOnly(String),

    #[error("Cannot deactivate inherited rule '{0}'")]
    InheritedRule(RuleId),

    #[error("Descendant profile '{parent}' can not be selected as parent of '{profile}'")]
    CyclicParent { profile: String, parent: String },

    #[error(
        "Cannot set the profile '{parent}' as the parent of profile '{profile}' since their languages differ ('{parent_language}' != '{profile_language}')"
    )]
    ParentLanguageMismatch {
        profile: String,
        profile_language: String,
        parent: String,
        parent_language: String,
    },

    #[error("Quality profile already exists: {language}/{name}")]
    DuplicateProfile { language: String, name: String },

    #[error("Quality profile name must not be empty")]
    EmptyProfileName,

    #[error("{0}")]
    InvalidParam(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ActivationError {
    /// True for errors caused by the request rather than the environment.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            ActivationError::Store(_)
                | ActivationError::RuleNotFound(_)
                | ActivationError::ProfileNotFound(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ActivationError::RuleNotFound(_) | ActivationError::ProfileNotFound(_)
        )
    }
}

pub type Result<T, E = ActivationError> = std::result::Result<T, E>;
