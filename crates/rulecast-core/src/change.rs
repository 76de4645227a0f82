//! The change ledger produced by every mutating operation.

use facet::Facet;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::model::{ActiveRule, ActiveRuleKey, Inheritance, RuleId, Severity};

/// What happened to an active rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[facet(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ChangeType {
    Activated,
    Deactivated,
    Updated,
}

impl Display for ChangeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ChangeType::Activated => "ACTIVATED",
            ChangeType::Deactivated => "DEACTIVATED",
            ChangeType::Updated => "UPDATED",
        })
    }
}

/// One entry of the ledger: the state of an active rule after the change.
///
/// For deactivations the values are those of the row that was removed.
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct ActiveRuleChange {
    pub change_type: ChangeType,
    pub key: ActiveRuleKey,
    pub severity: Severity,
    pub prioritized: bool,
    pub inheritance: Inheritance,
    pub params: BTreeMap<String, String>,
}

impl ActiveRuleChange {
    pub(crate) fn deactivated(row: &ActiveRule) -> Self {
        Self {
            change_type: ChangeType::Deactivated,
            key: row.key.clone(),
            severity: row.severity,
            prioritized: row.prioritized,
            inheritance: row.inheritance,
            params: row.params.clone(),
        }
    }

    pub fn is(&self, change_type: ChangeType) -> bool {
        self.change_type == change_type
    }
}

impl Display for ActiveRuleChange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.change_type, self.key, self.severity, self.inheritance
        )
    }
}

/// A rule a bulk operation could not apply.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct BulkError {
    pub rule_id: RuleId,
    pub message: String,
}

/// Outcome of a bulk activation or deactivation.
#[derive(Debug, Clone, Default, PartialEq, Facet)]
pub struct BulkChangeResult {
    /// Rules that produced at least one change.
    pub succeeded: usize,
    /// Rules rejected with a validation error.
    pub failed: usize,
    pub errors: Vec<BulkError>,
    pub changes: Vec<ActiveRuleChange>,
}

impl BulkChangeResult {
    pub(crate) fn record_success(&mut self, changes: Vec<ActiveRuleChange>) {
        if !changes.is_empty() {
            self.succeeded += 1;
            self.changes.extend(changes);
        }
    }

    pub(crate) fn record_failure(&mut self, rule_id: RuleId, message: String) {
        self.failed += 1;
        self.errors.push(BulkError { rule_id, message });
    }
}
