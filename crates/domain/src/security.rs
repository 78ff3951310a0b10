use std::str::FromStr;

use accessledger_core::AppError;
use serde::{Deserialize, Serialize};

/// Stable audit actions emitted by application use-cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted when a role is assigned to a subject.
    SecurityRoleAssigned,
    /// Emitted when a role assignment is deactivated.
    SecurityRoleRevoked,
    /// Emitted when a delegation rule is created.
    SecurityDelegationCreated,
    /// Emitted when a delegation rule is revoked early.
    SecurityDelegationRevoked,
    /// Emitted when a permission check passes through a delegation.
    SecurityDelegatedPermissionUsed,
    /// Emitted when a permission check passes through the admin override.
    SecurityAdminOverrideUsed,
    /// Emitted when a system's checklist rows are created.
    ChecklistInitialized,
    /// Emitted when one check changes status.
    ChecklistCheckUpdated,
    /// Emitted when a `not_applicable` check is moved back into the audit.
    ChecklistNotApplicableOverridden,
    /// Emitted when a bulk status change is applied.
    ChecklistBulkUpdated,
    /// Emitted when a system's checklist is wiped.
    ChecklistReset,
    /// Emitted when a reconciliation scan repairs a drifted summary.
    ChecklistSummaryRepaired,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecurityRoleAssigned => "security.role.assigned",
            Self::SecurityRoleRevoked => "security.role.revoked",
            Self::SecurityDelegationCreated => "security.delegation.created",
            Self::SecurityDelegationRevoked => "security.delegation.revoked",
            Self::SecurityDelegatedPermissionUsed => "security.delegation.used",
            Self::SecurityAdminOverrideUsed => "security.admin_override.used",
            Self::ChecklistInitialized => "checklist.initialized",
            Self::ChecklistCheckUpdated => "checklist.check.updated",
            Self::ChecklistNotApplicableOverridden => "checklist.check.not_applicable_overridden",
            Self::ChecklistBulkUpdated => "checklist.bulk_updated",
            Self::ChecklistReset => "checklist.reset",
            Self::ChecklistSummaryRepaired => "checklist.summary.repaired",
        }
    }

    const ALL: [Self; 12] = [
        Self::SecurityRoleAssigned,
        Self::SecurityRoleRevoked,
        Self::SecurityDelegationCreated,
        Self::SecurityDelegationRevoked,
        Self::SecurityDelegatedPermissionUsed,
        Self::SecurityAdminOverrideUsed,
        Self::ChecklistInitialized,
        Self::ChecklistCheckUpdated,
        Self::ChecklistNotApplicableOverridden,
        Self::ChecklistBulkUpdated,
        Self::ChecklistReset,
        Self::ChecklistSummaryRepaired,
    ];
}

impl FromStr for AuditAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown audit action '{value}'")))
    }
}
