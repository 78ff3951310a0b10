//! Application services and ports.

#![forbid(unsafe_code)]

mod access_admin_service;
mod access_ports;
mod audit_ports;
mod authorization_service;
mod checklist_ports;
mod checklist_service;

#[cfg(test)]
mod test_support;

pub use access_admin_service::AccessAdminService;
pub use access_ports::{
    AccessEventNotifier, AccessNotification, AccessNotificationKind, CreateDelegationInput,
    DelegationRepository, DelegationRevocation, GrantSnapshot, GrantSnapshotCache,
    GrantSnapshotRepository, RoleAssignmentQuery, RoleAssignmentRepository, TenantDelegation,
};
pub use audit_ports::{AuditEvent, AuditLogEntry, AuditLogQuery, AuditRepository};
pub use authorization_service::{
    AccessDecision, AdminOverrideSource, AuthorizationService, DecisionBasis,
    EffectivePermissionSet, PermissionSource,
};
pub use checklist_ports::{
    AppliedCheckUpdates, CheckWriteOutcome, CheckWriteResult, ChecklistRepository,
    ChecklistSystemKey, InsertChecksOutcome, ResetSystemOutcome, SummaryReconciliation,
};
pub use checklist_service::{
    BulkStatusChangeReport, CheckChangeResult, ChecklistService, InitializeSystemReport,
    ReconcileSweepReport,
};
