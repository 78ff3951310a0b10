//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod catalog;
mod checklist;
mod delegation;
mod permission;
mod role;
mod security;

pub use catalog::{CheckDefinition, EngineGuards, PermissionCatalog};
pub use checklist::{
    CheckStatus, CheckUpdate, CheckUpdatePlan, SummaryDelta, SummaryStatus, ValidationCheck,
    ValidationSummary,
};
pub use delegation::{DelegationParty, DelegationRule, DelegationWindow, is_currently_valid};
pub use permission::{PermissionCode, PermissionDefinition};
pub use role::{RoleAssignment, RoleDefinition, RoleId};
pub use security::AuditAction;
