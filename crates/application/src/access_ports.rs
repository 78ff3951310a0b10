mod assignments;
mod delegations;
mod notifications;
mod snapshot;

pub use assignments::{RoleAssignmentQuery, RoleAssignmentRepository};
pub use delegations::{
    CreateDelegationInput, DelegationRepository, DelegationRevocation, TenantDelegation,
};
pub use notifications::{AccessEventNotifier, AccessNotification, AccessNotificationKind};
pub use snapshot::{GrantSnapshot, GrantSnapshotCache, GrantSnapshotRepository};
