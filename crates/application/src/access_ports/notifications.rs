use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use accessledger_core::{AppResult, TenantId};

/// Access change announced to the notification dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessNotificationKind {
    /// A role was assigned.
    RoleAssigned,
    /// A role assignment was revoked.
    RoleRevoked,
    /// A delegation was created.
    DelegationCreated,
    /// A delegation was revoked.
    DelegationRevoked,
}

impl AccessNotificationKind {
    /// Returns a stable event name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleAssigned => "access.role_assigned",
            Self::RoleRevoked => "access.role_revoked",
            Self::DelegationCreated => "access.delegation_created",
            Self::DelegationRevoked => "access.delegation_revoked",
        }
    }
}

/// Fire-and-forget notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessNotification {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Event kind.
    pub kind: AccessNotificationKind,
    /// Subject that performed the change.
    pub actor: String,
    /// Subjects affected by the change.
    pub recipients: Vec<String>,
    /// Assignment or delegation identifier.
    pub resource_id: String,
    /// Human-readable summary.
    pub detail: String,
    /// Change timestamp.
    pub occurred_at: DateTime<Utc>,
}

/// Port for the external notification dispatcher.
///
/// Callers never depend on delivery: errors are logged and dropped.
#[async_trait]
pub trait AccessEventNotifier: Send + Sync {
    /// Hands one notification to the dispatcher.
    async fn notify(&self, notification: AccessNotification) -> AppResult<()>;
}
