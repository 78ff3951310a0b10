use serde::{Deserialize, Serialize};

use crate::TenantId;

/// Acting user as asserted by the identity provider.
///
/// The engine trusts these values as given. `is_platform_admin` is the
/// provider's own admin predicate; only the authorization service's override
/// check reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    subject: String,
    tenant_id: TenantId,
    #[serde(default)]
    is_platform_admin: bool,
}

impl UserIdentity {
    /// Creates a non-admin identity for one tenant.
    #[must_use]
    pub fn new(subject: impl Into<String>, tenant_id: TenantId) -> Self {
        Self {
            subject: subject.into(),
            tenant_id,
            is_platform_admin: false,
        }
    }

    /// Sets the identity provider's admin flag.
    #[must_use]
    pub fn with_platform_admin(mut self, is_platform_admin: bool) -> Self {
        self.is_platform_admin = is_platform_admin;
        self
    }

    /// Stable subject claim, used as the user key in every store.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }

    /// Tenant the identity acts in.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns whether the identity provider flagged this user as an administrator.
    #[must_use]
    pub fn is_platform_admin(&self) -> bool {
        self.is_platform_admin
    }
}
