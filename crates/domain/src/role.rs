use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use accessledger_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::PermissionCode;
use crate::permission::validate_identifier;

/// Stable functional role identifier such as `staff`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleId(String);

impl RoleId {
    /// Creates a syntactically valid role identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        validate_identifier("role id", value.as_str())?;
        Ok(Self(value))
    }

    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for RoleId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoleId> for String {
    fn from(value: RoleId) -> Self {
        value.0
    }
}

impl Display for RoleId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Named set of permission codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    /// Stable role identifier.
    pub role_id: RoleId,
    /// Display name shown in administration views.
    pub display_name: String,
    /// Permissions granted by the role.
    #[serde(default)]
    pub permissions: BTreeSet<PermissionCode>,
    /// All-permissions marker. Holders of an active assignment to such a role
    /// pass every check through the admin override.
    #[serde(default)]
    pub grants_all: bool,
}

/// Record linking a subject to a functional role.
///
/// Assignments are deactivated on revocation rather than deleted, and the
/// role pointer never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Stable assignment identifier.
    pub assignment_id: Uuid,
    /// Subject holding the role.
    pub subject: String,
    /// Assigned role.
    pub role_id: RoleId,
    /// Whether the assignment currently grants permissions.
    pub is_active: bool,
    /// Assignment timestamp.
    pub assigned_at: DateTime<Utc>,
    /// Subject that granted the role.
    pub assigned_by: String,
    /// Revocation timestamp, when revoked.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Subject that revoked the role, when revoked.
    pub revoked_by: Option<String>,
}

impl RoleAssignment {
    /// Creates a new active assignment.
    #[must_use]
    pub fn new_active(
        subject: impl Into<String>,
        role_id: RoleId,
        assigned_by: impl Into<String>,
        assigned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            assignment_id: Uuid::new_v4(),
            subject: subject.into(),
            role_id,
            is_active: true,
            assigned_at,
            assigned_by: assigned_by.into(),
            revoked_at: None,
            revoked_by: None,
        }
    }

    /// Deactivates the assignment, keeping it for the audit trail.
    pub fn deactivate(&mut self, revoked_by: impl Into<String>, revoked_at: DateTime<Utc>) {
        self.is_active = false;
        self.revoked_by = Some(revoked_by.into());
        self.revoked_at = Some(revoked_at);
    }
}
