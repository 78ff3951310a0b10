use std::collections::{BTreeMap, BTreeSet};

use accessledger_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::{PermissionCode, PermissionDefinition, RoleDefinition, RoleId};

/// One audit check in the fixed validation catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDefinition {
    /// Category grouping the check.
    pub category_id: String,
    /// Check identifier, unique across the catalog.
    pub check_id: String,
    /// Optional human-readable label.
    #[serde(default)]
    pub label: Option<String>,
}

/// Permission codes guarding the engine's own operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineGuards {
    /// Required to assign or revoke functional roles and to read other users' roles.
    pub roles_manage: PermissionCode,
    /// Required to manage delegations on behalf of another delegator.
    pub delegations_manage: PermissionCode,
    /// Required to read checklist rows and summaries.
    pub checklist_read: PermissionCode,
    /// Required to initialize systems and change checks.
    pub checklist_write: PermissionCode,
    /// Required to wipe a system's checklist.
    pub checklist_reset: PermissionCode,
}

impl EngineGuards {
    fn codes(&self) -> [(&'static str, &PermissionCode); 5] {
        [
            ("roles_manage", &self.roles_manage),
            ("delegations_manage", &self.delegations_manage),
            ("checklist_read", &self.checklist_read),
            ("checklist_write", &self.checklist_write),
            ("checklist_reset", &self.checklist_reset),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    version: String,
    permissions: Vec<PermissionDefinition>,
    #[serde(default)]
    roles: Vec<RoleDefinition>,
    #[serde(default)]
    checks: Vec<CheckDefinition>,
    guards: EngineGuards,
}

/// Versioned, immutable catalog of permissions, roles and validation checks.
///
/// Loaded once at process start. Every permission reference elsewhere in the
/// engine is checked against this catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCatalog {
    version: String,
    permissions: BTreeMap<PermissionCode, PermissionDefinition>,
    roles: BTreeMap<RoleId, RoleDefinition>,
    checks: Vec<CheckDefinition>,
    guards: EngineGuards,
}

impl PermissionCatalog {
    /// Builds and validates a catalog.
    pub fn new(
        version: impl Into<String>,
        permissions: Vec<PermissionDefinition>,
        roles: Vec<RoleDefinition>,
        checks: Vec<CheckDefinition>,
        guards: EngineGuards,
    ) -> AppResult<Self> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(AppError::Validation(
                "permission catalog version must not be empty".to_owned(),
            ));
        }

        let mut permission_map = BTreeMap::new();
        for permission in permissions {
            let code = permission.code.clone();
            if permission_map.insert(code.clone(), permission).is_some() {
                return Err(AppError::Validation(format!(
                    "permission catalog declares '{code}' more than once"
                )));
            }
        }

        let mut role_map = BTreeMap::new();
        for role in roles {
            if let Some(unknown) = role
                .permissions
                .iter()
                .find(|code| !permission_map.contains_key(*code))
            {
                return Err(AppError::UnknownPermission(format!(
                    "role '{}' references unknown permission '{unknown}'",
                    role.role_id
                )));
            }

            let role_id = role.role_id.clone();
            if role_map.insert(role_id.clone(), role).is_some() {
                return Err(AppError::Validation(format!(
                    "permission catalog declares role '{role_id}' more than once"
                )));
            }
        }

        let mut check_ids = BTreeSet::new();
        for check in &checks {
            if check.check_id.trim().is_empty() || check.category_id.trim().is_empty() {
                return Err(AppError::Validation(
                    "validation checks require non-empty category_id and check_id".to_owned(),
                ));
            }
            if !check_ids.insert(check.check_id.as_str()) {
                return Err(AppError::Validation(format!(
                    "validation check '{}' is declared more than once",
                    check.check_id
                )));
            }
        }

        for (guard_name, code) in guards.codes() {
            if !permission_map.contains_key(code) {
                return Err(AppError::UnknownPermission(format!(
                    "guard '{guard_name}' references unknown permission '{code}'"
                )));
            }
        }

        Ok(Self {
            version,
            permissions: permission_map,
            roles: role_map,
            checks,
            guards,
        })
    }

    /// Parses and validates a JSON catalog document.
    pub fn from_json(raw: &str) -> AppResult<Self> {
        let document: CatalogDocument = serde_json::from_str(raw).map_err(|error| {
            AppError::Validation(format!("invalid permission catalog document: {error}"))
        })?;

        Self::new(
            document.version,
            document.permissions,
            document.roles,
            document.checks,
            document.guards,
        )
    }

    /// Returns the catalog version label.
    #[must_use]
    pub fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Returns all permissions ordered by code.
    #[must_use]
    pub fn list_permissions(&self) -> Vec<PermissionDefinition> {
        self.permissions.values().cloned().collect()
    }

    /// Returns all roles ordered by identifier.
    #[must_use]
    pub fn list_roles(&self) -> Vec<RoleDefinition> {
        self.roles.values().cloned().collect()
    }

    /// Returns the validation checks in catalog order.
    #[must_use]
    pub fn list_checks(&self) -> &[CheckDefinition] {
        self.checks.as_slice()
    }

    /// Returns the guard permissions for engine operations.
    #[must_use]
    pub fn guards(&self) -> &EngineGuards {
        &self.guards
    }

    /// Returns whether a code is part of the catalog.
    #[must_use]
    pub fn contains(&self, code: &PermissionCode) -> bool {
        self.permissions.contains_key(code)
    }

    /// Resolves a raw code against the catalog.
    pub fn validate_code(&self, code: &str) -> AppResult<PermissionCode> {
        let parsed = PermissionCode::new(code)
            .map_err(|_| AppError::UnknownPermission(format!("'{code}' is not a permission")))?;

        if !self.contains(&parsed) {
            return Err(AppError::UnknownPermission(format!(
                "'{code}' is not in permission catalog '{}'",
                self.version
            )));
        }

        Ok(parsed)
    }

    /// Resolves many raw codes, failing on the first unknown one.
    pub fn validate_codes<I, S>(&self, codes: I) -> AppResult<BTreeSet<PermissionCode>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        codes
            .into_iter()
            .map(|code| self.validate_code(code.as_ref()))
            .collect()
    }

    /// Finds a role by identifier.
    #[must_use]
    pub fn find_role(&self, role_id: &RoleId) -> Option<&RoleDefinition> {
        self.roles.get(role_id)
    }

    /// Resolves a raw role identifier against the catalog.
    pub fn role(&self, role_id: &str) -> AppResult<&RoleDefinition> {
        RoleId::new(role_id)
            .ok()
            .and_then(|role_id| self.roles.get(&role_id))
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))
    }

    /// Returns the permissions a role grants, expanding the all-permissions marker.
    #[must_use]
    pub fn role_permissions(&self, role: &RoleDefinition) -> BTreeSet<PermissionCode> {
        if role.grants_all {
            return self.permissions.keys().cloned().collect();
        }

        role.permissions.clone()
    }

    /// Finds a validation check by identifier.
    #[must_use]
    pub fn find_check(&self, check_id: &str) -> Option<&CheckDefinition> {
        self.checks.iter().find(|check| check.check_id == check_id)
    }
}
