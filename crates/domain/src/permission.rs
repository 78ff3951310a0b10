use std::fmt::{Display, Formatter};

use accessledger_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

const IDENTIFIER_MAX_LENGTH: usize = 128;

/// Opaque permission code such as `challenges_view`.
///
/// A well-formed code is not necessarily a known one: only
/// [`crate::PermissionCatalog::validate_code`] decides membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionCode(String);

impl PermissionCode {
    /// Creates a syntactically valid permission code.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        validate_identifier("permission code", value.as_str())?;
        Ok(Self(value))
    }

    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for PermissionCode {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PermissionCode> for String {
    fn from(value: PermissionCode) -> Self {
        value.0
    }
}

impl Display for PermissionCode {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Catalog entry for one grantable capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    /// Permission code.
    pub code: PermissionCode,
    /// Optional human-readable label.
    #[serde(default)]
    pub label: Option<String>,
}

/// Checks the shared identifier grammar used for permission codes and role ids.
///
/// Identifiers start with a lowercase ASCII letter and continue with lowercase
/// letters, digits, `_`, `.`, `:` or `-`.
pub(crate) fn validate_identifier(kind: &str, value: &str) -> AppResult<()> {
    if value.is_empty() {
        return Err(AppError::Validation(format!("{kind} must not be empty")));
    }

    if value.len() > IDENTIFIER_MAX_LENGTH {
        return Err(AppError::Validation(format!(
            "{kind} '{value}' exceeds {IDENTIFIER_MAX_LENGTH} characters"
        )));
    }

    let mut characters = value.chars();
    let starts_with_letter = characters
        .next()
        .is_some_and(|character| character.is_ascii_lowercase());
    let rest_is_valid = characters.all(|character| {
        character.is_ascii_lowercase()
            || character.is_ascii_digit()
            || matches!(character, '_' | '.' | ':' | '-')
    });

    if !starts_with_letter || !rest_is_valid {
        return Err(AppError::Validation(format!(
            "{kind} '{value}' must start with a lowercase letter and contain only [a-z0-9_.:-]"
        )));
    }

    Ok(())
}
