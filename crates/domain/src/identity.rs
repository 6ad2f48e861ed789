//! Identity types shared by the linking flow and the reconciliation engine.

use rolebridge_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Maximum accepted length for opaque platform identifiers.
const IDENTIFIER_MAX_LENGTH: usize = 64;

/// Platform identifiers are embedded in URLs and markup, so the accepted
/// alphabet stays narrow.
fn is_identifier_character(character: char) -> bool {
    character.is_ascii_alphanumeric() || matches!(character, '-' | '_' | '.')
}

/// Opaque chat-platform identifier for a person.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalUserId(String);

impl ExternalUserId {
    /// Creates a validated external user identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let trimmed = value.into().trim().to_owned();

        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "external user id must not be empty".to_owned(),
            ));
        }

        if trimmed.len() > IDENTIFIER_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "external user id must not exceed {IDENTIFIER_MAX_LENGTH} characters"
            )));
        }

        if !trimmed.chars().all(is_identifier_character) {
            return Err(AppError::Validation(
                "external user id contains unsupported characters".to_owned(),
            ));
        }

        Ok(Self(trimmed))
    }

    /// Returns the underlying identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<ExternalUserId> for String {
    fn from(value: ExternalUserId) -> Self {
        value.0
    }
}

impl std::fmt::Display for ExternalUserId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Chat-platform role tag assignable to a user. Drives group policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleId(String);

impl RoleId {
    /// Creates a validated role identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let trimmed = value.into().trim().to_owned();

        if trimmed.is_empty() {
            return Err(AppError::Validation("role id must not be empty".to_owned()));
        }

        if trimmed.len() > IDENTIFIER_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "role id must not exceed {IDENTIFIER_MAX_LENGTH} characters"
            )));
        }

        if !trimmed.chars().all(is_identifier_character) {
            return Err(AppError::Validation(
                "role id contains unsupported characters".to_owned(),
            ));
        }

        Ok(Self(trimmed))
    }

    /// Returns the underlying identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<RoleId> for String {
    fn from(value: RoleId) -> Self {
        value.0
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Validated email address.
///
/// Used for both directory member accounts and directory group addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Creates a validated email address.
    ///
    /// Performs basic structural validation: non-empty, contains exactly one `@`,
    /// local part and domain are non-empty, domain contains at least one `.`.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim().to_lowercase();

        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "email address must not be empty".to_owned(),
            ));
        }

        let parts: Vec<&str> = trimmed.splitn(2, '@').collect();
        if parts.len() != 2 {
            return Err(AppError::Validation(
                "email address must contain exactly one '@'".to_owned(),
            ));
        }

        let local = parts[0];
        let domain = parts[1];

        if local.is_empty() {
            return Err(AppError::Validation(
                "email local part must not be empty".to_owned(),
            ));
        }

        if domain.is_empty() || !domain.contains('.') {
            return Err(AppError::Validation(
                "email domain must contain at least one '.'".to_owned(),
            ));
        }

        if domain.contains('@') {
            return Err(AppError::Validation(
                "email address must contain exactly one '@'".to_owned(),
            ));
        }

        if trimmed.len() > 254 {
            return Err(AppError::Validation(
                "email address must not exceed 254 characters".to_owned(),
            ));
        }

        Ok(Self(trimmed))
    }

    /// Returns the validated email string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_user_id_trims_surrounding_whitespace() {
        let id = ExternalUserId::new("  123456789012345678  ");
        assert!(id.is_ok());
        assert_eq!(
            id.unwrap_or_else(|_| panic!("test")).as_str(),
            "123456789012345678"
        );
    }

    #[test]
    fn empty_external_user_id_is_rejected() {
        assert!(ExternalUserId::new("   ").is_err());
    }

    #[test]
    fn overlong_external_user_id_is_rejected() {
        let long = "9".repeat(65);
        assert!(ExternalUserId::new(long).is_err());
    }

    #[test]
    fn external_user_id_with_path_characters_is_rejected() {
        assert!(ExternalUserId::new("123/456").is_err());
    }

    #[test]
    fn empty_role_id_is_rejected() {
        assert!(RoleId::new("").is_err());
    }

    #[test]
    fn role_id_with_markup_characters_is_rejected() {
        assert!(RoleId::new("<admin>").is_err());
    }

    #[test]
    fn role_id_preserves_value() {
        let role = RoleId::new("987654321098765432");
        assert!(role.is_ok());
        assert_eq!(
            role.unwrap_or_else(|_| panic!("test")).as_str(),
            "987654321098765432"
        );
    }

    #[test]
    fn valid_email_is_lowercased() {
        let email = EmailAddress::new("USER@Example.COM");
        assert!(email.is_ok());
        assert_eq!(
            email.unwrap_or_else(|_| panic!("test")).as_str(),
            "user@example.com"
        );
    }

    #[test]
    fn email_without_at_is_rejected() {
        assert!(EmailAddress::new("noatsign").is_err());
    }

    #[test]
    fn email_with_two_ats_is_rejected() {
        assert!(EmailAddress::new("user@host@example.com").is_err());
    }

    #[test]
    fn email_without_domain_dot_is_rejected() {
        assert!(EmailAddress::new("user@nodot").is_err());
    }

    #[test]
    fn empty_email_is_rejected() {
        assert!(EmailAddress::new("").is_err());
    }

    #[test]
    fn overlong_email_is_rejected() {
        let local = "a".repeat(250);
        assert!(EmailAddress::new(format!("{local}@example.com")).is_err());
    }
}
