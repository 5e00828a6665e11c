//! Credential format rules applied before anything is persisted.

use validator::ValidateEmail;

use super::ServiceError;

pub const PASSWORD_MIN_LENGTH: usize = 6;
pub const PASSWORD_MAX_LENGTH: usize = 128;

/// Errors related to credential policy validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    InvalidEmail,
    PasswordTooShort { min_length: usize, actual_length: usize },
    PasswordTooLong { max_length: usize },
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::InvalidEmail => write!(f, "Invalid email address"),
            PolicyError::PasswordTooShort {
                min_length,
                actual_length,
            } => write!(
                f,
                "Password must be at least {} characters (got {})",
                min_length, actual_length
            ),
            PolicyError::PasswordTooLong { max_length } => {
                write!(f, "Password must be at most {} characters", max_length)
            }
        }
    }
}

impl std::error::Error for PolicyError {}

impl From<PolicyError> for ServiceError {
    fn from(err: PolicyError) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PolicyService;

impl PolicyService {
    pub fn validate_email(email: &str) -> Result<(), PolicyError> {
        if email.validate_email() {
            Ok(())
        } else {
            Err(PolicyError::InvalidEmail)
        }
    }

    /// Length is counted in characters, not bytes.
    pub fn validate_password(password: &str) -> Result<(), PolicyError> {
        let length = password.chars().count();
        if length < PASSWORD_MIN_LENGTH {
            return Err(PolicyError::PasswordTooShort {
                min_length: PASSWORD_MIN_LENGTH,
                actual_length: length,
            });
        }
        if length > PASSWORD_MAX_LENGTH {
            return Err(PolicyError::PasswordTooLong {
                max_length: PASSWORD_MAX_LENGTH,
            });
        }
        Ok(())
    }

    /// Emails are compared case-insensitively everywhere.
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_length_bounds() {
        assert_eq!(
            PolicyService::validate_password("12345"),
            Err(PolicyError::PasswordTooShort {
                min_length: 6,
                actual_length: 5
            })
        );
        assert!(PolicyService::validate_password("Secret1!").is_ok());
        assert!(PolicyService::validate_password(&"a".repeat(128)).is_ok());
        assert!(matches!(
            PolicyService::validate_password(&"a".repeat(129)),
            Err(PolicyError::PasswordTooLong { .. })
        ));
    }

    #[test]
    fn test_password_counts_chars() {
        // five characters, ten bytes
        assert!(PolicyService::validate_password("ééééé").is_err());
        assert!(PolicyService::validate_password("éééééé").is_ok());
    }

    #[test]
    fn test_email_format() {
        assert!(PolicyService::validate_email("alice@example.com").is_ok());
        assert_eq!(
            PolicyService::validate_email("not-an-email"),
            Err(PolicyError::InvalidEmail)
        );
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            PolicyService::normalize_email("  Alice@Example.COM "),
            "alice@example.com"
        );
    }

    #[test]
    fn test_policy_error_maps_to_invalid_input() {
        let err: ServiceError = PolicyError::InvalidEmail.into();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }
}
