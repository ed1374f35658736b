//! Account validation.

use super::model::{Account, AuthMethod};

/// Validation error for account configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Account name is empty.
    EmptyName,
    /// Email address is empty.
    EmptyEmail,
    /// Email address format is invalid.
    InvalidEmail,
    /// IMAP host is empty.
    EmptyHost,
    /// IMAP port is zero.
    InvalidPort,
    /// Password auth without a password.
    EmptyPassword,
    /// No folders to digest.
    NoFolders,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyName => "Account name is required",
            Self::EmptyEmail => "Email address is required",
            Self::InvalidEmail => "Invalid email address format",
            Self::EmptyHost => "IMAP server is required",
            Self::InvalidPort => "IMAP port must be 1-65535",
            Self::EmptyPassword => "Password is required for password authentication",
            Self::NoFolders => "At least one folder is required",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyName => "name",
            Self::EmptyEmail | Self::InvalidEmail => "email",
            Self::EmptyHost => "host",
            Self::InvalidPort => "port",
            Self::EmptyPassword => "auth.password",
            Self::NoFolders => "folders",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating an account.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate an account configuration.
///
/// # Errors
///
/// Returns every problem found, not just the first.
pub fn validate_account(account: &Account) -> ValidationResult {
    let mut errors = Vec::new();

    if account.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }

    if account.email.trim().is_empty() {
        errors.push(ValidationError::EmptyEmail);
    } else if !is_valid_email(&account.email) {
        errors.push(ValidationError::InvalidEmail);
    }

    if account.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if account.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }
    if let AuthMethod::Password { password } = &account.auth {
        if password.is_empty() {
            errors.push(ValidationError::EmptyPassword);
        }
    }
    if account.folders.iter().all(|f| f.trim().is_empty()) {
        errors.push(ValidationError::NoFolders);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Basic email validation: one `@`, non-empty local part, dotted domain.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.trim().split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|p| !p.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn valid() -> Account {
        Account::new(
            "work",
            "me@example.com",
            "imap.example.com",
            AuthMethod::Password {
                password: "pw".into(),
            },
        )
    }

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("user.name@sub.example.com"));
    }

    #[test]
    fn test_invalid_email() {
        for email in ["", "user", "@example.com", "user@", "user@example", "user@@example.com"] {
            assert!(!is_valid_email(email), "{email}");
        }
    }

    #[test]
    fn test_valid_account() {
        assert!(validate_account(&valid()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut account = valid();
        account.name = " ".into();
        account.host = String::new();
        account.port = 0;
        account.folders.clear();
        account.auth = AuthMethod::Password {
            password: String::new(),
        };

        let errors = validate_account(&account).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyName,
                ValidationError::EmptyHost,
                ValidationError::InvalidPort,
                ValidationError::EmptyPassword,
                ValidationError::NoFolders,
            ]
        );
        assert_eq!(errors[3].field(), "auth.password");
    }

    #[test]
    fn test_oauth_account_needs_no_password() {
        let mut account = valid();
        account.auth = AuthMethod::OAuth2;
        assert!(validate_account(&account).is_ok());
    }
}
