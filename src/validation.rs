//! Input checks applied before a request reaches login or registration.
//!
//! The rules live on the input types as `validator` derives; this module turns
//! their report into [`AuthError::Validation`] with fields in a stable order.

use validator::Validate;

use crate::error::{AuthError, ValidationErrors};
use crate::login::{Credentials, Registration};

pub const PASSWORD_MIN_LEN: u64 = 12;
pub const PASSWORD_MAX_LEN: u64 = 50;

/// Input that can be checked before it is acted on.
pub trait CheckInput: Validate {
    /// Field names in the order errors are reported.
    const FIELDS: &'static [&'static str];

    fn check(&self) -> Result<(), AuthError> {
        match self.validate() {
            Ok(()) => Ok(()),
            Err(errors) => Err(AuthError::Validation(collect(&errors, Self::FIELDS))),
        }
    }
}

impl CheckInput for Credentials {
    const FIELDS: &'static [&'static str] = &["email", "password"];
}

impl CheckInput for Registration {
    const FIELDS: &'static [&'static str] = &["email", "password", "confirm_password"];
}

fn collect(errors: &validator::ValidationErrors, order: &[&'static str]) -> ValidationErrors {
    let by_field = errors.field_errors();
    let mut collected = ValidationErrors::default();
    for &field in order {
        let Some(field_errors) = by_field.get(field) else {
            continue;
        };
        for error in field_errors.iter() {
            let message = match &error.message {
                Some(message) => message.to_string(),
                None => error.code.to_string(),
            };
            collected.push(field, message);
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(email: &str, password: &str, confirm: &str) -> Registration {
        Registration {
            email: email.to_string(),
            password: password.to_string(),
            confirm_password: confirm.to_string(),
        }
    }

    fn credentials(email: &str) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: "x".to_string(),
        }
    }

    fn fields(err: AuthError) -> Vec<&'static str> {
        match err {
            AuthError::Validation(errors) => errors.fields.iter().map(|f| f.field).collect(),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_email_shapes() {
        assert!(credentials("bob@example.com").check().is_ok());
        assert!(credentials("first.last+tag@mail.example.co.uk").check().is_ok());
        for bad in [
            "bob",
            "@example.com",
            "bob@@example.com",
            "bob smith@example.com",
        ] {
            assert_eq!(fields(credentials(bad).check().unwrap_err()), vec!["email"], "{}", bad);
        }
        let long_local = format!("{}@example.com", "a".repeat(250));
        assert!(credentials(&long_local).check().is_err());
    }

    #[test]
    fn test_valid_registration() {
        assert!(
            registration("bob@example.com", "Password123456", "Password123456")
                .check()
                .is_ok()
        );
    }

    #[test]
    fn test_password_length_bounds() {
        let short = "a".repeat(PASSWORD_MIN_LEN as usize - 1);
        let err = registration("bob@example.com", &short, &short)
            .check()
            .unwrap_err();
        assert_eq!(fields(err), vec!["password", "confirm_password"]);

        let long = "a".repeat(PASSWORD_MAX_LEN as usize + 1);
        assert!(registration("bob@example.com", &long, &long).check().is_err());

        let exact = "a".repeat(PASSWORD_MAX_LEN as usize);
        assert!(registration("bob@example.com", &exact, &exact).check().is_ok());
    }

    #[test]
    fn test_confirmation_must_match() {
        let err = registration("bob@example.com", "Password123456", "Password654321")
            .check()
            .unwrap_err();
        match err {
            AuthError::Validation(errors) => {
                assert_eq!(errors.fields.len(), 1);
                assert_eq!(errors.fields[0].field, "confirm_password");
                assert_eq!(errors.fields[0].message, "must match password");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_login_requires_both_fields() {
        let creds = Credentials {
            email: String::new(),
            password: String::new(),
        };
        assert_eq!(fields(creds.check().unwrap_err()), vec!["email", "password"]);
    }

    #[test]
    fn test_login_does_not_check_password_length() {
        let creds = Credentials {
            email: "bob@example.com".to_string(),
            password: "short".to_string(),
        };
        assert!(creds.check().is_ok());
    }
}
