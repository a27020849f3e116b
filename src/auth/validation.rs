//! Declarative checks for the sign-up and sign-in forms. Every field
//! defaults to empty so a missing field fails validation instead of
//! failing extraction.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("name is required")]
    NameRequired,
    #[error("invalid email")]
    InvalidEmail,
    #[error("password is required")]
    PasswordRequired,
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    PasswordTooShort,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// Page that sent the user to sign in.
    #[serde(default, rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

#[derive(Debug)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl RegisterForm {
    pub fn validate(self) -> Result<Registration, Vec<FieldError>> {
        let mut errors = Vec::new();
        let name = self.name.trim().to_string();
        let email = normalize_email(&self.email);

        if name.is_empty() {
            errors.push(FieldError::NameRequired);
        }
        if !is_valid_email(&email) {
            errors.push(FieldError::InvalidEmail);
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(FieldError::PasswordTooShort);
        }

        if errors.is_empty() {
            Ok(Registration {
                name,
                email,
                password: self.password,
            })
        } else {
            Err(errors)
        }
    }
}

impl LoginForm {
    pub fn validate(self) -> Result<Credentials, Vec<FieldError>> {
        let mut errors = Vec::new();
        let email = normalize_email(&self.email);

        if !is_valid_email(&email) {
            errors.push(FieldError::InvalidEmail);
        }
        if self.password.is_empty() {
            errors.push(FieldError::PasswordRequired);
        }

        if errors.is_empty() {
            Ok(Credentials {
                email,
                password: self.password,
            })
        } else {
            Err(errors)
        }
    }
}
