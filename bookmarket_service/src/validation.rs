use std::sync::LazyLock;

use regex::Regex;

use crate::api::{Book, User};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w\-.]+@([\w-]+\.)+[\w-]{2,4}$").expect("email pattern is valid")
});

pub const PASSWORD_MIN_LENGTH: usize = 8;
pub const PASSWORD_MAX_LENGTH: usize = 40;

#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
#[error("{field} - {message}")]
/// Field level rejection of a document write
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if EMAIL_PATTERN.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::new(
            "email",
            format!("'{email}' is not a valid email!"),
        ))
    }
}

/// Checks plain text password before it is hashed
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();
    if (PASSWORD_MIN_LENGTH..=PASSWORD_MAX_LENGTH).contains(&length) {
        Ok(())
    } else {
        Err(ValidationError::new(
            "password",
            format!(
                "must be between {PASSWORD_MIN_LENGTH} and {PASSWORD_MAX_LENGTH} characters long"
            ),
        ))
    }
}

pub fn validate_user(user: &User) -> Result<(), ValidationError> {
    if user.id.is_empty() {
        return Err(ValidationError::new("id", "is required"));
    }
    if user.name.trim().is_empty() {
        return Err(ValidationError::new("name", "is required"));
    }
    if user.password.is_empty() {
        return Err(ValidationError::new("password", "is required"));
    }
    validate_email(&user.email)
}

pub fn validate_book(book: &Book) -> Result<(), ValidationError> {
    if book.id.is_empty() {
        return Err(ValidationError::new("id", "is required"));
    }
    if book.title.trim().is_empty() {
        return Err(ValidationError::new("title", "is required"));
    }
    if book.authors.trim().is_empty() {
        return Err(ValidationError::new("authors", "is required"));
    }
    if book.publisher.trim().is_empty() {
        return Err(ValidationError::new("publisher", "is required"));
    }
    if book.pages < 1 {
        return Err(ValidationError::new("pages", "must be a positive number"));
    }
    if !book.price.is_finite() || book.price < 0.0 {
        return Err(ValidationError::new("price", "must be a non negative number"));
    }
    if book.seller.id().is_empty() {
        return Err(ValidationError::new("seller", "is required"));
    }
    Ok(())
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn email_format() {
        assert!(validate_email("ku.ry@gmo.go").is_ok());
        assert!(validate_email("first-last@mail.example.com").is_ok());
        assert!(validate_email("no-at-sign.com").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a@b.toolongtld").is_err());
    }

    #[test]
    fn password_length() {
        assert!(validate_password("fries1324").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"x".repeat(41)).is_err());
    }
}
