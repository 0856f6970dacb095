//! Request validation: field rules and a JSON extractor whose rejections
//! render like every other client error.

use axum::{
    Json,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

pub const MAX_TEXT_LEN: usize = 255;
const PASSWORD_SPECIALS: &str = "!@#$%^&*";

/// `axum::Json`, but malformed bodies and unknown fields become a 400
/// `fail` response instead of axum's plain-text rejection.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Trim and lowercase an email after checking it looks like `local@domain.tld`.
pub fn normalize_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    let invalid = || ApiError::bad_request("Please provide a valid email");

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    let strong = password.chars().count() >= 8
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SPECIALS.contains(c));

    if strong {
        Ok(())
    } else {
        Err(ApiError::bad_request(
            "Password must have at least one lowercase, one uppercase, one number, \
             one special character, and be at least 8 characters long",
        ))
    }
}

pub fn require_same(a: &str, b: &str, message: &str) -> Result<(), ApiError> {
    if a == b {
        Ok(())
    } else {
        Err(ApiError::bad_request(message))
    }
}

pub fn validate_otp(otp: &str) -> Result<(), ApiError> {
    if otp.len() == notecast_auth::otp::OTP_LEN && otp.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ApiError::bad_request("OTP must be a 5-digit number"))
    }
}

/// Non-empty after trimming and at most 255 characters. Returns the trimmed text.
pub fn validate_text(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{} is required", field)));
    }
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(ApiError::bad_request(format!(
            "{} must be at most {} characters",
            field, MAX_TEXT_LEN
        )));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails() {
        assert_eq!(normalize_email("  Ann@Example.COM ").unwrap(), "ann@example.com");
        assert!(normalize_email("ann@example.co.uk").is_ok());
        for bad in ["", "ann", "ann@", "@example.com", "ann@example", "ann@@example.com", "an n@example.com", "ann@example."] {
            assert!(normalize_email(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn passwords() {
        assert!(validate_password("Secret#123").is_ok());
        assert!(validate_password("Sh#1rt").is_err());
        assert!(validate_password("secret#123").is_err());
        assert!(validate_password("SECRET#123").is_err());
        assert!(validate_password("Secret#abc").is_err());
        assert!(validate_password("Secret1234").is_err());
    }

    #[test]
    fn otps() {
        assert!(validate_otp("01234").is_ok());
        assert!(validate_otp("1234").is_err());
        assert!(validate_otp("123456").is_err());
        assert!(validate_otp("12a45").is_err());
    }

    #[test]
    fn text_fields() {
        assert_eq!(validate_text("title", "  Party ").unwrap(), "Party");
        assert!(validate_text("title", "   ").is_err());
        assert!(validate_text("title", &"x".repeat(255)).is_ok());
        assert!(validate_text("title", &"x".repeat(256)).is_err());
    }
}
