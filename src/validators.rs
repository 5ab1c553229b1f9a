/// Input validators for account data
/// Features:
/// 1. DoS Protection: Input length limits
/// 2. Format checks: email, username, dates, URLs
/// 3. Enumerated fields: role, status, gender
/// 4. Suspicious content: control characters and null bytes

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

use crate::auth::password::MAX_PASSWORD_BYTES;
use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 50;
const MIN_PASSWORD_LENGTH: usize = 6;
const MAX_PHONE_LENGTH: usize = 20;
const MAX_URL_LENGTH: usize = 255;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    static ref USERNAME_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9._+-]+$").unwrap();

    static ref URL_REGEX: Regex = Regex::new(r"^https?://[^\s/$.?#][^\s]*$").unwrap();
}

/// Validates and normalizes an email address (trimmed, lower-cased)
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if trimmed.contains('\0') || trimmed.matches('@').count() != 1 {
        return Err(ValidationError::SuspiciousContent("email".to_string()));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    Ok(trimmed.to_lowercase())
}

/// Validates a username (3..=50 chars, no whitespace or control characters)
pub fn is_valid_username(username: &str) -> Result<String, ValidationError> {
    let trimmed = username.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("username".to_string()));
    }

    let len = trimmed.chars().count();
    if len < MIN_USERNAME_LENGTH {
        return Err(ValidationError::TooShort("username".to_string(), MIN_USERNAME_LENGTH));
    }

    if len > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong("username".to_string(), MAX_USERNAME_LENGTH));
    }

    if !USERNAME_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("username".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates a plaintext password against the length policy.
///
/// The minimum counts characters; the maximum counts bytes, since bcrypt
/// ignores everything past its 72-byte input limit.
pub fn is_valid_password(password: &str) -> Result<(), ValidationError> {
    if password.trim().is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()));
    }

    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password".to_string(), MIN_PASSWORD_LENGTH));
    }

    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ValidationError::TooLong("password".to_string(), MAX_PASSWORD_BYTES));
    }

    Ok(())
}

/// Validates an optional free-text field; empty input becomes `None`.
pub fn optional_text(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    let Some(trimmed) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong(field.to_string(), max));
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent(field.to_string()));
    }

    Ok(Some(trimmed.to_string()))
}

/// Validates an optional phone number (digits, spaces, `+`, `-`, parentheses)
pub fn optional_phone(value: Option<&str>) -> Result<Option<String>, ValidationError> {
    let phone = optional_text("phone", value, MAX_PHONE_LENGTH)?;
    if let Some(ref p) = phone {
        if !p
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'))
        {
            return Err(ValidationError::InvalidFormat("phone".to_string()));
        }
    }
    Ok(phone)
}

/// Validates an optional http(s) URL
pub fn optional_url(field: &str, value: Option<&str>) -> Result<Option<String>, ValidationError> {
    let url = optional_text(field, value, MAX_URL_LENGTH)?;
    if let Some(ref u) = url {
        if !URL_REGEX.is_match(u) {
            return Err(ValidationError::InvalidFormat(field.to_string()));
        }
    }
    Ok(url)
}

/// Parses an optional `YYYY-MM-DD` date
pub fn optional_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, ValidationError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ValidationError::InvalidFormat(field.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com").is_ok());
        assert!(is_valid_email("test.email@domain.co.uk").is_ok());
        assert!(is_valid_email("user+tag@example.com").is_ok());
    }

    #[test]
    fn test_email_is_normalized() {
        assert_eq!(is_valid_email("  Alice@Example.COM ").unwrap(), "alice@example.com");
    }

    #[test]
    fn test_invalid_email_format() {
        assert!(is_valid_email("invalid").is_err());
        assert!(is_valid_email("user@").is_err());
        assert!(is_valid_email("@example.com").is_err());
        assert!(is_valid_email("user@@example.com").is_err());
    }

    #[test]
    fn test_email_length_limits() {
        let too_long = format!("{}@example.com", "a".repeat(250));
        assert!(is_valid_email(&too_long).is_err());
        assert!(is_valid_email("a@b").is_err());
    }

    #[test]
    fn test_username() {
        assert_eq!(is_valid_username(" alice ").unwrap(), "alice");
        assert!(is_valid_username("al").is_err());
        assert!(is_valid_username(&"a".repeat(51)).is_err());
        assert!(is_valid_username("has space").is_err());
        assert!(is_valid_username("").is_err());
    }

    #[test]
    fn test_password_policy() {
        assert!(is_valid_password("correct-pw").is_ok());
        assert!(is_valid_password("short").is_err());
        assert!(is_valid_password("       ").is_err());
        assert!(is_valid_password(&"a".repeat(72)).is_ok());
        assert!(is_valid_password(&"a".repeat(73)).is_err());
        // 25 three-byte characters: short in chars, long in bytes
        assert!(matches!(
            is_valid_password(&"한".repeat(25)),
            Err(ValidationError::TooLong(_, 72))
        ));
    }

    #[test]
    fn test_optional_text() {
        assert_eq!(optional_text("city", None, 10).unwrap(), None);
        assert_eq!(optional_text("city", Some("   "), 10).unwrap(), None);
        assert_eq!(optional_text("city", Some(" Hue "), 10).unwrap(), Some("Hue".to_string()));
        assert!(optional_text("city", Some("x".repeat(11).as_str()), 10).is_err());
        assert!(optional_text("city", Some("bad\0name"), 10).is_err());
    }

    #[test]
    fn test_optional_phone_and_url() {
        assert!(optional_phone(Some("+84 (90) 123-4567")).is_ok());
        assert!(optional_phone(Some("call me")).is_err());
        assert!(optional_url("avatar_url", Some("https://cdn.example.com/a.png")).is_ok());
        assert!(optional_url("avatar_url", Some("javascript:alert(1)")).is_err());
    }

    #[test]
    fn test_optional_date() {
        assert_eq!(
            optional_date("date_of_birth", Some("1990-04-30")).unwrap(),
            NaiveDate::from_ymd_opt(1990, 4, 30)
        );
        assert!(optional_date("date_of_birth", Some("30/04/1990")).is_err());
        assert_eq!(optional_date("date_of_birth", Some("")).unwrap(), None);
    }
}
