//! Common validation utilities.

use chrono::NaiveTime;
use regex::Regex;
use validator::ValidationError;

lazy_static::lazy_static! {
    /// Mainland China mobile numbers: 11 digits starting with 13-19.
    static ref PHONE_REGEX: Regex = Regex::new(r"^1[3-9]\d{9}$").unwrap();
    /// Usernames start with a letter and contain letters, digits or underscores.
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]{2,31}$").unwrap();
    static ref SMS_CODE_REGEX: Regex = Regex::new(r"^\d{6}$").unwrap();
}

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Validates a mobile phone number.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if PHONE_REGEX.is_match(phone) {
        Ok(())
    } else {
        Err(error("phone_format", "Invalid phone number"))
    }
}

/// Validates a username for password-only registration.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if USERNAME_REGEX.is_match(username) {
        Ok(())
    } else {
        Err(error(
            "username_format",
            "Username must be 3-32 characters, start with a letter and contain only letters, digits or underscores",
        ))
    }
}

/// Validates a six-digit SMS verification code.
pub fn validate_sms_code(code: &str) -> Result<(), ValidationError> {
    if SMS_CODE_REGEX.is_match(code) {
        Ok(())
    } else {
        Err(error("sms_code_format", "Verification code must be 6 digits"))
    }
}

/// Parses a wall-clock time written as `HH:MM`.
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let (h, m) = value.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, 0)
}

/// Validates a wall-clock time written as `HH:MM`.
pub fn validate_time_of_day(value: &str) -> Result<(), ValidationError> {
    parse_time_of_day(value)
        .map(|_| ())
        .ok_or_else(|| error("time_format", "Time must be formatted as HH:MM"))
}

/// Returns true when the account identifier looks like a phone number.
pub fn is_phone_number(account: &str) -> bool {
    PHONE_REGEX.is_match(account)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("13800138000").is_ok());
        assert!(validate_phone("19912345678").is_ok());
        assert!(validate_phone("12800138000").is_err());
        assert!(validate_phone("1380013800").is_err());
        assert!(validate_phone("138001380001").is_err());
        assert!(validate_phone("+8613800138000").is_err());
    }

    #[test]
    fn test_validate_phone_error_message() {
        let err = validate_phone("abc").unwrap_err();
        assert_eq!(err.message.unwrap().to_string(), "Invalid phone number");
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("bob_2024").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("1alice").is_err());
        assert!(validate_username("al ice").is_err());
        assert!(validate_username(&format!("a{}", "b".repeat(32))).is_err());
    }

    #[test]
    fn test_validate_sms_code() {
        assert!(validate_sms_code("012345").is_ok());
        assert!(validate_sms_code("12345").is_err());
        assert!(validate_sms_code("12345a").is_err());
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(
            parse_time_of_day("02:30"),
            NaiveTime::from_hms_opt(2, 30, 0)
        );
        assert_eq!(parse_time_of_day("23:59"), NaiveTime::from_hms_opt(23, 59, 0));
        assert!(parse_time_of_day("24:00").is_none());
        assert!(parse_time_of_day("2:30").is_none());
        assert!(parse_time_of_day("02:60").is_none());
        assert!(parse_time_of_day("0230").is_none());
    }

    #[test]
    fn test_validate_time_of_day() {
        assert!(validate_time_of_day("00:00").is_ok());
        assert!(validate_time_of_day("noon").is_err());
    }

    #[test]
    fn test_is_phone_number() {
        assert!(is_phone_number("13800138000"));
        assert!(!is_phone_number("alice"));
    }
}
