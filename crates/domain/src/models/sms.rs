//! SMS verification code models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// What a verification code may be used for. A code issued for one purpose
/// is never accepted for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmsPurpose {
    Register,
    Login,
    ResetPassword,
}

impl SmsPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmsPurpose::Register => "register",
            SmsPurpose::Login => "login",
            SmsPurpose::ResetPassword => "reset_password",
        }
    }
}

impl FromStr for SmsPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "register" => Ok(SmsPurpose::Register),
            "login" => Ok(SmsPurpose::Login),
            "reset_password" => Ok(SmsPurpose::ResetPassword),
            _ => Err(format!("Invalid SMS purpose: {}", s)),
        }
    }
}

impl fmt::Display for SmsPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored verification code. Only the hash of the code is kept.
#[derive(Debug, Clone)]
pub struct SmsCode {
    pub id: Uuid,
    pub phone: String,
    pub purpose: SmsPurpose,
    pub code_hash: String,
    pub attempts: i32,
    pub verified: bool,
    pub consumed: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Failed checks allowed before a code is burned.
pub const MAX_SMS_ATTEMPTS: i32 = 5;

impl SmsCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the code can still be checked against user input.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && !self.is_expired(now) && self.attempts < MAX_SMS_ATTEMPTS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code(now: DateTime<Utc>) -> SmsCode {
        SmsCode {
            id: Uuid::new_v4(),
            phone: "13800138000".to_string(),
            purpose: SmsPurpose::Login,
            code_hash: "hash".to_string(),
            attempts: 0,
            verified: false,
            consumed: false,
            expires_at: now + Duration::minutes(5),
            created_at: now,
        }
    }

    #[test]
    fn test_purpose_round_trip_strings() {
        for purpose in [SmsPurpose::Register, SmsPurpose::Login, SmsPurpose::ResetPassword] {
            assert_eq!(SmsPurpose::from_str(purpose.as_str()).unwrap(), purpose);
        }
        assert!(SmsPurpose::from_str("bind").is_err());
    }

    #[test]
    fn test_purpose_serde() {
        assert_eq!(
            serde_json::to_string(&SmsPurpose::ResetPassword).unwrap(),
            "\"reset_password\""
        );
    }

    #[test]
    fn test_code_usable_until_expiry() {
        let now = Utc::now();
        let c = code(now);
        assert!(c.is_usable(now));
        assert!(c.is_usable(now + Duration::minutes(4)));
        assert!(!c.is_usable(now + Duration::minutes(5)));
    }

    #[test]
    fn test_code_unusable_after_attempts_or_consumption() {
        let now = Utc::now();
        let mut c = code(now);
        c.attempts = MAX_SMS_ATTEMPTS;
        assert!(!c.is_usable(now));

        let mut c = code(now);
        c.consumed = true;
        assert!(!c.is_usable(now));
    }
}
