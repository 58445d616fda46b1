//! User account domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Represents a user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub phone: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)] // Never serialize password hash to API responses
    pub password_hash: Option<String>,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub alipay_user_id: Option<String>,
    pub google_id: Option<String>,
    pub google_email: Option<String>,
    pub is_premium: bool,
    pub subscription_status: SubscriptionStatus,
    pub trial_start_time: DateTime<Utc>,
    pub payment_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Name shown in the app when the user has not set a nickname.
    pub fn display_name(&self) -> String {
        if let Some(nickname) = self.nickname.as_deref().filter(|n| !n.is_empty()) {
            return nickname.to_string();
        }
        if let Some(phone) = &self.phone {
            return mask_phone(phone);
        }
        if let Some(username) = &self.username {
            return username.clone();
        }
        "OffTimes User".to_string()
    }

    /// Providers this account can sign in with.
    pub fn linked_providers(&self) -> Vec<LoginProvider> {
        let mut providers = Vec::new();
        if self.password_hash.is_some() {
            providers.push(LoginProvider::Password);
        }
        if self.phone.is_some() {
            providers.push(LoginProvider::Sms);
        }
        if self.alipay_user_id.is_some() {
            providers.push(LoginProvider::Alipay);
        }
        if self.google_id.is_some() {
            providers.push(LoginProvider::Google);
        }
        providers
    }
}

/// Masks the middle four digits of a phone number: `138****8000`.
pub fn mask_phone(phone: &str) -> String {
    if phone.len() == 11 && phone.is_ascii() {
        format!("{}****{}", &phone[..3], &phone[7..])
    } else {
        phone.to_string()
    }
}

/// How a session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginProvider {
    Password,
    Sms,
    Alipay,
    Google,
}

impl LoginProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginProvider::Password => "password",
            LoginProvider::Sms => "sms",
            LoginProvider::Alipay => "alipay",
            LoginProvider::Google => "google",
        }
    }
}

impl FromStr for LoginProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(LoginProvider::Password),
            "sms" => Ok(LoginProvider::Sms),
            "alipay" => Ok(LoginProvider::Alipay),
            "google" => Ok(LoginProvider::Google),
            _ => Err(format!("Invalid login provider: {}", s)),
        }
    }
}

impl fmt::Display for LoginProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Paid state of an account, independent of the trial window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    #[default]
    Trial,
    Active,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trial" => Ok(SubscriptionStatus::Trial),
            "active" => Ok(SubscriptionStatus::Active),
            "expired" => Ok(SubscriptionStatus::Expired),
            _ => Err(format!("Invalid subscription status: {}", s)),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents an active refresh session.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub refresh_token_hash: String,
    pub provider: LoginProvider,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}
