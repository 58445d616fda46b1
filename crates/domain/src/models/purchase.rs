//! In-app purchase domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::user::SubscriptionStatus;

/// Store the purchase was made through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPlatform {
    Alipay,
    GooglePlay,
}

impl PaymentPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentPlatform::Alipay => "alipay",
            PaymentPlatform::GooglePlay => "google_play",
        }
    }
}

impl FromStr for PaymentPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alipay" => Ok(PaymentPlatform::Alipay),
            "google_play" => Ok(PaymentPlatform::GooglePlay),
            _ => Err(format!("Invalid payment platform: {}", s)),
        }
    }
}

impl fmt::Display for PaymentPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A verified purchase claimed by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub platform: PaymentPlatform,
    pub product_id: String,
    pub order_id: String,
    #[serde(skip_serializing)]
    pub purchase_token: Option<String>,
    pub amount_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Request to verify and claim a purchase.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPurchaseRequest {
    pub platform: PaymentPlatform,
    #[validate(length(min = 1, max = 128, message = "Product id must be 1-128 characters"))]
    pub product_id: String,
    #[validate(length(min = 1, max = 128, message = "Order id must be 1-128 characters"))]
    pub order_id: String,
    #[validate(length(max = 4096))]
    pub purchase_token: Option<String>,
    #[validate(range(min = 0, message = "Amount cannot be negative"))]
    pub amount_cents: Option<i64>,
}

/// Request to restore premium from earlier purchases.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RestorePurchasesRequest {
    #[validate(length(max = 50, message = "At most 50 order ids"))]
    pub order_ids: Option<Vec<String>>,
}

/// Trial window as reported to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrialInfo {
    pub trial_start_time: DateTime<Utc>,
    pub trial_end_time: DateTime<Utc>,
    pub in_trial: bool,
    pub remaining_trial_days: i64,
}

/// Response for the purchase status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseStatusResponse {
    pub is_premium: bool,
    pub subscription_status: SubscriptionStatus,
    pub payment_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub trial: TrialInfo,
    pub has_access: bool,
    pub purchases: Vec<PurchaseRecord>,
}

/// Which payment platforms the server can verify.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfigStatus {
    pub alipay: bool,
    pub google_play: bool,
}

impl PaymentConfigStatus {
    pub fn is_configured(&self, platform: PaymentPlatform) -> bool {
        match platform {
            PaymentPlatform::Alipay => self.alipay,
            PaymentPlatform::GooglePlay => self.google_play,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_platform_serde() {
        let p: PaymentPlatform = serde_json::from_value(json!("google_play")).unwrap();
        assert_eq!(p, PaymentPlatform::GooglePlay);
        assert_eq!(PaymentPlatform::from_str("alipay").unwrap(), PaymentPlatform::Alipay);
        assert!(PaymentPlatform::from_str("paypal").is_err());
    }

    #[test]
    fn test_verify_request_validation() {
        let req: VerifyPurchaseRequest = serde_json::from_value(json!({
            "platform": "alipay",
            "productId": "premium_lifetime",
            "orderId": "2024030122001"
        }))
        .unwrap();
        assert!(req.validate().is_ok());

        let empty_order = VerifyPurchaseRequest {
            order_id: String::new(),
            ..req.clone()
        };
        assert!(empty_order.validate().is_err());

        let negative = VerifyPurchaseRequest {
            amount_cents: Some(-1),
            ..req
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_config_status() {
        let status = PaymentConfigStatus {
            alipay: true,
            google_play: false,
        };
        assert!(status.is_configured(PaymentPlatform::Alipay));
        assert!(!status.is_configured(PaymentPlatform::GooglePlay));
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            json!({"alipay": true, "googlePlay": false})
        );
    }

    #[test]
    fn test_purchase_record_hides_token() {
        let record = PurchaseRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            platform: PaymentPlatform::Alipay,
            product_id: "premium".to_string(),
            order_id: "o-1".to_string(),
            purchase_token: Some("tok".to_string()),
            amount_cents: Some(1800),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("tok\""));
        assert!(json.contains("\"orderId\":\"o-1\""));
    }
}
