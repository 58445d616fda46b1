//! Purchase entity.

use chrono::{DateTime, Utc};
use domain::models::PaymentPlatform;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Database row mapping for the purchases table.
#[derive(Debug, Clone, FromRow)]
pub struct PurchaseEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub platform: String,
    pub product_id: String,
    pub order_id: String,
    pub purchase_token: Option<String>,
    pub amount_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<PurchaseEntity> for domain::models::PurchaseRecord {
    fn from(entity: PurchaseEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            platform: PaymentPlatform::from_str(&entity.platform)
                .unwrap_or(PaymentPlatform::Alipay),
            product_id: entity.product_id,
            order_id: entity.order_id,
            purchase_token: entity.purchase_token,
            amount_cents: entity.amount_cents,
            created_at: entity.created_at,
        }
    }
}
