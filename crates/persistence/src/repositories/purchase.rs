//! Purchase repository.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::entities::PurchaseEntity;
use crate::metrics::QueryTimer;

const PURCHASE_COLUMNS: &str =
    "id, user_id, platform, product_id, order_id, purchase_token, amount_cents, created_at";

/// A purchase about to be recorded.
#[derive(Debug, Clone)]
pub struct NewPurchase<'a> {
    pub user_id: Uuid,
    pub platform: &'a str,
    pub product_id: &'a str,
    pub order_id: &'a str,
    pub purchase_token: Option<&'a str>,
    pub amount_cents: Option<i64>,
}

#[derive(Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_order(
        &self,
        platform: &str,
        order_id: &str,
    ) -> Result<Option<PurchaseEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_purchase_by_order");
        let sql = format!(
            "SELECT {} FROM purchases WHERE platform = ?1 AND order_id = ?2",
            PURCHASE_COLUMNS
        );
        let result = sqlx::query_as::<_, PurchaseEntity>(&sql)
            .bind(platform)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Record a purchase. Fails with a unique violation if the order was
    /// already claimed.
    pub async fn create(
        &self,
        purchase: &NewPurchase<'_>,
        now: DateTime<Utc>,
    ) -> Result<PurchaseEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_purchase");
        let sql = format!(
            r#"
            INSERT INTO purchases (id, user_id, platform, product_id, order_id, purchase_token,
                                   amount_cents, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING {}
            "#,
            PURCHASE_COLUMNS
        );
        let result = sqlx::query_as::<_, PurchaseEntity>(&sql)
            .bind(Uuid::new_v4())
            .bind(purchase.user_id)
            .bind(purchase.platform)
            .bind(purchase.product_id)
            .bind(purchase.order_id)
            .bind(purchase.purchase_token)
            .bind(purchase.amount_cents)
            .bind(now)
            .fetch_one(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Purchases of a user, newest first.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<PurchaseEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_user_purchases");
        let sql = format!(
            "SELECT {} FROM purchases WHERE user_id = ?1 ORDER BY created_at DESC",
            PURCHASE_COLUMNS
        );
        let result = sqlx::query_as::<_, PurchaseEntity>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Order ids that exist on any platform, with their owner.
    pub async fn find_by_order_ids(
        &self,
        order_ids: &[String],
    ) -> Result<Vec<PurchaseEntity>, sqlx::Error> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }
        let timer = QueryTimer::new("find_purchases_by_order_ids");
        let placeholders = (1..=order_ids.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM purchases WHERE order_id IN ({})",
            PURCHASE_COLUMNS, placeholders
        );
        let mut query = sqlx::query_as::<_, PurchaseEntity>(&sql);
        for order_id in order_ids {
            query = query.bind(order_id);
        }
        let result = query.fetch_all(&self.pool).await;
        timer.record();
        result
    }
}
