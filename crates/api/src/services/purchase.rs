//! Purchase claims and premium state.

use chrono::{DateTime, Utc};
use domain::models::{
    PaymentConfigStatus, PurchaseRecord, PurchaseStatusResponse, SubscriptionStatus, User,
    VerifyPurchaseRequest,
};
use domain::services::subscription;
use persistence::repositories::{NewPurchase, PurchaseRepository, UserRepository};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("Payment platform {0} is not configured")]
    PlatformUnavailable(&'static str),

    #[error("Order has already been claimed by another account")]
    OrderClaimed,

    #[error("User not found")]
    UserNotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<PurchaseError> for ApiError {
    fn from(err: PurchaseError) -> Self {
        match err {
            PurchaseError::PlatformUnavailable(_) => ApiError::ServiceUnavailable(err.to_string()),
            PurchaseError::OrderClaimed => ApiError::Conflict(err.to_string()),
            PurchaseError::UserNotFound => ApiError::NotFound(err.to_string()),
            PurchaseError::Database(e) => e.into(),
        }
    }
}

/// Outcome of a verify call.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    pub purchase: PurchaseRecord,
    /// False when the same user had already claimed this order.
    pub newly_claimed: bool,
    pub is_premium: bool,
    pub payment_time: Option<DateTime<Utc>>,
}

/// Outcome of a restore call.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    pub is_premium: bool,
    pub payment_time: Option<DateTime<Utc>>,
    pub restored: usize,
    /// Listed order ids the server has never verified.
    pub unknown_order_ids: Vec<String>,
    /// Listed order ids that belong to another account.
    pub conflicting_order_ids: Vec<String>,
}

pub struct PurchaseService {
    purchases: PurchaseRepository,
    users: UserRepository,
    platforms: PaymentConfigStatus,
    trial_days: i64,
}

impl PurchaseService {
    pub fn new(pool: SqlitePool, platforms: PaymentConfigStatus, trial_days: i64) -> Self {
        Self {
            purchases: PurchaseRepository::new(pool.clone()),
            users: UserRepository::new(pool),
            platforms,
            trial_days,
        }
    }

    /// Claim an order for `user_id` and make the account premium.
    pub async fn verify(
        &self,
        user_id: Uuid,
        request: &VerifyPurchaseRequest,
        now: DateTime<Utc>,
    ) -> Result<VerifyOutcome, PurchaseError> {
        if !self.platforms.is_configured(request.platform) {
            return Err(PurchaseError::PlatformUnavailable(request.platform.as_str()));
        }

        let (purchase, newly_claimed) = match self
            .purchases
            .find_by_order(request.platform.as_str(), &request.order_id)
            .await?
        {
            Some(existing) if existing.user_id != user_id => {
                tracing::warn!(
                    user_id = %user_id,
                    order_id = %request.order_id,
                    "Order already claimed by another user"
                );
                return Err(PurchaseError::OrderClaimed);
            }
            Some(existing) => (existing, false),
            None => {
                let new_purchase = NewPurchase {
                    user_id,
                    platform: request.platform.as_str(),
                    product_id: &request.product_id,
                    order_id: &request.order_id,
                    purchase_token: request.purchase_token.as_deref(),
                    amount_cents: request.amount_cents,
                };
                match self.purchases.create(&new_purchase, now).await {
                    Ok(created) => (created, true),
                    // Lost a race with a concurrent claim of the same order
                    Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                        return Err(PurchaseError::OrderClaimed)
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let user = self
            .users
            .set_premium(user_id, purchase.created_at)
            .await?
            .ok_or(PurchaseError::UserNotFound)?;

        if newly_claimed {
            tracing::info!(
                user_id = %user_id,
                platform = request.platform.as_str(),
                product_id = %request.product_id,
                "Purchase verified"
            );
            crate::middleware::metrics::record_purchase_verified(request.platform.as_str());
        }

        Ok(VerifyOutcome {
            purchase: purchase.into(),
            newly_claimed,
            is_premium: user.is_premium,
            payment_time: user.payment_time,
        })
    }

    pub async fn status(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PurchaseStatusResponse, PurchaseError> {
        let user = self.require_user(user_id).await?;
        let purchases = self.purchase_records(user_id).await?;
        Ok(self.status_for(user, purchases, now))
    }

    /// Re-derive premium from the user's verified purchases.
    pub async fn restore(
        &self,
        user_id: Uuid,
        order_ids: &[String],
    ) -> Result<RestoreOutcome, PurchaseError> {
        let mut unknown_order_ids = Vec::new();
        let mut conflicting_order_ids = Vec::new();
        if !order_ids.is_empty() {
            let found = self.purchases.find_by_order_ids(order_ids).await?;
            for order_id in order_ids {
                match found.iter().find(|p| &p.order_id == order_id) {
                    None => unknown_order_ids.push(order_id.clone()),
                    Some(p) if p.user_id != user_id => conflicting_order_ids.push(order_id.clone()),
                    Some(_) => {}
                }
            }
        }

        let owned = self.purchases.list_for_user(user_id).await?;
        let mut user = self.require_user(user_id).await?;

        // Earliest purchase sets payment_time
        if let Some(first) = owned.iter().map(|p| p.created_at).min() {
            user = self
                .users
                .set_premium(user_id, first)
                .await?
                .map(Into::into)
                .ok_or(PurchaseError::UserNotFound)?;
        }

        tracing::info!(
            user_id = %user_id,
            restored = owned.len(),
            is_premium = user.is_premium,
            "Purchases restored"
        );

        Ok(RestoreOutcome {
            is_premium: user.is_premium,
            payment_time: user.payment_time,
            restored: owned.len(),
            unknown_order_ids,
            conflicting_order_ids,
        })
    }

    pub fn config_status(&self) -> PaymentConfigStatus {
        self.platforms
    }

    fn status_for(
        &self,
        user: User,
        purchases: Vec<PurchaseRecord>,
        now: DateTime<Utc>,
    ) -> PurchaseStatusResponse {
        let trial = subscription::trial_info(user.trial_start_time, now, self.trial_days);
        // The stored status lags until the cleanup job runs
        let subscription_status = if user.is_premium {
            SubscriptionStatus::Active
        } else if trial.in_trial {
            SubscriptionStatus::Trial
        } else {
            SubscriptionStatus::Expired
        };

        PurchaseStatusResponse {
            is_premium: user.is_premium,
            subscription_status,
            payment_time: user.payment_time,
            has_access: subscription::has_access(
                user.is_premium,
                user.trial_start_time,
                now,
                self.trial_days,
            ),
            trial,
            purchases,
        }
    }

    async fn purchase_records(&self, user_id: Uuid) -> Result<Vec<PurchaseRecord>, PurchaseError> {
        Ok(self
            .purchases
            .list_for_user(user_id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn require_user(&self, user_id: Uuid) -> Result<User, PurchaseError> {
        self.users
            .find_by_id(user_id)
            .await?
            .map(Into::into)
            .ok_or(PurchaseError::UserNotFound)
    }
}
