//! Trial window and premium entitlement on the device.

use chrono::{DateTime, Utc};
use domain::services::{has_access, is_in_trial_period, remaining_trial_days};
use persistence::repositories::SettingsRepository;
use serde::Serialize;
use tracing::{debug, warn};

use crate::client::{is_offline_error, PremiumSource};
use crate::error::{Result, TrackerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessState {
    pub is_premium: bool,
    pub in_trial: bool,
    pub remaining_trial_days: i64,
    pub has_access: bool,
    /// The premium flag is the cached one because the server was not asked
    /// or could not answer.
    pub from_cache: bool,
}

pub struct SubscriptionManager<P> {
    settings: SettingsRepository,
    source: P,
    trial_days: i64,
}

impl<P: PremiumSource> SubscriptionManager<P> {
    pub fn new(settings: SettingsRepository, source: P, trial_days: i64) -> Self {
        Self {
            settings,
            source,
            trial_days,
        }
    }

    async fn install_time(&self) -> Result<DateTime<Utc>> {
        let settings = self.settings.app_settings().await?;
        DateTime::from_timestamp_millis(settings.install_time).ok_or_else(|| {
            TrackerError::InvalidInput(format!("Bad install time: {}", settings.install_time))
        })
    }

    pub async fn is_in_trial_period(&self, now: DateTime<Utc>) -> Result<bool> {
        Ok(is_in_trial_period(
            self.install_time().await?,
            now,
            self.trial_days,
        ))
    }

    /// Current access, asking the server for the premium flag when signed in.
    ///
    /// When the server cannot be reached the last cached flag is used. A
    /// rejected session clears the cached flag; other errors are returned.
    pub async fn check(&self, now: DateTime<Utc>) -> Result<AccessState> {
        let install = self.install_time().await?;
        let account = self.settings.account_state().await?;

        let (is_premium, from_cache) = if account.is_signed_in() {
            match self.source.fetch_premium().await {
                Ok(is_premium) => {
                    self.settings
                        .cache_premium(is_premium, now.timestamp_millis())
                        .await?;
                    debug!(is_premium, "Premium status refreshed");
                    (is_premium, false)
                }
                Err(e) if is_offline_error(&e) => {
                    warn!(error = %e, cached = account.is_premium, "Server unreachable, using cached premium");
                    (self.settings.account_state().await?.is_premium, true)
                }
                Err(e) if e.is_unauthorized() => {
                    warn!(error = %e, "Session rejected, dropping cached premium");
                    self.settings
                        .cache_premium(false, now.timestamp_millis())
                        .await?;
                    (false, false)
                }
                Err(e) => return Err(e),
            }
        } else {
            (account.is_premium, true)
        };

        Ok(AccessState {
            is_premium,
            in_trial: is_in_trial_period(install, now, self.trial_days),
            remaining_trial_days: remaining_trial_days(install, now, self.trial_days),
            has_access: has_access(is_premium, install, now, self.trial_days),
            from_cache,
        })
    }
}
