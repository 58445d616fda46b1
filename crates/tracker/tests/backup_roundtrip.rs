//! Backups against the real server and the retry behaviour of the scheduler.

mod common;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::{offset_hours, register, spawn_server, store, utc};
use domain::models::{BackupOutcome, BackupUploadRequest, BackupUploadResult};
use domain::services::Backoff;
use offtimes_tracker::backup::{
    BackupManager, BackupRun, BackupScheduler, SkipReason, SlotResult, StaticConditions,
};
use offtimes_tracker::client::{Account, ApiClient, BackupUploader};
use offtimes_tracker::config::DeviceConfig;
use offtimes_tracker::subscription::SubscriptionManager;
use offtimes_tracker::usage::UsageRecorder;
use offtimes_tracker::{Result, TrackerError};
use persistence::repositories::SettingsRepository;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::test]
async fn test_backup_and_subscription_against_server() {
    let base_url = spawn_server().await;
    register(&base_url, "alice01", "Secret123").await;

    let now = Utc::now();
    let pool = store(now - Duration::days(2)).await;
    let settings = SettingsRepository::new(pool.clone());
    let client = ApiClient::new(&base_url, std::time::Duration::from_secs(5)).unwrap();
    let account = Account::new(client, settings.clone());

    let offset = offset_hours(0);
    let manager = BackupManager::new(pool.clone(), account.clone(), offset);
    let yesterday = manager.backup_date(now);

    assert_eq!(
        manager.run_for(yesterday, now).await.unwrap(),
        BackupRun::Skipped(SkipReason::NotSignedIn)
    );

    account.sign_in("alice01", "Secret123").await.unwrap();
    let start = yesterday.and_hms_opt(9, 0, 0).unwrap().and_utc();
    UsageRecorder::new(pool.clone(), offset)
        .record("com.example.video", start, start + Duration::minutes(20))
        .await
        .unwrap();

    assert_eq!(
        manager.run_for(yesterday, now).await.unwrap(),
        BackupRun::Finished(BackupOutcome::Success)
    );
    assert_eq!(
        manager.run_for(yesterday, now).await.unwrap(),
        BackupRun::Finished(BackupOutcome::Unchanged)
    );
    let recorded = settings.backup_settings().await.unwrap();
    assert_eq!(recorded.last_result, Some(BackupOutcome::Unchanged));
    assert_eq!(recorded.last_backup_time, Some(now.timestamp_millis()));

    let access = SubscriptionManager::new(settings.clone(), account.clone(), 7)
        .check(now)
        .await
        .unwrap();
    assert!(!access.is_premium);
    assert!(!access.from_cache);
    assert!(access.in_trial);
    assert!(access.has_access);

    account.sign_out().await.unwrap();
    assert!(!settings.account_state().await.unwrap().is_signed_in());
}

/// Fails the first `failures` uploads, then reports every upload as stored.
struct FlakyUploader {
    calls: Arc<AtomicUsize>,
    failures: usize,
}

#[async_trait]
impl BackupUploader for FlakyUploader {
    async fn upload(&self, request: &BackupUploadRequest) -> Result<BackupUploadResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(TrackerError::Api {
                status: 503,
                message: "Service unavailable".to_string(),
            });
        }
        Ok(BackupUploadResult {
            table_name: request.table_name.clone(),
            backup_date: request.backup_date,
            unchanged: false,
            data_hash: String::new(),
            record_count: request.data.len() as i64,
        })
    }
}

const ONLINE: DeviceConfig = DeviceConfig {
    network_available: true,
    unmetered: true,
    battery_low: false,
};

fn quick_backoff() -> Backoff {
    Backoff {
        initial: std::time::Duration::from_millis(1),
        factor: 2,
        max_attempts: 5,
    }
}

async fn scheduler(
    failures: usize,
    device: DeviceConfig,
) -> (BackupScheduler<FlakyUploader>, Arc<AtomicUsize>, SettingsRepository) {
    let pool = store(utc(2024, 2, 1, 8, 0)).await;
    let settings = SettingsRepository::new(pool.clone());
    settings.save_tokens("user-1", "access", "refresh").await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let uploader = FlakyUploader {
        calls: calls.clone(),
        failures,
    };
    let manager = Arc::new(BackupManager::new(pool, uploader, offset_hours(0)));
    let scheduler = BackupScheduler::new(
        manager,
        settings.clone(),
        Arc::new(StaticConditions(device)),
        quick_backoff(),
        offset_hours(0),
    );
    (scheduler, calls, settings)
}

#[tokio::test]
async fn test_failed_upload_recorded() {
    let pool = store(utc(2024, 2, 1, 8, 0)).await;
    let settings = SettingsRepository::new(pool.clone());
    settings.save_tokens("user-1", "access", "refresh").await.unwrap();
    let manager = BackupManager::new(
        pool,
        FlakyUploader {
            calls: Arc::new(AtomicUsize::new(0)),
            failures: usize::MAX,
        },
        offset_hours(0),
    );

    let now = utc(2024, 3, 2, 3, 0);
    assert!(manager.run_once(now).await.is_err());

    let recorded = settings.backup_settings().await.unwrap();
    assert_eq!(recorded.last_result, Some(BackupOutcome::Failure));
    assert!(recorded.last_error.unwrap().contains("503"));
}

#[tokio::test]
async fn test_slot_gives_up_after_max_attempts() {
    let (scheduler, calls, _) = scheduler(usize::MAX, ONLINE).await;
    let (_tx, mut rx) = watch::channel(false);

    assert_eq!(
        scheduler.run_slot(&mut rx).await,
        SlotResult::GaveUp { attempts: 5 }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_slot_succeeds_on_retry() {
    let (scheduler, calls, settings) = scheduler(2, ONLINE).await;
    let (_tx, mut rx) = watch::channel(false);

    assert_eq!(
        scheduler.run_slot(&mut rx).await,
        SlotResult::Ran(BackupRun::Finished(BackupOutcome::Success))
    );
    // Two failed attempts, then one upload per table
    assert_eq!(calls.load(Ordering::SeqCst), 2 + 4);
    assert_eq!(
        settings.backup_settings().await.unwrap().last_result,
        Some(BackupOutcome::Success)
    );
}

#[tokio::test]
async fn test_blocked_slot_never_uploads() {
    let offline = DeviceConfig {
        network_available: false,
        ..ONLINE
    };
    let (scheduler, calls, _) = scheduler(0, offline).await;
    let (_tx, mut rx) = watch::channel(false);

    assert_eq!(
        scheduler.run_slot(&mut rx).await,
        SlotResult::GaveUp { attempts: 5 }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_disabled_backup_skips() {
    let (scheduler, calls, settings) = scheduler(0, ONLINE).await;
    let mut schedule = settings.backup_settings().await.unwrap();
    schedule.enabled = false;
    settings.save_backup_schedule(&schedule).await.unwrap();
    let (_tx, mut rx) = watch::channel(false);

    assert_eq!(
        scheduler.run_slot(&mut rx).await,
        SlotResult::Ran(BackupRun::Skipped(SkipReason::Disabled))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
