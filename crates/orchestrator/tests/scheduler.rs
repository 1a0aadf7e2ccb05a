mod common;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use sanvault_core::error::CoreError;
use sanvault_core::status::BackupStatus;
use sanvault_core::types::Timestamp;
use sanvault_db::models::backup_configuration::UpdateBackupConfiguration;
use sanvault_orchestrator::context::JobState;
use sanvault_orchestrator::jobs::{JobManager, TriggerError};
use sanvault_orchestrator::scheduler::{BackupScheduler, SchedulerError, DEFAULT_POLL_INTERVAL};
use sanvault_orchestrator::store::BackupStore;
use tokio_util::sync::CancellationToken;

use common::Harness;

fn at(d: u32, h: u32, mi: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2026, 10, d, h, mi, 0).unwrap()
}

async fn enable_daily(h: &Harness, include_media: bool) {
    h.store
        .update_configuration(&UpdateBackupConfiguration {
            auto_backup_enabled: Some(true),
            backup_frequency: Some("daily".into()),
            backup_hour: Some(2),
            auto_backup_include_media: Some(include_media),
            ..Default::default()
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn disabled_schedule_never_starts_backups() {
    let h = Harness::new().await;
    let scheduler = BackupScheduler::new(JobManager::new(h.services.clone()), DEFAULT_POLL_INTERVAL);

    let started = scheduler.tick(at(18, 3, 0), &CancellationToken::new()).await.unwrap();
    assert!(started.is_none());
    assert!(h.store.list_backups(10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn one_automatic_backup_per_slot() {
    let h = Harness::new().await;
    enable_daily(&h, false).await;
    let scheduler = BackupScheduler::new(JobManager::new(h.services.clone()), DEFAULT_POLL_INTERVAL);
    let cancel = CancellationToken::new();

    let (id, handle) = scheduler.tick(at(18, 3, 0), &cancel).await.unwrap().unwrap();
    assert_eq!(handle.wait().await.state, JobState::Succeeded);
    let record = h.backup(id).await;
    assert_eq!(record.name, "auto_20261018_0300");
    assert_eq!(record.status(), Some(BackupStatus::Completed));
    h.store.backdate_backup(id, at(18, 3, 0));

    assert!(scheduler.tick(at(18, 3, 5), &cancel).await.unwrap().is_none());
    assert!(scheduler.tick(at(19, 1, 59), &cancel).await.unwrap().is_none());

    let (next, handle) = scheduler.tick(at(19, 2, 1), &cancel).await.unwrap().unwrap();
    handle.wait().await;
    assert_eq!(h.backup(next).await.name, "auto_20261019_0201");
}

#[tokio::test]
async fn manual_backups_do_not_satisfy_the_schedule() {
    let h = Harness::new().await;
    enable_daily(&h, false).await;
    let manual = h.completed_backup("before-upgrade", false).await;
    h.store.backdate_backup(manual.id, at(18, 2, 30));

    let scheduler = BackupScheduler::new(JobManager::new(h.services.clone()), DEFAULT_POLL_INTERVAL);
    let started = scheduler
        .tick(at(18, 3, 0), &CancellationToken::new())
        .await
        .unwrap();
    assert!(started.is_some());
}

#[tokio::test]
async fn automatic_backup_follows_media_setting() {
    let h = Harness::new().await;
    enable_daily(&h, true).await;
    std::fs::create_dir_all(h.media_root()).unwrap();
    std::fs::write(h.media_root().join("floorplan.pdf"), b"%PDF").unwrap();

    let scheduler = BackupScheduler::new(JobManager::new(h.services.clone()), DEFAULT_POLL_INTERVAL);
    let (id, handle) = scheduler
        .tick(at(18, 3, 0), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    handle.wait().await;
    assert!(h.backup(id).await.includes_media);
}

#[tokio::test]
async fn due_backup_is_skipped_while_maintenance_runs() {
    let h = Harness::new().await;
    enable_daily(&h, false).await;
    let scheduler = BackupScheduler::new(JobManager::new(h.services.clone()), DEFAULT_POLL_INTERVAL);
    let _held = h.services.lock.try_acquire("restore 3").unwrap();

    let err = scheduler
        .tick(at(18, 3, 0), &CancellationToken::new())
        .await
        .err()
        .unwrap();
    assert_matches!(err, SchedulerError::Trigger(TriggerError::Core(CoreError::Conflict(_))));
    assert!(h.store.list_backups(10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn run_loop_stops_on_cancel() {
    let h = Harness::new().await;
    let scheduler = BackupScheduler::new(JobManager::new(h.services.clone()), std::time::Duration::from_millis(10));
    let cancel = CancellationToken::new();
    cancel.cancel();

    tokio::time::timeout(std::time::Duration::from_secs(5), scheduler.run(cancel))
        .await
        .unwrap();
}
