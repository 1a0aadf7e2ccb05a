mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use sanvault_core::checksum::{sha256_file, ChecksumError};
use sanvault_core::error::CoreError;
use sanvault_core::status::BackupStatus;
use sanvault_db::models::backup_configuration::UpdateBackupConfiguration;
use sanvault_db::models::backup_record::CreateBackupRecord;
use sanvault_db::models::operation_log::OperationRef;
use sanvault_orchestrator::backup::{BackupError, BackupOrchestrator};
use sanvault_orchestrator::context::{JobState, OperationContext};
use sanvault_orchestrator::jobs::{BackupRequest, JobManager, TriggerError};
use sanvault_orchestrator::store::BackupStore;
use tokio_util::sync::CancellationToken;

use common::{Harness, APP_VERSION, SERVER_VERSION};

#[tokio::test]
async fn nightly_backup_records_artifacts_and_provenance() {
    let h = Harness::new().await;
    std::fs::create_dir_all(h.media_root().join("uploads")).unwrap();
    std::fs::write(h.media_root().join("uploads/rack.png"), b"png bytes").unwrap();

    let jobs = JobManager::new(h.services.clone());
    let mut request = BackupRequest::full("nightly");
    request.include_media = true;
    let (id, handle) = jobs
        .start_backup(OperationContext::new().with_actor("ops"), request)
        .await
        .unwrap();

    let progress = handle.wait().await;
    assert_eq!(progress.state, JobState::Succeeded, "{:?}", progress.error);
    assert_eq!(progress.result.as_ref().unwrap()["id"], id);

    let record = h.backup(id).await;
    assert_eq!(record.status(), Some(BackupStatus::Completed));
    assert!(record.started_at.is_some() && record.completed_at.is_some());
    assert!(record.file_size > 0);
    let on_disk = sha256_file(std::path::Path::new(&record.file_path)).await.unwrap();
    assert_eq!(record.checksum, on_disk);

    assert!(record.includes_media);
    assert!(std::path::Path::new(&record.media_file_path).exists());
    assert!(record.media_file_size.unwrap() > 0);

    assert_eq!(record.app_version, APP_VERSION);
    assert_eq!(record.database_version, SERVER_VERSION);
    assert_eq!(record.schema_snapshot.0["inventory"], vec!["0001_initial", "0002_hosts"]);
    assert_eq!(record.installed_modules.0, vec!["inventory", "san"]);
    assert_eq!(record.database_size, Some(8_388_608));
    assert_eq!(record.table_counts.0["hosts"], 42);

    let dump = &h.runner.calls_to("pg_dump")[0];
    assert!(dump.args.iter().any(|a| a == "--exclude-table=public.backup_records"));
    assert!(dump.args.iter().any(|a| a == "--compress=6"));

    let logs = h.log_messages(OperationRef::Backup(id)).await;
    assert!(logs.iter().any(|(_, m)| m.contains("started by ops")));
    assert!(logs.iter().any(|(_, m)| m.starts_with("Backup completed")));
    assert!(h.services.lock.current().is_none());
}

#[tokio::test]
async fn retention_prunes_oldest_after_new_backup() {
    let h = Harness::new().await;
    h.store
        .update_configuration(&UpdateBackupConfiguration {
            max_backups: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();

    let first = h.completed_backup("b1", false).await;
    h.store.backdate_backup(first.id, Utc::now() - Duration::hours(3));
    let second = h.completed_backup("b2", false).await;
    h.store.backdate_backup(second.id, Utc::now() - Duration::hours(2));
    let third = h.completed_backup("b3", false).await;

    assert!(h.store.find_backup(first.id).await.unwrap().is_none());
    assert!(!std::path::Path::new(&first.file_path).exists());
    assert!(h.store.find_backup(second.id).await.unwrap().is_some());
    assert!(h.store.find_backup(third.id).await.unwrap().is_some());

    let logs = h.log_messages(OperationRef::Backup(third.id)).await;
    assert!(logs.iter().any(|(_, m)| m.starts_with("Retention removed 1 backup")));
}

#[tokio::test]
async fn failed_dump_marks_backup_failed_and_removes_partial_file() {
    let h = Harness::new().await;
    h.runner.configure(|s| {
        s.dump_exit = 1;
        s.dump_stderr = "pg_dump: error: connection to server failed".into();
    });
    let record = h
        .store
        .create_backup(&CreateBackupRecord::full("broken"))
        .await
        .unwrap();

    let err = BackupOrchestrator::new(h.services.clone())
        .run(&OperationContext::new(), record.id, false)
        .await
        .unwrap_err();
    assert_matches!(err, BackupError::DumpFailed { exit_code: 1, .. });

    let record = h.backup(record.id).await;
    assert_eq!(record.status(), Some(BackupStatus::Failed));
    assert!(record.error_message.unwrap().contains("connection to server failed"));
    assert!(record.completed_at.is_some());

    let leftovers: Vec<_> = std::fs::read_dir(h.backup_dir()).unwrap().collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn failure_after_dump_removes_written_artifacts() {
    let h = Harness::new().await;
    std::fs::create_dir_all(h.media_root()).unwrap();
    std::fs::write(h.media_root().join("rack.png"), b"png bytes").unwrap();
    let record = h
        .store
        .create_backup(&CreateBackupRecord::full("vanishing"))
        .await
        .unwrap();

    // The row disappears while the dump runs, so completion cannot be recorded.
    let store = h.store.clone();
    let gone = record.id;
    h.runner.configure(|s| {
        s.on_dump = Some(Arc::new(move || store.rewind_to_backup(gone - 1)));
    });

    let err = BackupOrchestrator::new(h.services.clone())
        .run(&OperationContext::new(), record.id, true)
        .await
        .unwrap_err();
    assert_matches!(err, BackupError::Core(CoreError::NotFound { entity: "backup", .. }));

    assert_eq!(h.runner.calls_to("pg_dump").len(), 1);
    let leftovers: Vec<_> = std::fs::read_dir(h.backup_dir()).unwrap().collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[tokio::test]
async fn verify_promotes_intact_backup_and_fails_tampered_one() {
    let h = Harness::new().await;
    let orchestrator = BackupOrchestrator::new(h.services.clone());

    let intact = h.completed_backup("intact", false).await;
    let verified = orchestrator
        .verify(&OperationContext::new(), intact.id)
        .await
        .unwrap();
    assert_eq!(verified.status(), Some(BackupStatus::Verified));
    assert_eq!(h.runner.calls_to("pg_restore")[0].args[0], "--list");

    let tampered = h.completed_backup("tampered", false).await;
    std::fs::write(&tampered.file_path, b"PGDMP something else").unwrap();
    let err = orchestrator
        .verify(&OperationContext::new(), tampered.id)
        .await
        .unwrap_err();
    assert_matches!(err, BackupError::Integrity(ChecksumError::Mismatch { .. }));

    let tampered = h.backup(tampered.id).await;
    assert_eq!(tampered.status(), Some(BackupStatus::Failed));
    assert!(tampered.error_message.unwrap().contains("corrupted"));
}

#[tokio::test]
async fn verify_fails_when_archive_listing_fails() {
    let h = Harness::new().await;
    let record = h.completed_backup("unreadable", false).await;
    h.runner.configure(|s| s.list_exit = 1);

    let err = BackupOrchestrator::new(h.services.clone())
        .verify(&OperationContext::new(), record.id)
        .await
        .unwrap_err();
    assert_matches!(err, BackupError::ListFailed { exit_code: 1, .. });
    assert_eq!(h.backup(record.id).await.status(), Some(BackupStatus::Failed));
}

#[tokio::test]
async fn missing_media_root_leaves_backup_without_media() {
    let h = Harness::new().await;
    let record = h.completed_backup("no-media", true).await;

    assert_eq!(record.status(), Some(BackupStatus::Completed));
    assert!(!record.includes_media);
    assert!(record.media_file_path.is_empty());
    assert!(record.media_file_size.is_none());

    let logs = h.log_messages(OperationRef::Backup(record.id)).await;
    assert!(logs
        .iter()
        .any(|(level, m)| level == "warning" && m.starts_with("Media archive skipped")));
}

#[tokio::test]
async fn trigger_conflicts_while_maintenance_is_running() {
    let h = Harness::new().await;
    let jobs = JobManager::new(h.services.clone());
    let held = h.services.lock.try_acquire("restore 9").unwrap();

    let err = jobs
        .start_backup(OperationContext::new(), BackupRequest::full("blocked"))
        .await
        .err()
        .unwrap();
    assert_matches!(err, TriggerError::Core(CoreError::Conflict(msg)) if msg.contains("restore 9"));
    assert!(h.store.list_backups(10, 0).await.unwrap().is_empty());

    drop(held);
    let (_, handle) = jobs
        .start_backup(OperationContext::new(), BackupRequest::full("after"))
        .await
        .unwrap();
    assert_eq!(handle.wait().await.state, JobState::Succeeded);
}

#[tokio::test]
async fn cancelled_job_reports_cancelled_and_fails_record() {
    let h = Harness::new().await;
    let jobs = JobManager::new(h.services.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let (id, handle) = jobs
        .start_backup(
            OperationContext::new().with_cancel(cancel),
            BackupRequest::full("cancelled"),
        )
        .await
        .unwrap();
    let progress = handle.wait().await;

    assert_eq!(progress.state, JobState::Cancelled);
    assert_eq!(h.backup(id).await.status(), Some(BackupStatus::Failed));
    assert!(h.runner.calls_to("pg_dump").is_empty());
}

#[tokio::test]
async fn delete_refuses_running_backup_and_busy_lock() {
    let h = Harness::new().await;
    let record = h
        .store
        .create_backup(&CreateBackupRecord::full("running"))
        .await
        .unwrap();
    h.store.mark_backup_started(record.id, Utc::now()).await.unwrap();

    let orchestrator = BackupOrchestrator::new(h.services.clone());
    let err = orchestrator.delete(record.id).await.unwrap_err();
    assert_matches!(err, BackupError::InvalidState { .. });

    let done = h.completed_backup("done", false).await;
    let held = h.services.lock.try_acquire("restore 4").unwrap();
    let err = orchestrator.delete(done.id).await.unwrap_err();
    assert_matches!(err, BackupError::Core(CoreError::Conflict(_)));
    assert!(h.store.find_backup(done.id).await.unwrap().is_some());

    drop(held);
    orchestrator.delete(done.id).await.unwrap();
    assert!(h.store.find_backup(done.id).await.unwrap().is_none());
    assert!(!std::path::Path::new(&done.file_path).exists());
}
