//! Applies retention decisions: removes artifacts and records.

use sanvault_core::retention::{select_for_deletion, RetentionCandidate, RetentionPolicy};
use sanvault_core::status::BackupStatus;
use sanvault_core::types::{DbId, Timestamp};
use sanvault_db::models::backup_record::BackupRecord;
use serde::Serialize;

use crate::backup::BackupError;
use crate::store::{BackupStore, StoreError};

/// Statuses whose backups count towards retention.
const RETAINED_STATUSES: &[BackupStatus] = &[BackupStatus::Completed, BackupStatus::Verified];

/// Outcome of one retention pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    pub deleted: Vec<DbId>,
    pub failed: Vec<(DbId, String)>,
}

/// Delete every completed backup `policy` selects at `now`.
///
/// A failure on one backup is recorded in the report and does not stop
/// the others.
pub async fn apply_retention(
    store: &dyn BackupStore,
    policy: RetentionPolicy,
    now: Timestamp,
) -> Result<RetentionReport, StoreError> {
    let mut report = RetentionReport::default();
    if policy.is_unbounded() {
        return Ok(report);
    }

    let completed = store.list_backups_with_status(RETAINED_STATUSES).await?;
    let candidates: Vec<RetentionCandidate> = completed
        .iter()
        .map(|r| RetentionCandidate {
            id: r.id,
            created_at: r.created_at,
        })
        .collect();

    for decision in select_for_deletion(policy, &candidates, now) {
        let Some(record) = completed.iter().find(|r| r.id == decision.id) else {
            continue;
        };
        match remove_backup(store, record).await {
            Ok(()) => {
                tracing::info!(backup_id = record.id, reason = ?decision.reason, "Retention removed backup");
                report.deleted.push(record.id);
            }
            Err(e) => {
                tracing::warn!(backup_id = record.id, error = %e, "Retention failed to remove backup");
                report.failed.push((record.id, e.to_string()));
            }
        }
    }

    Ok(report)
}

/// Remove the dump, the media archive, then the row.
pub async fn remove_backup(store: &dyn BackupStore, record: &BackupRecord) -> Result<(), BackupError> {
    remove_file_if_present(&record.file_path).await?;
    remove_file_if_present(&record.media_file_path).await?;
    store.delete_backup(record.id).await?;
    Ok(())
}

async fn remove_file_if_present(path: &str) -> std::io::Result<()> {
    if path.is_empty() {
        return Ok(());
    }
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
