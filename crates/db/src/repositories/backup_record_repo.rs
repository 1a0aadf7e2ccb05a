//! Repository for the `backup_records` table.
//!
//! Every stage of a backup writes only the columns it owns; no method
//! writes a whole in-memory record back.

use sanvault_core::status::{BackupStatus, StatusId};
use sanvault_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::backup_record::{
    BackupProvenance, BackupRecord, BackupStatistics, CompleteBackup, CreateBackupRecord,
};

/// Column list for backup_records queries.
const COLUMNS: &str = "id, name, description, status_id, backup_type, file_path, file_size, \
    checksum, app_version, runtime_version, database_version, schema_snapshot, \
    installed_modules, database_size, table_counts, includes_media, media_file_path, \
    media_file_size, started_at, completed_at, error_message, created_at, updated_at";

/// Provides data-access methods for backup records.
pub struct BackupRecordRepo;

impl BackupRecordRepo {
    /// Insert a new `pending` backup record.
    pub async fn create(
        pool: &PgPool,
        input: &CreateBackupRecord,
    ) -> Result<BackupRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO backup_records
                (name, description, status_id, backup_type, includes_media, media_file_path)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BackupRecord>(&query)
            .bind(&input.name)
            .bind(&input.description)
            .bind(BackupStatus::Pending.id())
            .bind(&input.backup_type)
            .bind(input.includes_media)
            .bind(&input.media_file_path)
            .fetch_one(pool)
            .await
    }

    /// Find a backup record by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<BackupRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM backup_records WHERE id = $1");
        sqlx::query_as::<_, BackupRecord>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List backup records, newest first.
    pub async fn list(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BackupRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM backup_records
             ORDER BY created_at DESC, id DESC
             LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, BackupRecord>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// List backup records in any of the given statuses, newest first.
    pub async fn list_with_status(
        pool: &PgPool,
        statuses: &[BackupStatus],
    ) -> Result<Vec<BackupRecord>, sqlx::Error> {
        let ids: Vec<StatusId> = statuses.iter().map(|s| s.id()).collect();
        let query = format!(
            "SELECT {COLUMNS} FROM backup_records
             WHERE status_id = ANY($1)
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, BackupRecord>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Most recently created record whose name starts with `prefix`.
    pub async fn latest_with_prefix(
        pool: &PgPool,
        prefix: &str,
    ) -> Result<Option<BackupRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM backup_records
             WHERE starts_with(name, $1)
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, BackupRecord>(&query)
            .bind(prefix)
            .fetch_optional(pool)
            .await
    }

    /// Move to `in_progress`, stamp `started_at` and clear any earlier error.
    pub async fn mark_started(
        pool: &PgPool,
        id: DbId,
        started_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE backup_records
             SET status_id = $1, started_at = $2, completed_at = NULL,
                 error_message = NULL, updated_at = NOW()
             WHERE id = $3",
        )
        .bind(BackupStatus::InProgress.id())
        .bind(started_at)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set only the status column.
    pub async fn set_status(
        pool: &PgPool,
        id: DbId,
        status: BackupStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE backup_records SET status_id = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(status.id())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn record_provenance(
        pool: &PgPool,
        id: DbId,
        input: &BackupProvenance,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE backup_records
             SET app_version = $1, runtime_version = $2, database_version = $3,
                 schema_snapshot = $4, installed_modules = $5, updated_at = NOW()
             WHERE id = $6",
        )
        .bind(&input.app_version)
        .bind(&input.runtime_version)
        .bind(&input.database_version)
        .bind(Json(&input.schema_snapshot))
        .bind(Json(&input.installed_modules))
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn record_statistics(
        pool: &PgPool,
        id: DbId,
        input: &BackupStatistics,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE backup_records
             SET database_size = $1, table_counts = $2, updated_at = NOW()
             WHERE id = $3",
        )
        .bind(input.database_size)
        .bind(Json(&input.table_counts))
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Write the artifact fields and move to `completed`.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        input: &CompleteBackup,
        completed_at: Timestamp,
    ) -> Result<Option<BackupRecord>, sqlx::Error> {
        let query = format!(
            "UPDATE backup_records
             SET status_id = $1, file_path = $2, file_size = $3, checksum = $4,
                 includes_media = $5, media_file_path = $6, media_file_size = $7,
                 completed_at = $8, error_message = NULL, updated_at = NOW()
             WHERE id = $9
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BackupRecord>(&query)
            .bind(BackupStatus::Completed.id())
            .bind(&input.file_path)
            .bind(input.file_size)
            .bind(&input.checksum)
            .bind(input.includes_media)
            .bind(&input.media_file_path)
            .bind(input.media_file_size)
            .bind(completed_at)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Move to `failed` with an error message and a completion stamp.
    pub async fn fail(
        pool: &PgPool,
        id: DbId,
        error_message: &str,
        completed_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE backup_records
             SET status_id = $1, error_message = $2, completed_at = $3, updated_at = NOW()
             WHERE id = $4",
        )
        .bind(BackupStatus::Failed.id())
        .bind(error_message)
        .bind(completed_at)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a backup record. Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM backup_records WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
