//! Persistence contract for backup bookkeeping.
//!
//! [`BackupStore`] is what the orchestrators write through. [`PgStore`]
//! delegates to the `sanvault-db` repositories; the in-process
//! implementation lives in [`crate::memory`].

use async_trait::async_trait;
use sanvault_core::error::CoreError;
use sanvault_core::status::BackupStatus;
use sanvault_core::types::{DbId, Timestamp};
use sanvault_db::models::backup_configuration::{BackupConfiguration, UpdateBackupConfiguration};
use sanvault_db::models::backup_record::{
    BackupProvenance, BackupRecord, BackupStatistics, CompleteBackup, CreateBackupRecord,
};
use sanvault_db::models::operation_log::{
    CreateOperationLogEntry, OperationLogEntry, OperationRef,
};
use sanvault_db::models::restore_record::{
    CreateRestoreRecord, RecreateRestoreRecord, RestoreRecord, UpdateRestoreRecord,
};
use sanvault_db::repositories::{
    BackupConfigurationRepo, BackupRecordRepo, OperationLogRepo, RestoreRecordRepo,
};
use sanvault_db::DbPool;
use uuid::Uuid;
use validator::Validate;

/// Errors surfaced by a [`BackupStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Run `validator` rules on an input DTO, reporting failures as
/// [`CoreError::Validation`].
pub fn validate_input<T: Validate>(input: &T) -> Result<(), StoreError> {
    input
        .validate()
        .map_err(|e| StoreError::Core(CoreError::Validation(e.to_string())))
}

/// Record persistence used by the orchestrators.
///
/// Backup updates are column-targeted: each method writes only the fields
/// named in its signature. Restore updates write the whole mutable state
/// and report how many rows they touched, so callers can detect a row that
/// vanished under them.
#[async_trait]
pub trait BackupStore: Send + Sync {
    // -- backups --------------------------------------------------------

    async fn create_backup(&self, input: &CreateBackupRecord) -> Result<BackupRecord, StoreError>;

    async fn find_backup(&self, id: DbId) -> Result<Option<BackupRecord>, StoreError>;

    /// Newest first.
    async fn list_backups(&self, limit: i64, offset: i64) -> Result<Vec<BackupRecord>, StoreError>;

    /// Newest first.
    async fn list_backups_with_status(
        &self,
        statuses: &[BackupStatus],
    ) -> Result<Vec<BackupRecord>, StoreError>;

    /// Most recently created backup whose name starts with `prefix`.
    async fn latest_backup_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<BackupRecord>, StoreError>;

    async fn mark_backup_started(&self, id: DbId, at: Timestamp) -> Result<bool, StoreError>;

    async fn set_backup_status(&self, id: DbId, status: BackupStatus) -> Result<bool, StoreError>;

    async fn record_backup_provenance(
        &self,
        id: DbId,
        input: &BackupProvenance,
    ) -> Result<bool, StoreError>;

    async fn record_backup_statistics(
        &self,
        id: DbId,
        input: &BackupStatistics,
    ) -> Result<bool, StoreError>;

    async fn complete_backup(
        &self,
        id: DbId,
        input: &CompleteBackup,
        at: Timestamp,
    ) -> Result<Option<BackupRecord>, StoreError>;

    async fn fail_backup(&self, id: DbId, message: &str, at: Timestamp)
        -> Result<bool, StoreError>;

    async fn delete_backup(&self, id: DbId) -> Result<bool, StoreError>;

    // -- restores -------------------------------------------------------

    async fn create_restore(&self, input: &CreateRestoreRecord)
        -> Result<RestoreRecord, StoreError>;

    async fn find_restore(&self, id: DbId) -> Result<Option<RestoreRecord>, StoreError>;

    async fn find_restore_by_operation(
        &self,
        operation_id: Uuid,
    ) -> Result<Option<RestoreRecord>, StoreError>;

    /// Returns the number of rows affected (0 when the row is gone).
    async fn update_restore(
        &self,
        id: DbId,
        input: &UpdateRestoreRecord,
    ) -> Result<u64, StoreError>;

    /// Insert under the logical id, or overwrite the row holding it.
    async fn recreate_restore(
        &self,
        input: &RecreateRestoreRecord,
    ) -> Result<RestoreRecord, StoreError>;

    async fn delete_restore(&self, id: DbId) -> Result<bool, StoreError>;

    // -- configuration --------------------------------------------------

    /// The singleton configuration, created with defaults on first access.
    async fn get_configuration(&self) -> Result<BackupConfiguration, StoreError>;

    async fn update_configuration(
        &self,
        input: &UpdateBackupConfiguration,
    ) -> Result<BackupConfiguration, StoreError>;

    // -- operation log --------------------------------------------------

    async fn append_log(&self, input: &CreateOperationLogEntry) -> Result<(), StoreError>;

    /// Oldest first.
    async fn list_logs(&self, operation: OperationRef)
        -> Result<Vec<OperationLogEntry>, StoreError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

/// [`BackupStore`] backed by the `sanvault-db` repositories.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl BackupStore for PgStore {
    async fn create_backup(&self, input: &CreateBackupRecord) -> Result<BackupRecord, StoreError> {
        validate_input(input)?;
        Ok(BackupRecordRepo::create(&self.pool, input).await?)
    }

    async fn find_backup(&self, id: DbId) -> Result<Option<BackupRecord>, StoreError> {
        Ok(BackupRecordRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_backups(&self, limit: i64, offset: i64) -> Result<Vec<BackupRecord>, StoreError> {
        Ok(BackupRecordRepo::list(&self.pool, limit, offset).await?)
    }

    async fn list_backups_with_status(
        &self,
        statuses: &[BackupStatus],
    ) -> Result<Vec<BackupRecord>, StoreError> {
        Ok(BackupRecordRepo::list_with_status(&self.pool, statuses).await?)
    }

    async fn latest_backup_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<BackupRecord>, StoreError> {
        Ok(BackupRecordRepo::latest_with_prefix(&self.pool, prefix).await?)
    }

    async fn mark_backup_started(&self, id: DbId, at: Timestamp) -> Result<bool, StoreError> {
        Ok(BackupRecordRepo::mark_started(&self.pool, id, at).await?)
    }

    async fn set_backup_status(&self, id: DbId, status: BackupStatus) -> Result<bool, StoreError> {
        Ok(BackupRecordRepo::set_status(&self.pool, id, status).await?)
    }

    async fn record_backup_provenance(
        &self,
        id: DbId,
        input: &BackupProvenance,
    ) -> Result<bool, StoreError> {
        Ok(BackupRecordRepo::record_provenance(&self.pool, id, input).await?)
    }

    async fn record_backup_statistics(
        &self,
        id: DbId,
        input: &BackupStatistics,
    ) -> Result<bool, StoreError> {
        Ok(BackupRecordRepo::record_statistics(&self.pool, id, input).await?)
    }

    async fn complete_backup(
        &self,
        id: DbId,
        input: &CompleteBackup,
        at: Timestamp,
    ) -> Result<Option<BackupRecord>, StoreError> {
        Ok(BackupRecordRepo::complete(&self.pool, id, input, at).await?)
    }

    async fn fail_backup(
        &self,
        id: DbId,
        message: &str,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        Ok(BackupRecordRepo::fail(&self.pool, id, message, at).await?)
    }

    async fn delete_backup(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(BackupRecordRepo::delete(&self.pool, id).await?)
    }

    async fn create_restore(
        &self,
        input: &CreateRestoreRecord,
    ) -> Result<RestoreRecord, StoreError> {
        Ok(RestoreRecordRepo::create(&self.pool, input).await?)
    }

    async fn find_restore(&self, id: DbId) -> Result<Option<RestoreRecord>, StoreError> {
        Ok(RestoreRecordRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_restore_by_operation(
        &self,
        operation_id: Uuid,
    ) -> Result<Option<RestoreRecord>, StoreError> {
        Ok(RestoreRecordRepo::find_by_operation_id(&self.pool, operation_id).await?)
    }

    async fn update_restore(
        &self,
        id: DbId,
        input: &UpdateRestoreRecord,
    ) -> Result<u64, StoreError> {
        Ok(RestoreRecordRepo::update(&self.pool, id, input).await?)
    }

    async fn recreate_restore(
        &self,
        input: &RecreateRestoreRecord,
    ) -> Result<RestoreRecord, StoreError> {
        Ok(RestoreRecordRepo::recreate(&self.pool, input).await?)
    }

    async fn delete_restore(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(RestoreRecordRepo::delete(&self.pool, id).await?)
    }

    async fn get_configuration(&self) -> Result<BackupConfiguration, StoreError> {
        Ok(BackupConfigurationRepo::get_or_create(&self.pool).await?)
    }

    async fn update_configuration(
        &self,
        input: &UpdateBackupConfiguration,
    ) -> Result<BackupConfiguration, StoreError> {
        validate_input(input)?;
        Ok(BackupConfigurationRepo::update(&self.pool, input).await?)
    }

    async fn append_log(&self, input: &CreateOperationLogEntry) -> Result<(), StoreError> {
        OperationLogRepo::append(&self.pool, input).await?;
        Ok(())
    }

    async fn list_logs(
        &self,
        operation: OperationRef,
    ) -> Result<Vec<OperationLogEntry>, StoreError> {
        Ok(OperationLogRepo::list_for_operation(&self.pool, operation).await?)
    }
}
