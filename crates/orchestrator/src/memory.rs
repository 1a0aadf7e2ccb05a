//! In-process [`BackupStore`] for tests and embedding.
//!
//! Mirrors the PostgreSQL semantics that the orchestrators rely on:
//! column-targeted updates, the media check on completion, upsert by
//! `operation_id`, get-or-create configuration, and the restore table's
//! foreign keys into `backup_records`.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use sanvault_core::artifact::{validate_log_level, validate_media_fields};
use sanvault_core::error::CoreError;
use sanvault_core::status::{BackupStatus, RestoreStatus};
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
use sqlx::types::Json;
use uuid::Uuid;

use crate::store::{validate_input, BackupStore, StoreError};

#[derive(Default)]
struct State {
    next_backup_id: DbId,
    next_restore_id: DbId,
    next_log_id: DbId,
    backups: BTreeMap<DbId, BackupRecord>,
    restores: BTreeMap<DbId, RestoreRecord>,
    configuration: Option<BackupConfiguration>,
    logs: Vec<OperationLogEntry>,
}

impl State {
    fn next_id(counter: &mut DbId) -> DbId {
        *counter += 1;
        *counter
    }

    /// `backup_id` must reference an existing backup.
    fn require_backup(&self, id: DbId) -> Result<(), StoreError> {
        if self.backups.contains_key(&id) {
            Ok(())
        } else {
            Err(CoreError::NotFound { entity: "backup", id }.into())
        }
    }

    /// A safety link to a missing backup is stored as `None`.
    fn resolve_link(&self, id: Option<DbId>) -> Option<DbId> {
        id.filter(|id| self.backups.contains_key(id))
    }
}

/// A [`BackupStore`] holding everything in a mutex-guarded map.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite a backup's `created_at`, for exercising age-based logic.
    pub fn backdate_backup(&self, id: DbId, created_at: Timestamp) -> bool {
        match self.state().backups.get_mut(&id) {
            Some(record) => {
                record.created_at = created_at;
                true
            }
            None => false,
        }
    }

    /// Number of restore rows currently stored.
    pub fn restore_count(&self) -> usize {
        self.state().restores.len()
    }

    /// Drop every restore row, as a restore that replaced the bookkeeping
    /// tables would. Returns how many rows were removed.
    pub fn clear_restores(&self) -> usize {
        let mut state = self.state();
        let removed = state.restores.len();
        state.restores.clear();
        removed
    }

    /// Roll the bookkeeping tables back to the moment backup `last_kept`
    /// was taken: every restore row and every later backup row disappear.
    pub fn rewind_to_backup(&self, last_kept: DbId) {
        let mut state = self.state();
        state.restores.clear();
        state.backups.retain(|id, _| *id <= last_kept);
    }
}

#[async_trait]
impl BackupStore for MemoryStore {
    async fn create_backup(&self, input: &CreateBackupRecord) -> Result<BackupRecord, StoreError> {
        validate_input(input)?;
        let now = Utc::now();
        let mut state = self.state();
        let id = State::next_id(&mut state.next_backup_id);
        let record = BackupRecord {
            id,
            name: input.name.clone(),
            description: input.description.clone(),
            status_id: BackupStatus::Pending.id(),
            backup_type: input.backup_type.clone(),
            file_path: String::new(),
            file_size: 0,
            checksum: String::new(),
            app_version: String::new(),
            runtime_version: String::new(),
            database_version: String::new(),
            schema_snapshot: Json(Default::default()),
            installed_modules: Json(Vec::new()),
            database_size: None,
            table_counts: Json(Default::default()),
            includes_media: input.includes_media,
            media_file_path: input.media_file_path.clone(),
            media_file_size: None,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        state.backups.insert(id, record.clone());
        Ok(record)
    }

    async fn find_backup(&self, id: DbId) -> Result<Option<BackupRecord>, StoreError> {
        Ok(self.state().backups.get(&id).cloned())
    }

    async fn list_backups(&self, limit: i64, offset: i64) -> Result<Vec<BackupRecord>, StoreError> {
        let mut all: Vec<BackupRecord> = self.state().backups.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_backups_with_status(
        &self,
        statuses: &[BackupStatus],
    ) -> Result<Vec<BackupRecord>, StoreError> {
        let mut matching: Vec<BackupRecord> = self
            .state()
            .backups
            .values()
            .filter(|r| r.status().is_some_and(|s| statuses.contains(&s)))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matching)
    }

    async fn latest_backup_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<BackupRecord>, StoreError> {
        Ok(self
            .state()
            .backups
            .values()
            .filter(|r| r.name.starts_with(prefix))
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn mark_backup_started(&self, id: DbId, at: Timestamp) -> Result<bool, StoreError> {
        Ok(match self.state().backups.get_mut(&id) {
            Some(r) => {
                r.status_id = BackupStatus::InProgress.id();
                r.started_at = Some(at);
                r.completed_at = None;
                r.error_message = None;
                r.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn set_backup_status(&self, id: DbId, status: BackupStatus) -> Result<bool, StoreError> {
        Ok(match self.state().backups.get_mut(&id) {
            Some(r) => {
                r.status_id = status.id();
                r.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn record_backup_provenance(
        &self,
        id: DbId,
        input: &BackupProvenance,
    ) -> Result<bool, StoreError> {
        Ok(match self.state().backups.get_mut(&id) {
            Some(r) => {
                r.app_version = input.app_version.clone();
                r.runtime_version = input.runtime_version.clone();
                r.database_version = input.database_version.clone();
                r.schema_snapshot = Json(input.schema_snapshot.clone());
                r.installed_modules = Json(input.installed_modules.clone());
                r.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn record_backup_statistics(
        &self,
        id: DbId,
        input: &BackupStatistics,
    ) -> Result<bool, StoreError> {
        Ok(match self.state().backups.get_mut(&id) {
            Some(r) => {
                r.database_size = input.database_size;
                r.table_counts = Json(input.table_counts.clone());
                r.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn complete_backup(
        &self,
        id: DbId,
        input: &CompleteBackup,
        at: Timestamp,
    ) -> Result<Option<BackupRecord>, StoreError> {
        validate_media_fields(input.includes_media, &input.media_file_path)?;
        Ok(self.state().backups.get_mut(&id).map(|r| {
            r.status_id = BackupStatus::Completed.id();
            r.file_path = input.file_path.clone();
            r.file_size = input.file_size;
            r.checksum = input.checksum.clone();
            r.includes_media = input.includes_media;
            r.media_file_path = input.media_file_path.clone();
            r.media_file_size = input.media_file_size;
            r.completed_at = Some(at);
            r.error_message = None;
            r.updated_at = Utc::now();
            r.clone()
        }))
    }

    async fn fail_backup(
        &self,
        id: DbId,
        message: &str,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        Ok(match self.state().backups.get_mut(&id) {
            Some(r) => {
                r.status_id = BackupStatus::Failed.id();
                r.error_message = Some(message.to_string());
                r.completed_at = Some(at);
                r.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn delete_backup(&self, id: DbId) -> Result<bool, StoreError> {
        let mut state = self.state();
        let removed = state.backups.remove(&id).is_some();
        if removed {
            // Mirrors the foreign keys: restores cascade, safety links are nulled.
            state.restores.retain(|_, r| r.backup_id != id);
            for r in state.restores.values_mut() {
                if r.pre_restore_backup_id == Some(id) {
                    r.pre_restore_backup_id = None;
                }
            }
            state.logs.retain(|l| l.backup_id != Some(id));
        }
        Ok(removed)
    }

    async fn create_restore(
        &self,
        input: &CreateRestoreRecord,
    ) -> Result<RestoreRecord, StoreError> {
        let now = Utc::now();
        let mut state = self.state();
        state.require_backup(input.backup_id)?;
        let id = State::next_id(&mut state.next_restore_id);
        let record = RestoreRecord {
            id,
            operation_id: Uuid::now_v7(),
            backup_id: input.backup_id,
            status_id: RestoreStatus::Pending.id(),
            pre_restore_backup_id: None,
            schema_compatible: true,
            migration_plan: Json(Vec::new()),
            compatibility_warnings: Json(Vec::new()),
            restore_media: input.restore_media,
            run_migrations: input.run_migrations,
            migrations_applied: Json(Vec::new()),
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        state.restores.insert(id, record.clone());
        Ok(record)
    }

    async fn find_restore(&self, id: DbId) -> Result<Option<RestoreRecord>, StoreError> {
        Ok(self.state().restores.get(&id).cloned())
    }

    async fn find_restore_by_operation(
        &self,
        operation_id: Uuid,
    ) -> Result<Option<RestoreRecord>, StoreError> {
        Ok(self
            .state()
            .restores
            .values()
            .find(|r| r.operation_id == operation_id)
            .cloned())
    }

    async fn update_restore(
        &self,
        id: DbId,
        input: &UpdateRestoreRecord,
    ) -> Result<u64, StoreError> {
        let mut state = self.state();
        let link = state.resolve_link(input.pre_restore_backup_id);
        Ok(match state.restores.get_mut(&id) {
            Some(r) => {
                apply_restore_update(r, input);
                r.pre_restore_backup_id = link;
                1
            }
            None => 0,
        })
    }

    async fn recreate_restore(
        &self,
        input: &RecreateRestoreRecord,
    ) -> Result<RestoreRecord, StoreError> {
        let mut state = self.state();
        state.require_backup(input.backup_id)?;
        let link = state.resolve_link(input.state.pre_restore_backup_id);

        if let Some(existing) = state
            .restores
            .values_mut()
            .find(|r| r.operation_id == input.operation_id)
        {
            apply_restore_update(existing, &input.state);
            existing.pre_restore_backup_id = link;
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let id = State::next_id(&mut state.next_restore_id);
        let mut record = RestoreRecord {
            id,
            operation_id: input.operation_id,
            backup_id: input.backup_id,
            status_id: input.state.status_id,
            pre_restore_backup_id: None,
            schema_compatible: true,
            migration_plan: Json(Vec::new()),
            compatibility_warnings: Json(Vec::new()),
            restore_media: input.restore_media,
            run_migrations: input.run_migrations,
            migrations_applied: Json(Vec::new()),
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        apply_restore_update(&mut record, &input.state);
        record.pre_restore_backup_id = link;
        state.restores.insert(id, record.clone());
        Ok(record)
    }

    async fn delete_restore(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(self.state().restores.remove(&id).is_some())
    }

    async fn get_configuration(&self) -> Result<BackupConfiguration, StoreError> {
        let mut state = self.state();
        let config = state
            .configuration
            .get_or_insert_with(|| BackupConfiguration::with_defaults(Utc::now()));
        Ok(config.clone())
    }

    async fn update_configuration(
        &self,
        input: &UpdateBackupConfiguration,
    ) -> Result<BackupConfiguration, StoreError> {
        validate_input(input)?;
        let mut state = self.state();
        let config = state
            .configuration
            .get_or_insert_with(|| BackupConfiguration::with_defaults(Utc::now()));
        config.apply(input);
        config.updated_at = Utc::now();
        Ok(config.clone())
    }

    async fn append_log(&self, input: &CreateOperationLogEntry) -> Result<(), StoreError> {
        validate_log_level(input.level)?;
        let mut state = self.state();
        let id = State::next_id(&mut state.next_log_id);
        let entry = OperationLogEntry {
            id,
            backup_id: input.operation.backup_id(),
            restore_operation_id: input.operation.restore_operation_id(),
            level: input.level.to_string(),
            message: input.message.clone(),
            details: input.details.clone(),
            created_at: Utc::now(),
        };
        state.logs.push(entry);
        Ok(())
    }

    async fn list_logs(
        &self,
        operation: OperationRef,
    ) -> Result<Vec<OperationLogEntry>, StoreError> {
        Ok(self
            .state()
            .logs
            .iter()
            .filter(|l| l.operation() == Some(operation))
            .cloned()
            .collect())
    }
}

fn apply_restore_update(record: &mut RestoreRecord, input: &UpdateRestoreRecord) {
    record.status_id = input.status_id;
    record.pre_restore_backup_id = input.pre_restore_backup_id;
    record.schema_compatible = input.schema_compatible;
    record.migration_plan = Json(input.migration_plan.clone());
    record.compatibility_warnings = Json(input.compatibility_warnings.clone());
    record.migrations_applied = Json(input.migrations_applied.clone());
    record.started_at = input.started_at;
    record.completed_at = input.completed_at;
    record.error_message = input.error_message.clone();
    record.updated_at = Utc::now();
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn create_rejects_media_flag_without_path() {
        let store = MemoryStore::new();
        let mut input = CreateBackupRecord::full("media");
        input.includes_media = true;
        let err = store.create_backup(&input).await.unwrap_err();
        assert_matches!(err, StoreError::Core(CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn recreate_after_delete_assigns_new_id() {
        let store = MemoryStore::new();
        let backup = store.create_backup(&CreateBackupRecord::full("src")).await.unwrap();
        let restore = store
            .create_restore(&CreateRestoreRecord {
                backup_id: backup.id,
                restore_media: false,
                run_migrations: false,
            })
            .await
            .unwrap();

        store.delete_restore(restore.id).await.unwrap();
        assert_eq!(store.update_restore(restore.id, &restore.to_update()).await.unwrap(), 0);

        let recreated = store
            .recreate_restore(&RecreateRestoreRecord::from(&restore))
            .await
            .unwrap();
        assert_ne!(recreated.id, restore.id);
        assert_eq!(recreated.operation_id, restore.operation_id);
        assert_eq!(store.restore_count(), 1);
    }

    #[tokio::test]
    async fn restore_foreign_keys_are_enforced() {
        let store = MemoryStore::new();
        let err = store
            .create_restore(&CreateRestoreRecord {
                backup_id: 99,
                restore_media: false,
                run_migrations: false,
            })
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::Core(CoreError::NotFound { entity: "backup", id: 99 }));

        let source = store.create_backup(&CreateBackupRecord::full("src")).await.unwrap();
        let safety = store.create_backup(&CreateBackupRecord::full("safety")).await.unwrap();
        let restore = store
            .create_restore(&CreateRestoreRecord {
                backup_id: source.id,
                restore_media: false,
                run_migrations: false,
            })
            .await
            .unwrap();
        let mut linked = restore.clone();
        linked.pre_restore_backup_id = Some(safety.id);

        store.rewind_to_backup(source.id);
        let recreated = store
            .recreate_restore(&RecreateRestoreRecord::from(&linked))
            .await
            .unwrap();
        assert_eq!(recreated.pre_restore_backup_id, None);

        store.delete_backup(source.id).await.unwrap();
        let err = store
            .recreate_restore(&RecreateRestoreRecord::from(&linked))
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::Core(CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn configuration_created_once() {
        let store = MemoryStore::new();
        let updated = store
            .update_configuration(&UpdateBackupConfiguration {
                max_backups: Some(3),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.max_backups, 3);
        assert_eq!(store.get_configuration().await.unwrap().max_backups, 3);
    }

    #[tokio::test]
    async fn latest_prefix_ignores_other_names() {
        let store = MemoryStore::new();
        let auto = store.create_backup(&CreateBackupRecord::full("auto_20261018_0200")).await.unwrap();
        store.create_backup(&CreateBackupRecord::full("manual")).await.unwrap();

        let latest = store.latest_backup_with_prefix("auto_").await.unwrap().unwrap();
        assert_eq!(latest.id, auto.id);
    }
}
