//! Repository for the `restore_records` table.

use sanvault_core::status::RestoreStatus;
use sanvault_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::restore_record::{
    CreateRestoreRecord, RecreateRestoreRecord, RestoreRecord, UpdateRestoreRecord,
};

/// Column list for restore_records queries.
const COLUMNS: &str = "id, operation_id, backup_id, status_id, pre_restore_backup_id, \
    schema_compatible, migration_plan, compatibility_warnings, restore_media, run_migrations, \
    migrations_applied, started_at, completed_at, error_message, created_at, updated_at";

/// Provides data-access methods for restore records.
pub struct RestoreRecordRepo;

impl RestoreRecordRepo {
    /// Insert a new `pending` restore record with a fresh logical id.
    pub async fn create(
        pool: &PgPool,
        input: &CreateRestoreRecord,
    ) -> Result<RestoreRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO restore_records
                (operation_id, backup_id, status_id, restore_media, run_migrations)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RestoreRecord>(&query)
            .bind(Uuid::now_v7())
            .bind(input.backup_id)
            .bind(RestoreStatus::Pending.id())
            .bind(input.restore_media)
            .bind(input.run_migrations)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<RestoreRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM restore_records WHERE id = $1");
        sqlx::query_as::<_, RestoreRecord>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_operation_id(
        pool: &PgPool,
        operation_id: Uuid,
    ) -> Result<Option<RestoreRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM restore_records WHERE operation_id = $1");
        sqlx::query_as::<_, RestoreRecord>(&query)
            .bind(operation_id)
            .fetch_optional(pool)
            .await
    }

    /// Overwrite every mutable column. Returns the number of rows affected,
    /// which is zero when the row no longer exists under `id`.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateRestoreRecord,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE restore_records
             SET status_id = $1,
                 pre_restore_backup_id = (SELECT id FROM backup_records WHERE id = $2),
                 schema_compatible = $3,
                 migration_plan = $4, compatibility_warnings = $5, migrations_applied = $6,
                 started_at = $7, completed_at = $8, error_message = $9, updated_at = NOW()
             WHERE id = $10",
        )
        .bind(input.status_id)
        .bind(input.pre_restore_backup_id)
        .bind(input.schema_compatible)
        .bind(Json(&input.migration_plan))
        .bind(Json(&input.compatibility_warnings))
        .bind(Json(&input.migrations_applied))
        .bind(input.started_at)
        .bind(input.completed_at)
        .bind(&input.error_message)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Insert the record under its logical id, or overwrite the row that
    /// already holds that id. Returns the row with its (possibly new) `id`.
    ///
    /// A `pre_restore_backup_id` whose backup row no longer exists is stored
    /// as NULL; callers compare the returned row to detect the dropped link.
    pub async fn recreate(
        pool: &PgPool,
        input: &RecreateRestoreRecord,
    ) -> Result<RestoreRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO restore_records
                (operation_id, backup_id, status_id, pre_restore_backup_id, schema_compatible,
                 migration_plan, compatibility_warnings, restore_media, run_migrations,
                 migrations_applied, started_at, completed_at, error_message)
             VALUES ($1, $2, $3, (SELECT id FROM backup_records WHERE id = $4),
                     $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (operation_id) DO UPDATE SET
                status_id = EXCLUDED.status_id,
                pre_restore_backup_id = EXCLUDED.pre_restore_backup_id,
                schema_compatible = EXCLUDED.schema_compatible,
                migration_plan = EXCLUDED.migration_plan,
                compatibility_warnings = EXCLUDED.compatibility_warnings,
                migrations_applied = EXCLUDED.migrations_applied,
                started_at = EXCLUDED.started_at,
                completed_at = EXCLUDED.completed_at,
                error_message = EXCLUDED.error_message,
                updated_at = NOW()
             RETURNING {COLUMNS}"
        );
        let state = &input.state;
        sqlx::query_as::<_, RestoreRecord>(&query)
            .bind(input.operation_id)
            .bind(input.backup_id)
            .bind(state.status_id)
            .bind(state.pre_restore_backup_id)
            .bind(state.schema_compatible)
            .bind(Json(&state.migration_plan))
            .bind(Json(&state.compatibility_warnings))
            .bind(input.restore_media)
            .bind(input.run_migrations)
            .bind(Json(&state.migrations_applied))
            .bind(state.started_at)
            .bind(state.completed_at)
            .bind(&state.error_message)
            .fetch_one(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM restore_records WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
