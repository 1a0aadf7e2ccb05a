//! Repository for the `backup_configuration` singleton.

use sqlx::PgPool;

use crate::models::backup_configuration::{
    BackupConfiguration, UpdateBackupConfiguration, CONFIGURATION_ID,
};

/// Column list for backup_configuration queries.
const COLUMNS: &str = "id, storage_path, max_backups, auto_backup_enabled, backup_frequency, \
    backup_hour, auto_backup_include_media, retention_days, compress_backups, \
    created_at, updated_at";

/// Provides data-access methods for the backup configuration.
pub struct BackupConfigurationRepo;

impl BackupConfigurationRepo {
    /// Return the configuration row, creating it with column defaults on
    /// first access.
    pub async fn get_or_create(pool: &PgPool) -> Result<BackupConfiguration, sqlx::Error> {
        let inserted = sqlx::query(
            "INSERT INTO backup_configuration (id) VALUES ($1) ON CONFLICT (id) DO NOTHING",
        )
        .bind(CONFIGURATION_ID)
        .execute(pool)
        .await?;
        if inserted.rows_affected() > 0 {
            tracing::info!("Created default backup configuration");
        }

        let query = format!("SELECT {COLUMNS} FROM backup_configuration WHERE id = $1");
        sqlx::query_as::<_, BackupConfiguration>(&query)
            .bind(CONFIGURATION_ID)
            .fetch_one(pool)
            .await
    }

    /// Apply a partial update. Absent fields keep their stored value.
    pub async fn update(
        pool: &PgPool,
        input: &UpdateBackupConfiguration,
    ) -> Result<BackupConfiguration, sqlx::Error> {
        Self::get_or_create(pool).await?;

        let query = format!(
            "UPDATE backup_configuration SET \
                storage_path              = COALESCE($1, storage_path), \
                max_backups               = COALESCE($2, max_backups), \
                auto_backup_enabled       = COALESCE($3, auto_backup_enabled), \
                backup_frequency          = COALESCE($4, backup_frequency), \
                backup_hour               = COALESCE($5, backup_hour), \
                auto_backup_include_media = COALESCE($6, auto_backup_include_media), \
                retention_days            = COALESCE($7, retention_days), \
                compress_backups          = COALESCE($8, compress_backups), \
                updated_at                = NOW() \
             WHERE id = $9 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BackupConfiguration>(&query)
            .bind(&input.storage_path)
            .bind(input.max_backups)
            .bind(input.auto_backup_enabled)
            .bind(&input.backup_frequency)
            .bind(input.backup_hour)
            .bind(input.auto_backup_include_media)
            .bind(input.retention_days)
            .bind(input.compress_backups)
            .bind(CONFIGURATION_ID)
            .fetch_one(pool)
            .await
    }
}
