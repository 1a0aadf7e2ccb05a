//! Backup configuration singleton (`backup_configuration`, `id = 1`).

use sanvault_core::retention::RetentionPolicy;
use sanvault_core::schedule::{validate_frequency, FREQUENCY_DAILY};
use sanvault_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

/// Primary key of the only configuration row.
pub const CONFIGURATION_ID: DbId = 1;

/// The `backup_configuration` row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BackupConfiguration {
    pub id: DbId,
    pub storage_path: String,
    pub max_backups: i32,
    pub auto_backup_enabled: bool,
    pub backup_frequency: String,
    pub backup_hour: i32,
    pub auto_backup_include_media: bool,
    pub retention_days: i32,
    pub compress_backups: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl BackupConfiguration {
    /// The row as it is first created, stamped with `now`.
    pub fn with_defaults(now: Timestamp) -> Self {
        Self {
            id: CONFIGURATION_ID,
            storage_path: "backups".to_string(),
            max_backups: 10,
            auto_backup_enabled: false,
            backup_frequency: FREQUENCY_DAILY.to_string(),
            backup_hour: 2,
            auto_backup_include_media: false,
            retention_days: 30,
            compress_backups: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_backups: self.max_backups,
            retention_days: self.retention_days,
        }
    }

    /// Apply a partial update in memory, field by field.
    pub fn apply(&mut self, update: &UpdateBackupConfiguration) {
        if let Some(v) = &update.storage_path {
            self.storage_path = v.clone();
        }
        if let Some(v) = update.max_backups {
            self.max_backups = v;
        }
        if let Some(v) = update.auto_backup_enabled {
            self.auto_backup_enabled = v;
        }
        if let Some(v) = &update.backup_frequency {
            self.backup_frequency = v.clone();
        }
        if let Some(v) = update.backup_hour {
            self.backup_hour = v;
        }
        if let Some(v) = update.auto_backup_include_media {
            self.auto_backup_include_media = v;
        }
        if let Some(v) = update.retention_days {
            self.retention_days = v;
        }
        if let Some(v) = update.compress_backups {
            self.compress_backups = v;
        }
    }
}

/// Administrator update. All fields are optional.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateBackupConfiguration {
    #[validate(length(min = 1))]
    pub storage_path: Option<String>,
    #[validate(range(min = 0))]
    pub max_backups: Option<i32>,
    pub auto_backup_enabled: Option<bool>,
    #[validate(custom(function = "validate_frequency_field"))]
    pub backup_frequency: Option<String>,
    #[validate(range(min = 0, max = 23))]
    pub backup_hour: Option<i32>,
    pub auto_backup_include_media: Option<bool>,
    #[validate(range(min = 0))]
    pub retention_days: Option<i32>,
    pub compress_backups: Option<bool>,
}

fn validate_frequency_field(frequency: &str) -> Result<(), ValidationError> {
    validate_frequency(frequency).map_err(|e| {
        let mut err = ValidationError::new("backup_frequency");
        err.message = Some(e.to_string().into());
        err
    })
}
