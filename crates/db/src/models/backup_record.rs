//! Backup record models and DTOs.
//!
//! Defines the database row struct for `backup_records` and the targeted
//! update payloads written by the backup orchestrator at each stage.

use std::collections::BTreeMap;

use sanvault_core::artifact::{validate_backup_type, validate_media_fields, BACKUP_TYPE_FULL};
use sanvault_core::schema::SchemaSnapshot;
use sanvault_core::status::{BackupStatus, StatusId};
use sanvault_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use validator::{Validate, ValidationError};

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A row from the `backup_records` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: DbId,
    pub name: String,
    pub description: String,
    pub status_id: StatusId,
    pub backup_type: String,
    pub file_path: String,
    pub file_size: i64,
    pub checksum: String,
    pub app_version: String,
    pub runtime_version: String,
    pub database_version: String,
    pub schema_snapshot: Json<SchemaSnapshot>,
    pub installed_modules: Json<Vec<String>>,
    pub database_size: Option<i64>,
    pub table_counts: Json<BTreeMap<String, i64>>,
    pub includes_media: bool,
    pub media_file_path: String,
    pub media_file_size: Option<i64>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl BackupRecord {
    /// Decoded status, `None` if the row carries an unknown id.
    pub fn status(&self) -> Option<BackupStatus> {
        BackupStatus::from_id(self.status_id)
    }

    /// Whether this backup may be used as a restore source.
    pub fn is_restorable(&self) -> bool {
        self.status().is_some_and(BackupStatus::is_restorable)
    }

    /// Wall-clock duration of the run, once both ends are stamped.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    pub fn has_media_archive(&self) -> bool {
        self.includes_media && !self.media_file_path.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// Input for creating a new `pending` backup record.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_create_media"))]
pub struct CreateBackupRecord {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_backup_type")]
    #[validate(custom(function = "validate_backup_type_field"))]
    pub backup_type: String,
    #[serde(default)]
    pub includes_media: bool,
    #[serde(default)]
    pub media_file_path: String,
}

impl CreateBackupRecord {
    /// A `full` backup with no media and no description.
    pub fn full(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            backup_type: BACKUP_TYPE_FULL.to_string(),
            includes_media: false,
            media_file_path: String::new(),
        }
    }
}

fn default_backup_type() -> String {
    BACKUP_TYPE_FULL.to_string()
}

fn validate_backup_type_field(backup_type: &str) -> Result<(), ValidationError> {
    validate_backup_type(backup_type).map_err(|e| {
        let mut err = ValidationError::new("backup_type");
        err.message = Some(e.to_string().into());
        err
    })
}

fn validate_create_media(input: &CreateBackupRecord) -> Result<(), ValidationError> {
    validate_media_fields(input.includes_media, &input.media_file_path).map_err(|e| {
        let mut err = ValidationError::new("media_file_path");
        err.message = Some(e.to_string().into());
        err
    })
}

// ---------------------------------------------------------------------------
// Stage update DTOs
// ---------------------------------------------------------------------------

/// Version and schema metadata captured once at backup time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupProvenance {
    pub app_version: String,
    pub runtime_version: String,
    pub database_version: String,
    pub schema_snapshot: SchemaSnapshot,
    pub installed_modules: Vec<String>,
}

/// Best-effort database statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupStatistics {
    pub database_size: Option<i64>,
    pub table_counts: BTreeMap<String, i64>,
}

/// Final artifact fields written when a backup completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteBackup {
    pub file_path: String,
    pub file_size: i64,
    pub checksum: String,
    pub includes_media: bool,
    pub media_file_path: String,
    pub media_file_size: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_dto_validates_name_and_type() {
        assert!(CreateBackupRecord::full("nightly").validate().is_ok());

        let mut empty = CreateBackupRecord::full("");
        assert!(empty.validate().is_err());
        empty.name = "x".repeat(256);
        assert!(empty.validate().is_err());

        let mut bad_type = CreateBackupRecord::full("nightly");
        bad_type.backup_type = "incremental".into();
        let errors = bad_type.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("backup_type"));
    }

    #[test]
    fn create_dto_enforces_media_path() {
        let mut input = CreateBackupRecord::full("with-media");
        input.includes_media = true;
        assert!(input.validate().is_err());

        input.media_file_path = "/backups/media_1_20261018_020000.tar.gz".into();
        assert!(input.validate().is_ok());
    }

    #[test]
    fn create_dto_defaults_from_json() {
        let input: CreateBackupRecord = serde_json::from_str(r#"{"name":"manual"}"#).unwrap();
        assert_eq!(input.backup_type, BACKUP_TYPE_FULL);
        assert!(!input.includes_media);
        assert!(input.description.is_empty());
    }
}
