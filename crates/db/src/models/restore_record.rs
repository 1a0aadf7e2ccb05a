//! Restore record models and DTOs.
//!
//! A restore has two identities: the physical row `id`, and the logical
//! `operation_id` that survives the row being re-created after the
//! destructive restore step replaces the bookkeeping tables' contents.

use sanvault_core::schema::{CompatibilityWarning, MigrationStep};
use sanvault_core::status::{RestoreStatus, StatusId};
use sanvault_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A row from the `restore_records` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RestoreRecord {
    pub id: DbId,
    pub operation_id: Uuid,
    pub backup_id: DbId,
    pub status_id: StatusId,
    pub pre_restore_backup_id: Option<DbId>,
    pub schema_compatible: bool,
    pub migration_plan: Json<Vec<MigrationStep>>,
    pub compatibility_warnings: Json<Vec<CompatibilityWarning>>,
    pub restore_media: bool,
    pub run_migrations: bool,
    pub migrations_applied: Json<Vec<MigrationStep>>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RestoreRecord {
    pub fn status(&self) -> Option<RestoreStatus> {
        RestoreStatus::from_id(self.status_id)
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// The mutable fields of this record, ready to be written back.
    pub fn to_update(&self) -> UpdateRestoreRecord {
        UpdateRestoreRecord {
            status_id: self.status_id,
            pre_restore_backup_id: self.pre_restore_backup_id,
            schema_compatible: self.schema_compatible,
            migration_plan: self.migration_plan.0.clone(),
            compatibility_warnings: self.compatibility_warnings.0.clone(),
            migrations_applied: self.migrations_applied.0.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            error_message: self.error_message.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// Input for creating a new `pending` restore record.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRestoreRecord {
    pub backup_id: DbId,
    #[serde(default)]
    pub restore_media: bool,
    #[serde(default)]
    pub run_migrations: bool,
}

// ---------------------------------------------------------------------------
// Update DTO
// ---------------------------------------------------------------------------

/// Every field the restore orchestrator mutates, written as a whole.
///
/// Used both for the update-by-id and for re-creating a vanished row, so
/// the two paths always persist the same state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRestoreRecord {
    pub status_id: StatusId,
    pub pre_restore_backup_id: Option<DbId>,
    pub schema_compatible: bool,
    pub migration_plan: Vec<MigrationStep>,
    pub compatibility_warnings: Vec<CompatibilityWarning>,
    pub migrations_applied: Vec<MigrationStep>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub error_message: Option<String>,
}

/// Full row content for re-creating a restore record under its logical id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecreateRestoreRecord {
    pub operation_id: Uuid,
    pub backup_id: DbId,
    pub restore_media: bool,
    pub run_migrations: bool,
    pub state: UpdateRestoreRecord,
}

impl From<&RestoreRecord> for RecreateRestoreRecord {
    fn from(record: &RestoreRecord) -> Self {
        Self {
            operation_id: record.operation_id,
            backup_id: record.backup_id,
            restore_media: record.restore_media,
            run_migrations: record.run_migrations,
            state: record.to_update(),
        }
    }
}
