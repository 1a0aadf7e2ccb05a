//! Backup/restore operation log models.
//!
//! Each entry belongs to exactly one operation: a backup by row id, or a
//! restore by its logical `operation_id`.

use sanvault_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The operation a log line is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OperationRef {
    Backup(DbId),
    Restore(Uuid),
}

impl OperationRef {
    pub fn backup_id(self) -> Option<DbId> {
        match self {
            OperationRef::Backup(id) => Some(id),
            OperationRef::Restore(_) => None,
        }
    }

    pub fn restore_operation_id(self) -> Option<Uuid> {
        match self {
            OperationRef::Backup(_) => None,
            OperationRef::Restore(id) => Some(id),
        }
    }
}

impl std::fmt::Display for OperationRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationRef::Backup(id) => write!(f, "backup:{id}"),
            OperationRef::Restore(id) => write!(f, "restore:{id}"),
        }
    }
}

/// A row from `backup_operation_logs`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub id: DbId,
    pub backup_id: Option<DbId>,
    pub restore_operation_id: Option<Uuid>,
    pub level: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub created_at: Timestamp,
}

impl OperationLogEntry {
    pub fn operation(&self) -> Option<OperationRef> {
        match (self.backup_id, self.restore_operation_id) {
            (Some(id), None) => Some(OperationRef::Backup(id)),
            (None, Some(op)) => Some(OperationRef::Restore(op)),
            _ => None,
        }
    }
}

/// Input for appending a log line.
#[derive(Debug, Clone)]
pub struct CreateOperationLogEntry {
    pub operation: OperationRef,
    pub level: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}
