//! Repository for the `backup_operation_logs` table.

use sqlx::PgPool;

use crate::models::operation_log::{CreateOperationLogEntry, OperationLogEntry, OperationRef};

/// Column list for backup_operation_logs queries.
const COLUMNS: &str = "id, backup_id, restore_operation_id, level, message, details, created_at";

/// Provides data-access methods for operation log entries.
pub struct OperationLogRepo;

impl OperationLogRepo {
    /// Append a log line.
    pub async fn append(
        pool: &PgPool,
        input: &CreateOperationLogEntry,
    ) -> Result<OperationLogEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO backup_operation_logs
                (backup_id, restore_operation_id, level, message, details)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OperationLogEntry>(&query)
            .bind(input.operation.backup_id())
            .bind(input.operation.restore_operation_id())
            .bind(input.level)
            .bind(&input.message)
            .bind(&input.details)
            .fetch_one(pool)
            .await
    }

    /// All lines for one operation, oldest first (chronological).
    pub async fn list_for_operation(
        pool: &PgPool,
        operation: OperationRef,
    ) -> Result<Vec<OperationLogEntry>, sqlx::Error> {
        let column = match operation {
            OperationRef::Backup(_) => "backup_id",
            OperationRef::Restore(_) => "restore_operation_id",
        };
        let query = format!(
            "SELECT {COLUMNS} FROM backup_operation_logs
             WHERE {column} = $1
             ORDER BY created_at ASC, id ASC"
        );
        let q = sqlx::query_as::<_, OperationLogEntry>(&query);
        let q = match operation {
            OperationRef::Backup(id) => q.bind(id),
            OperationRef::Restore(op) => q.bind(op),
        };
        q.fetch_all(pool).await
    }
}
