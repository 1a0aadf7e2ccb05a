//! Durable per-operation log.
//!
//! Every line goes to `tracing` and to `backup_operation_logs`. A failed
//! store write never fails the operation; it is reported on `tracing`.

use std::sync::Arc;

use sanvault_core::artifact::{LOG_LEVEL_DEBUG, LOG_LEVEL_ERROR, LOG_LEVEL_INFO, LOG_LEVEL_WARNING};
use sanvault_db::models::operation_log::{CreateOperationLogEntry, OperationRef};

use crate::store::BackupStore;

/// Appends log lines attributed to one backup or restore.
#[derive(Clone)]
pub struct OperationLogger {
    store: Arc<dyn BackupStore>,
    operation: OperationRef,
}

impl OperationLogger {
    pub fn new(store: Arc<dyn BackupStore>, operation: OperationRef) -> Self {
        Self { store, operation }
    }

    pub fn operation(&self) -> OperationRef {
        self.operation
    }

    pub async fn debug(&self, message: impl Into<String>) {
        self.log(LOG_LEVEL_DEBUG, message.into(), None).await;
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(LOG_LEVEL_INFO, message.into(), None).await;
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.log(LOG_LEVEL_WARNING, message.into(), None).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(LOG_LEVEL_ERROR, message.into(), None).await;
    }

    pub async fn log(
        &self,
        level: &'static str,
        message: String,
        details: Option<serde_json::Value>,
    ) {
        let op = self.operation;
        match level {
            LOG_LEVEL_DEBUG => tracing::debug!(operation = %op, "{message}"),
            LOG_LEVEL_WARNING => tracing::warn!(operation = %op, "{message}"),
            LOG_LEVEL_ERROR => tracing::error!(operation = %op, "{message}"),
            _ => tracing::info!(operation = %op, "{message}"),
        }

        let entry = CreateOperationLogEntry {
            operation: op,
            level,
            message,
            details,
        };
        if let Err(e) = self.store.append_log(&entry).await {
            tracing::warn!(operation = %op, error = %e, "Failed to persist operation log line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn lines_are_attributed_and_ordered() {
        let store = Arc::new(MemoryStore::new());
        let op = OperationRef::Restore(uuid::Uuid::now_v7());
        let logger = OperationLogger::new(store.clone(), op);

        logger.info("validating").await;
        logger.warning("schema drift").await;

        let other = OperationLogger::new(store.clone(), OperationRef::Backup(7));
        other.info("unrelated").await;

        let lines = store.list_logs(op).await.unwrap();
        let levels: Vec<&str> = lines.iter().map(|l| l.level.as_str()).collect();
        assert_eq!(levels, ["info", "warning"]);
        assert_eq!(lines[1].message, "schema drift");
    }
}
