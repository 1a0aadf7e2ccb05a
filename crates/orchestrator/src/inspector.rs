//! Live database introspection used for backup metadata and schema
//! reconciliation.
//!
//! Every method is best-effort from the caller's point of view and returns
//! a [`CollectError`] rather than a hard failure.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sanvault_core::provenance::CollectError;
use sanvault_core::schema::SchemaSnapshot;
use sanvault_db::DbPool;

/// Source of engine version, applied migrations and statistics.
#[async_trait]
pub trait DatabaseInspector: Send + Sync {
    async fn server_version(&self) -> Result<String, CollectError>;

    /// Module name -> migration ids in the order they were applied.
    async fn applied_migrations(&self) -> Result<SchemaSnapshot, CollectError>;

    async fn installed_modules(&self) -> Result<Vec<String>, CollectError>;

    /// Total on-disk size in bytes.
    async fn database_size(&self) -> Result<i64, CollectError>;

    /// Approximate live row count per user table.
    async fn table_row_counts(&self) -> Result<BTreeMap<String, i64>, CollectError>;
}

/// [`DatabaseInspector`] reading PostgreSQL catalogs and the
/// `schema_migrations` ledger.
#[derive(Clone)]
pub struct PgInspector {
    pool: DbPool,
    /// Configured module list; when empty, modules are derived from the
    /// migration ledger.
    modules: Vec<String>,
}

impl PgInspector {
    pub fn new(pool: DbPool, modules: Vec<String>) -> Self {
        Self { pool, modules }
    }
}

fn query_error(e: sqlx::Error) -> CollectError {
    CollectError::Query(e.to_string())
}

#[async_trait]
impl DatabaseInspector for PgInspector {
    async fn server_version(&self) -> Result<String, CollectError> {
        let row: (String,) = sqlx::query_as("SELECT version()")
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(row.0)
    }

    async fn applied_migrations(&self) -> Result<SchemaSnapshot, CollectError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT module, name FROM schema_migrations ORDER BY module, applied_at, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        let mut snapshot = SchemaSnapshot::new();
        for (module, name) in rows {
            snapshot.entry(module).or_default().push(name);
        }
        Ok(snapshot)
    }

    async fn installed_modules(&self) -> Result<Vec<String>, CollectError> {
        if !self.modules.is_empty() {
            return Ok(self.modules.clone());
        }
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT module FROM schema_migrations ORDER BY module")
                .fetch_all(&self.pool)
                .await
                .map_err(query_error)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn database_size(&self) -> Result<i64, CollectError> {
        let row: (i64,) = sqlx::query_as("SELECT pg_database_size(current_database())")
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(row.0)
    }

    async fn table_row_counts(&self) -> Result<BTreeMap<String, i64>, CollectError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT schemaname || '.' || relname, n_live_tup \
             FROM pg_stat_user_tables ORDER BY schemaname, relname",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(rows.into_iter().collect())
    }
}
