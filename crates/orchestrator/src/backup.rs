//! Backup orchestration: dump, checksum, optional media archive, retention.
//!
//! Stage writes go through column-targeted store updates; the record loaded
//! at the start of a run is never written back whole.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use sanvault_core::artifact::{dump_file_name, media_archive_name};
use sanvault_core::checksum::{sha256_file, verify_file, ChecksumError};
use sanvault_core::error::CoreError;
use sanvault_core::provenance::{version_or_placeholder, CollectError};
use sanvault_core::schema::SchemaSnapshot;
use sanvault_core::status::BackupStatus;
use sanvault_core::types::DbId;
use sanvault_db::models::backup_record::{
    BackupProvenance, BackupRecord, BackupStatistics, CompleteBackup,
};
use sanvault_db::models::operation_log::OperationRef;

use crate::cleanup;
use crate::context::OperationContext;
use crate::lock::MaintenanceGuard;
use crate::logger::OperationLogger;
use crate::media::archive_directory;
use crate::process::{excerpt, CommandSpec, ProcessError};
use crate::services::Services;
use crate::settings::runtime_version;
use crate::store::StoreError;
use crate::tools;

/// Number of progress stages reported by [`BackupOrchestrator::run`].
const BACKUP_STAGES: u32 = 6;

/// Longest stderr excerpt kept in `error_message`.
const STDERR_EXCERPT_CHARS: usize = 2000;

const GIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Backup {id} cannot {action} while {status}")]
    InvalidState {
        id: DbId,
        status: String,
        action: &'static str,
    },

    #[error("Backup tool not found: {0}")]
    ToolMissing(String),

    #[error("Dump failed with exit code {exit_code}: {stderr}")]
    DumpFailed { exit_code: i32, stderr: String },

    #[error("Dump timed out after {elapsed_ms}ms")]
    DumpTimeout { elapsed_ms: u64 },

    #[error("Backup was cancelled")]
    Cancelled,

    #[error(transparent)]
    Integrity(#[from] ChecksumError),

    #[error("Archive listing failed with exit code {exit_code}: {stderr}")]
    ListFailed { exit_code: i32, stderr: String },

    #[error(transparent)]
    Process(ProcessError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether a finished backup triggers retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Apply,
    /// Used for the pre-restore safety backup, which must not prune the
    /// restore's own source.
    Skip,
}

#[derive(Clone)]
pub struct BackupOrchestrator {
    services: Services,
}

impl BackupOrchestrator {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Run a `pending` backup to completion under the maintenance lock.
    pub async fn run(
        &self,
        ctx: &OperationContext,
        backup_id: DbId,
        include_media: bool,
    ) -> Result<BackupRecord, BackupError> {
        let guard = self.services.lock.try_acquire(format!("backup {backup_id}"))?;
        self.run_guarded(&guard, ctx, backup_id, include_media, Retention::Apply)
            .await
    }

    /// Run a backup with the maintenance lock already held by the caller.
    pub async fn run_guarded(
        &self,
        _guard: &MaintenanceGuard,
        ctx: &OperationContext,
        backup_id: DbId,
        include_media: bool,
        retention: Retention,
    ) -> Result<BackupRecord, BackupError> {
        let store = &self.services.store;
        let record = self.load(backup_id).await?;
        if !record
            .status()
            .is_some_and(|s| s.can_transition(BackupStatus::InProgress))
        {
            return Err(invalid_state(&record, "start"));
        }

        let logger = OperationLogger::new(store.clone(), OperationRef::Backup(backup_id));
        logger
            .info(format!(
                "Backup '{}' ({}) started by {}",
                record.name,
                record.backup_type,
                ctx.actor_label()
            ))
            .await;

        match self.execute(ctx, &record, include_media, &logger).await {
            Ok(done) => {
                logger
                    .info(format!(
                        "Backup completed: {} ({} bytes, sha256 {})",
                        done.file_path, done.file_size, done.checksum
                    ))
                    .await;
                if retention == Retention::Apply {
                    self.apply_retention(&logger).await;
                }
                ctx.progress
                    .report(BACKUP_STAGES, BACKUP_STAGES, "Backup completed");
                Ok(done)
            }
            Err(e) => {
                logger.error(format!("Backup failed: {e}")).await;
                if let Err(store_err) = store.fail_backup(backup_id, &e.to_string(), Utc::now()).await
                {
                    tracing::error!(backup_id, error = %store_err, "Failed to record backup failure");
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        ctx: &OperationContext,
        record: &BackupRecord,
        include_media: bool,
        logger: &OperationLogger,
    ) -> Result<BackupRecord, BackupError> {
        let store = &self.services.store;
        let settings = &self.services.settings;
        let id = record.id;

        store.mark_backup_started(id, Utc::now()).await?;

        ctx.progress.report(1, BACKUP_STAGES, "Collecting metadata");
        let provenance = self.collect_provenance(logger).await;
        store.record_backup_provenance(id, &provenance).await?;

        ctx.progress.report(2, BACKUP_STAGES, "Collecting statistics");
        let statistics = self.collect_statistics(logger).await;
        store.record_backup_statistics(id, &statistics).await?;

        let config = store.get_configuration().await?;
        let dir = PathBuf::from(&config.storage_path);
        tokio::fs::create_dir_all(&dir).await?;
        let stamp = Utc::now();
        let dump_path = dir.join(dump_file_name(id, stamp));

        if ctx.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        ctx.progress.report(3, BACKUP_STAGES, "Dumping database");
        let spec = tools::dump_command(
            settings,
            &dump_path,
            &record.backup_type,
            config.compress_backups,
        )
        .with_cancel(ctx.cancel.clone());
        logger.info(format!("Running {}", spec.display())).await;

        let output = match self.services.runner.run(spec).await {
            Ok(output) => output,
            Err(e) => {
                remove_partial(&dump_path).await;
                return Err(dump_error(e));
            }
        };
        if !output.success() {
            remove_partial(&dump_path).await;
            return Err(BackupError::DumpFailed {
                exit_code: output.exit_code,
                stderr: excerpt(&output.stderr, STDERR_EXCERPT_CHARS),
            });
        }
        logger
            .debug(format!("Dump finished in {}ms", output.duration_ms))
            .await;

        let archive_path = dir.join(media_archive_name(id, stamp));
        let finished = self
            .finish(ctx, id, &dump_path, &archive_path, include_media, logger)
            .await;
        if finished.is_err() {
            // Retention never prunes failed records, so nothing else removes these.
            remove_partial(&dump_path).await;
            remove_partial(&archive_path).await;
        }
        finished
    }

    /// Checksum the dump, archive media, and mark the record completed.
    async fn finish(
        &self,
        ctx: &OperationContext,
        id: DbId,
        dump_path: &Path,
        archive_path: &Path,
        include_media: bool,
        logger: &OperationLogger,
    ) -> Result<BackupRecord, BackupError> {
        let store = &self.services.store;
        let settings = &self.services.settings;

        ctx.progress.report(4, BACKUP_STAGES, "Computing checksum");
        if !tokio::fs::try_exists(dump_path).await? {
            return Err(ChecksumError::Missing(dump_path.display().to_string()).into());
        }
        let checksum = sha256_file(dump_path).await?;
        let file_size = tokio::fs::metadata(dump_path).await?.len() as i64;

        let mut complete = CompleteBackup {
            file_path: dump_path.display().to_string(),
            file_size,
            checksum,
            includes_media: false,
            media_file_path: String::new(),
            media_file_size: None,
        };

        if include_media {
            ctx.progress.report(5, BACKUP_STAGES, "Archiving media");
            match archive_directory(&settings.media_root, archive_path).await {
                Ok(size) => {
                    logger
                        .info(format!(
                            "Media archived to {} ({size} bytes)",
                            archive_path.display()
                        ))
                        .await;
                    complete.includes_media = true;
                    complete.media_file_path = archive_path.display().to_string();
                    complete.media_file_size = Some(size);
                }
                Err(e) => {
                    remove_partial(archive_path).await;
                    logger
                        .warning(format!("Media archive skipped: {e}"))
                        .await;
                }
            }
        }

        ctx.progress.report(6, BACKUP_STAGES, "Finalizing");
        let done = store
            .complete_backup(id, &complete, Utc::now())
            .await?
            .ok_or(CoreError::NotFound { entity: "backup", id })?;
        Ok(done)
    }

    /// Version strings and schema snapshot. Failures degrade to placeholders.
    async fn collect_provenance(&self, logger: &OperationLogger) -> BackupProvenance {
        let inspector = &self.services.inspector;

        let app = self.app_version().await;
        if let Err(e) = &app {
            logger
                .warning(format!("Application version unavailable: {e}"))
                .await;
        }
        let database = inspector.server_version().await;
        if let Err(e) = &database {
            logger
                .warning(format!("Database version unavailable: {e}"))
                .await;
        }

        let schema_snapshot = match inspector.applied_migrations().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                logger
                    .warning(format!("Schema snapshot unavailable: {e}"))
                    .await;
                SchemaSnapshot::new()
            }
        };
        let installed_modules = match inspector.installed_modules().await {
            Ok(modules) => modules,
            Err(e) => {
                logger
                    .warning(format!("Installed modules unavailable: {e}"))
                    .await;
                schema_snapshot.keys().cloned().collect()
            }
        };

        BackupProvenance {
            app_version: version_or_placeholder(&app),
            runtime_version: runtime_version(),
            database_version: version_or_placeholder(&database),
            schema_snapshot,
            installed_modules,
        }
    }

    async fn collect_statistics(&self, logger: &OperationLogger) -> BackupStatistics {
        let inspector = &self.services.inspector;

        let database_size = match inspector.database_size().await {
            Ok(size) => Some(size),
            Err(e) => {
                logger
                    .warning(format!("Database size unavailable: {e}"))
                    .await;
                None
            }
        };
        let table_counts = match inspector.table_row_counts().await {
            Ok(counts) => counts,
            Err(e) => {
                logger
                    .warning(format!("Table row counts unavailable: {e}"))
                    .await;
                Default::default()
            }
        };

        BackupStatistics {
            database_size,
            table_counts,
        }
    }

    async fn app_version(&self) -> Result<String, CollectError> {
        if let Some(version) = &self.services.settings.app_version {
            return Ok(version.clone());
        }
        let spec = CommandSpec::new(
            "git",
            vec!["rev-parse".into(), "--short".into(), "HEAD".into()],
        )
        .with_timeout(GIT_TIMEOUT);
        let output = self
            .services
            .runner
            .run(spec)
            .await
            .map_err(|e| CollectError::Command(e.to_string()))?;
        if !output.success() {
            return Err(CollectError::Command(format!(
                "git exited with code {}",
                output.exit_code
            )));
        }
        Ok(output.stdout.trim().to_string())
    }

    async fn apply_retention(&self, logger: &OperationLogger) {
        let store = &self.services.store;
        let config = match store.get_configuration().await {
            Ok(config) => config,
            Err(e) => {
                logger
                    .warning(format!("Retention skipped, configuration unavailable: {e}"))
                    .await;
                return;
            }
        };

        match cleanup::apply_retention(store.as_ref(), config.retention_policy(), Utc::now()).await {
            Ok(report) => {
                if !report.deleted.is_empty() {
                    logger
                        .info(format!(
                            "Retention removed {} backup(s): {:?}",
                            report.deleted.len(),
                            report.deleted
                        ))
                        .await;
                }
                for (id, error) in &report.failed {
                    logger
                        .warning(format!("Retention could not remove backup {id}: {error}"))
                        .await;
                }
            }
            Err(e) => logger.warning(format!("Retention failed: {e}")).await,
        }
    }

    /// Re-check a completed backup: artifact present, checksum matches, and
    /// the restore tool can read its table of contents.
    pub async fn verify(
        &self,
        ctx: &OperationContext,
        backup_id: DbId,
    ) -> Result<BackupRecord, BackupError> {
        let store = &self.services.store;
        let record = self.load(backup_id).await?;
        if !record
            .status()
            .is_some_and(|s| s.can_transition(BackupStatus::Verifying))
        {
            return Err(invalid_state(&record, "verify"));
        }

        store
            .set_backup_status(backup_id, BackupStatus::Verifying)
            .await?;
        let logger = OperationLogger::new(store.clone(), OperationRef::Backup(backup_id));
        logger
            .info(format!("Verification started by {}", ctx.actor_label()))
            .await;

        match self.check_artifact(ctx, &record, &logger).await {
            Ok(()) => {
                store
                    .set_backup_status(backup_id, BackupStatus::Verified)
                    .await?;
                logger.info("Backup verified").await;
                self.load(backup_id).await
            }
            Err(e) => {
                logger.error(format!("Verification failed: {e}")).await;
                if let Err(store_err) = store.fail_backup(backup_id, &e.to_string(), Utc::now()).await
                {
                    tracing::error!(backup_id, error = %store_err, "Failed to record verification failure");
                }
                Err(e)
            }
        }
    }

    async fn check_artifact(
        &self,
        ctx: &OperationContext,
        record: &BackupRecord,
        logger: &OperationLogger,
    ) -> Result<(), BackupError> {
        let path = Path::new(&record.file_path);

        ctx.progress.report(1, 2, "Verifying checksum");
        verify_file(path, &record.checksum).await?;
        logger.debug("Checksum matches").await;

        if record.has_media_archive()
            && !tokio::fs::try_exists(&record.media_file_path)
                .await
                .unwrap_or(false)
        {
            logger
                .warning(format!("Media archive missing: {}", record.media_file_path))
                .await;
        }

        ctx.progress.report(2, 2, "Listing archive contents");
        let spec = tools::list_command(&self.services.settings, path).with_cancel(ctx.cancel.clone());
        let output = self.services.runner.run(spec).await.map_err(|e| match e {
            ProcessError::NotFound(program) => BackupError::ToolMissing(program),
            ProcessError::Cancelled(_) => BackupError::Cancelled,
            other => BackupError::Process(other),
        })?;
        if !output.success() {
            return Err(BackupError::ListFailed {
                exit_code: output.exit_code,
                stderr: excerpt(&output.stderr, STDERR_EXCERPT_CHARS),
            });
        }
        Ok(())
    }

    /// Delete a backup's artifacts and its record.
    ///
    /// Takes the maintenance lock: a running restore's row cascades with its
    /// source backup.
    pub async fn delete(&self, backup_id: DbId) -> Result<(), BackupError> {
        let _guard = self
            .services
            .lock
            .try_acquire(format!("delete backup {backup_id}"))?;
        let record = self.load(backup_id).await?;
        if matches!(
            record.status(),
            Some(BackupStatus::InProgress | BackupStatus::Verifying)
        ) {
            return Err(invalid_state(&record, "be deleted"));
        }
        cleanup::remove_backup(self.services.store.as_ref(), &record).await?;
        tracing::info!(backup_id, name = %record.name, "Backup deleted");
        Ok(())
    }

    async fn load(&self, backup_id: DbId) -> Result<BackupRecord, BackupError> {
        Ok(self
            .services
            .store
            .find_backup(backup_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "backup",
                id: backup_id,
            })?)
    }
}

fn invalid_state(record: &BackupRecord, action: &'static str) -> BackupError {
    BackupError::InvalidState {
        id: record.id,
        status: record
            .status()
            .map_or_else(|| format!("status {}", record.status_id), |s| s.to_string()),
        action,
    }
}

fn dump_error(e: ProcessError) -> BackupError {
    match e {
        ProcessError::NotFound(program) => BackupError::ToolMissing(program),
        ProcessError::Timeout { elapsed_ms, .. } => BackupError::DumpTimeout { elapsed_ms },
        ProcessError::Cancelled(_) => BackupError::Cancelled,
        other => BackupError::Process(other),
    }
}

/// Best-effort removal of a partially written artifact.
async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial artifact");
        }
    }
}
