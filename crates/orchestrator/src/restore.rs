//! Restore orchestration.
//!
//! Stages: validating, pre_backup, restoring, optional migrating. The
//! restore tool replaces the database contents, and with them possibly the
//! row this orchestrator is tracking. Every persist therefore goes through
//! [`RestoreOrchestrator::persist`], which re-creates the row under its
//! logical `operation_id` when the update-by-id touches nothing.

use std::path::Path;

use chrono::Utc;
use sanvault_core::artifact::ARTIFACT_TIMESTAMP_FORMAT;
use sanvault_core::checksum::{verify_file, ChecksumError};
use sanvault_core::error::CoreError;
use sanvault_core::provenance::CollectError;
use sanvault_core::restore_output;
use sanvault_core::schema::reconcile;
use sanvault_core::status::RestoreStatus;
use sanvault_core::types::DbId;
use sanvault_db::models::backup_record::{BackupRecord, CreateBackupRecord};
use sanvault_db::models::operation_log::OperationRef;
use sanvault_db::models::restore_record::{RecreateRestoreRecord, RestoreRecord};
use sqlx::types::Json;

use crate::backup::{BackupOrchestrator, Retention};
use crate::context::OperationContext;
use crate::lock::MaintenanceGuard;
use crate::logger::OperationLogger;
use crate::media::extract_archive;
use crate::process::{excerpt, ProcessError};
use crate::services::Services;
use crate::store::StoreError;
use crate::tools;

/// Number of progress stages reported by [`RestoreOrchestrator::run`].
const RESTORE_STAGES: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Restore {id} cannot run while {status}")]
    InvalidState { id: DbId, status: String },

    #[error("Backup {backup_id} is not restorable (status {status})")]
    SourceNotRestorable { backup_id: DbId, status: String },

    #[error(transparent)]
    Integrity(#[from] ChecksumError),

    #[error("Current schema state unavailable: {0}")]
    SchemaUnavailable(CollectError),

    #[error("Restore tool not found: {0}")]
    ToolMissing(String),

    #[error("Restore timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Restore failed: {0}")]
    ToolFailed(String),

    #[error("Migration of module '{module}' failed: {reason}")]
    MigrationFailed { module: String, reason: String },

    #[error("Restore was cancelled before the destructive step")]
    Cancelled,

    #[error(transparent)]
    Process(ProcessError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct RestoreOrchestrator {
    services: Services,
    backups: BackupOrchestrator,
}

impl RestoreOrchestrator {
    pub fn new(services: Services) -> Self {
        Self {
            backups: BackupOrchestrator::new(services.clone()),
            services,
        }
    }

    /// Run a `pending` restore under the maintenance lock.
    pub async fn run(
        &self,
        ctx: &OperationContext,
        restore_id: DbId,
    ) -> Result<RestoreRecord, RestoreError> {
        let guard = self.services.lock.try_acquire(format!("restore {restore_id}"))?;
        self.run_guarded(&guard, ctx, restore_id).await
    }

    /// Run a restore with the maintenance lock already held by the caller.
    pub async fn run_guarded(
        &self,
        guard: &MaintenanceGuard,
        ctx: &OperationContext,
        restore_id: DbId,
    ) -> Result<RestoreRecord, RestoreError> {
        let store = &self.services.store;
        let mut record = store
            .find_restore(restore_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "restore",
                id: restore_id,
            })?;
        if record.status() != Some(RestoreStatus::Pending) {
            return Err(RestoreError::InvalidState {
                id: record.id,
                status: status_label(&record),
            });
        }

        let logger = OperationLogger::new(store.clone(), OperationRef::Restore(record.operation_id));
        logger
            .info(format!(
                "Restore of backup {} started by {}",
                record.backup_id,
                ctx.actor_label()
            ))
            .await;
        record.started_at = Some(Utc::now());

        match self.execute(guard, ctx, &mut record, &logger).await {
            Ok(()) => {
                record.status_id = RestoreStatus::Completed.id();
                record.completed_at = Some(Utc::now());
                record.error_message = None;
                self.persist(&mut record).await?;
                logger.info("Restore completed").await;
                ctx.progress
                    .report(RESTORE_STAGES, RESTORE_STAGES, "Restore completed");
                Ok(record)
            }
            Err(e) => {
                logger.error(format!("Restore failed: {e}")).await;
                record.status_id = RestoreStatus::Failed.id();
                record.completed_at = Some(Utc::now());
                record.error_message = Some(e.to_string());
                if let Err(store_err) = self.persist(&mut record).await {
                    tracing::error!(
                        operation_id = %record.operation_id,
                        error = %store_err,
                        "Failed to record restore failure"
                    );
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        guard: &MaintenanceGuard,
        ctx: &OperationContext,
        record: &mut RestoreRecord,
        logger: &OperationLogger,
    ) -> Result<(), RestoreError> {
        let store = &self.services.store;
        let settings = &self.services.settings;

        // -- validating ---------------------------------------------------
        self.advance(record, RestoreStatus::Validating).await?;
        ctx.progress.report(1, RESTORE_STAGES, "Validating backup");

        let source = store
            .find_backup(record.backup_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "backup",
                id: record.backup_id,
            })?;
        if !source.is_restorable() {
            return Err(RestoreError::SourceNotRestorable {
                backup_id: source.id,
                status: source
                    .status()
                    .map_or_else(|| source.status_id.to_string(), |s| s.to_string()),
            });
        }
        let artifact = Path::new(&source.file_path);
        verify_file(artifact, &source.checksum).await?;
        logger.info(format!("Artifact {} verified", source.file_path)).await;

        let current = self
            .services
            .inspector
            .applied_migrations()
            .await
            .map_err(RestoreError::SchemaUnavailable)?;
        let reconciliation = reconcile(&source.schema_snapshot.0, &current);
        for warning in &reconciliation.warnings {
            logger.warning(warning.message.clone()).await;
        }
        if !reconciliation.plan.is_empty() {
            logger
                .info(format!(
                    "{} module(s) have migrations newer than the backup",
                    reconciliation.plan.len()
                ))
                .await;
        }
        record.schema_compatible = reconciliation.schema_compatible;
        record.migration_plan = Json(reconciliation.plan);
        record.compatibility_warnings = Json(reconciliation.warnings);
        self.persist(record).await?;

        // -- pre_backup ---------------------------------------------------
        self.advance(record, RestoreStatus::PreBackup).await?;
        ctx.progress
            .report(2, RESTORE_STAGES, "Taking pre-restore backup");
        match self.take_safety_backup(guard, ctx, record).await {
            Ok(safety) => {
                logger
                    .info(format!("Pre-restore backup {} completed", safety.id))
                    .await;
                record.pre_restore_backup_id = Some(safety.id);
                self.persist(record).await?;
            }
            Err(e) => {
                logger
                    .warning(format!("Pre-restore backup failed, continuing without it: {e}"))
                    .await;
            }
        }

        // -- restoring ----------------------------------------------------
        if ctx.is_cancelled() {
            return Err(RestoreError::Cancelled);
        }
        self.advance(record, RestoreStatus::Restoring).await?;
        ctx.progress.report(3, RESTORE_STAGES, "Restoring database");

        // Never cancelled once started.
        let spec = tools::restore_command(settings, artifact);
        logger.info(format!("Running {}", spec.display())).await;
        let output = self.services.runner.run(spec).await.map_err(|e| match e {
            ProcessError::NotFound(program) => RestoreError::ToolMissing(program),
            ProcessError::Timeout { elapsed_ms, .. } => RestoreError::Timeout { elapsed_ms },
            other => RestoreError::Process(other),
        })?;

        if output.signaled {
            return Err(RestoreError::ToolFailed(format!(
                "restore tool was killed by a signal: {}",
                excerpt(&output.stderr, 500)
            )));
        }
        let assessment = restore_output::assess(output.exit_code, &output.stderr);
        logger
            .debug(format!(
                "Restore tool exited with code {} ({} benign, {} noise, {} fatal lines)",
                assessment.exit_code,
                assessment.benign_lines,
                assessment.noise_lines,
                assessment.fatal_lines.len()
            ))
            .await;
        if assessment.is_failure() {
            return Err(RestoreError::ToolFailed(assessment.failure_summary()));
        }
        if assessment.exit_code != 0 {
            logger
                .warning(format!(
                    "Restore tool exited with code {} but reported only benign errors",
                    assessment.exit_code
                ))
                .await;
        }
        self.persist(record).await?;

        // -- media --------------------------------------------------------
        if record.restore_media {
            ctx.progress.report(4, RESTORE_STAGES, "Restoring media");
            self.restore_media(&source, logger).await;
        }

        // -- migrating ----------------------------------------------------
        let plan = record.migration_plan.0.clone();
        if plan.is_empty() {
            return Ok(());
        }
        if !record.run_migrations {
            logger
                .warning(format!(
                    "{} module(s) left behind the running code; migrations were not requested",
                    plan.len()
                ))
                .await;
            return Ok(());
        }

        self.advance(record, RestoreStatus::Migrating).await?;
        ctx.progress.report(5, RESTORE_STAGES, "Applying migrations");
        for step in plan {
            let spec = tools::migrate_command(settings, &step).ok_or_else(|| {
                RestoreError::MigrationFailed {
                    module: step.module.clone(),
                    reason: "no migrate command configured".to_string(),
                }
            })?;
            logger.info(format!("Running {}", spec.display())).await;

            let output = self.services.runner.run(spec).await.map_err(|e| {
                RestoreError::MigrationFailed {
                    module: step.module.clone(),
                    reason: e.to_string(),
                }
            })?;
            if !output.success() {
                return Err(RestoreError::MigrationFailed {
                    module: step.module.clone(),
                    reason: format!(
                        "exit code {}: {}",
                        output.exit_code,
                        excerpt(&output.stderr, 500)
                    ),
                });
            }

            logger
                .info(format!(
                    "Migrated module '{}' to {}",
                    step.module,
                    step.target().unwrap_or_default()
                ))
                .await;
            record.migrations_applied.0.push(step);
            self.persist(record).await?;
        }

        Ok(())
    }

    /// Create and run a `full` backup without media before anything
    /// destructive happens.
    async fn take_safety_backup(
        &self,
        guard: &MaintenanceGuard,
        ctx: &OperationContext,
        record: &RestoreRecord,
    ) -> Result<BackupRecord, crate::backup::BackupError> {
        let now = Utc::now();
        let mut input = CreateBackupRecord::full(format!(
            "pre_restore_{}",
            now.format(ARTIFACT_TIMESTAMP_FORMAT)
        ));
        input.description = format!(
            "Safety backup before restore {} of backup {}",
            record.operation_id, record.backup_id
        );
        let safety = self.services.store.create_backup(&input).await?;

        // Detached from the restore job's cancellation.
        let inner = OperationContext {
            actor: ctx.actor.clone(),
            ..Default::default()
        };
        self.backups
            .run_guarded(guard, &inner, safety.id, false, Retention::Skip)
            .await
    }

    async fn restore_media(&self, source: &BackupRecord, logger: &OperationLogger) {
        if !source.has_media_archive() {
            logger
                .warning("Media restore requested but the backup has no media archive")
                .await;
            return;
        }
        let archive = Path::new(&source.media_file_path);
        match extract_archive(archive, &self.services.settings.media_root).await {
            Ok(()) => {
                logger
                    .info(format!(
                        "Media extracted to {}",
                        self.services.settings.media_root.display()
                    ))
                    .await
            }
            Err(e) => logger.warning(format!("Media restore failed: {e}")).await,
        }
    }

    /// Move to `to` and persist.
    async fn advance(
        &self,
        record: &mut RestoreRecord,
        to: RestoreStatus,
    ) -> Result<(), RestoreError> {
        let from = record.status();
        if !from.is_some_and(|s| s.can_transition(to)) {
            return Err(CoreError::Internal(format!(
                "invalid restore transition from {} to {to}",
                status_label(record)
            ))
            .into());
        }
        record.status_id = to.id();
        self.persist(record).await?;
        Ok(())
    }

    /// Update by id; if the row is gone, re-create it under the same
    /// `operation_id` and adopt the new id.
    async fn persist(&self, record: &mut RestoreRecord) -> Result<(), StoreError> {
        let store = &self.services.store;
        let affected = store.update_restore(record.id, &record.to_update()).await?;
        if affected == 0 {
            let recreated = store
                .recreate_restore(&RecreateRestoreRecord::from(&*record))
                .await?;
            tracing::warn!(
                operation_id = %record.operation_id,
                old_id = record.id,
                new_id = recreated.id,
                "Restore record vanished; re-created under its operation id"
            );
            if let (Some(lost), None) =
                (record.pre_restore_backup_id, recreated.pre_restore_backup_id)
            {
                OperationLogger::new(store.clone(), OperationRef::Restore(record.operation_id))
                    .warning(format!(
                        "Pre-restore backup {lost} is no longer recorded; its link was dropped"
                    ))
                    .await;
            }
            record.id = recreated.id;
            record.pre_restore_backup_id = recreated.pre_restore_backup_id;
            record.created_at = recreated.created_at;
            record.updated_at = recreated.updated_at;
        }
        Ok(())
    }
}

fn status_label(record: &RestoreRecord) -> String {
    record
        .status()
        .map_or_else(|| format!("status {}", record.status_id), |s| s.to_string())
}
