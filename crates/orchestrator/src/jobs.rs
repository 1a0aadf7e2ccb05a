//! Trigger surface: start backups, restores and verifications as
//! background tasks with pollable progress.
//!
//! Backups and restores take the maintenance lock before anything is
//! written, so a conflicting request fails at trigger time instead of
//! leaving a `pending` record behind.

use std::fmt::Display;
use std::future::Future;

use sanvault_core::artifact::BACKUP_TYPE_FULL;
use sanvault_core::error::CoreError;
use sanvault_core::types::DbId;
use sanvault_db::models::backup_record::CreateBackupRecord;
use sanvault_db::models::restore_record::CreateRestoreRecord;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backup::{BackupOrchestrator, Retention};
use crate::context::{JobProgress, JobState, OperationContext, ProgressSink};
use crate::restore::RestoreOrchestrator;
use crate::services::Services;
use crate::store::StoreError;

/// Errors raised while triggering a job (not while running it).
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parameters for a new backup.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub name: String,
    pub description: String,
    pub backup_type: String,
    pub include_media: bool,
}

impl BackupRequest {
    pub fn full(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            backup_type: BACKUP_TYPE_FULL.to_string(),
            include_media: false,
        }
    }
}

/// A running job: poll it, wait for it, or ask it to stop.
pub struct JobHandle {
    progress: watch::Receiver<JobProgress>,
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

impl JobHandle {
    pub fn snapshot(&self) -> JobProgress {
        self.progress.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobProgress> {
        self.progress.clone()
    }

    /// Request cancellation. Stages that cannot be interrupted finish first.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job to finish and return its final snapshot.
    pub async fn wait(self) -> JobProgress {
        let joined = self.task.await;
        let mut last = self.progress.borrow().clone();
        if let Err(e) = joined {
            last.state = JobState::Failed;
            last.error = Some(format!("job task aborted: {e}"));
        }
        last
    }
}

#[derive(Clone)]
pub struct JobManager {
    services: Services,
    backups: BackupOrchestrator,
    restores: RestoreOrchestrator,
}

impl JobManager {
    pub fn new(services: Services) -> Self {
        Self {
            backups: BackupOrchestrator::new(services.clone()),
            restores: RestoreOrchestrator::new(services.clone()),
            services,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Create a `pending` backup record and run it in the background.
    pub async fn start_backup(
        &self,
        ctx: OperationContext,
        request: BackupRequest,
    ) -> Result<(DbId, JobHandle), TriggerError> {
        let guard = self
            .services
            .lock
            .try_acquire(format!("backup '{}'", request.name))?;

        let record = self
            .services
            .store
            .create_backup(&CreateBackupRecord {
                name: request.name,
                description: request.description,
                backup_type: request.backup_type,
                includes_media: false,
                media_file_path: String::new(),
            })
            .await?;
        let id = record.id;
        tracing::info!(backup_id = id, actor = ctx.actor_label(), "Backup job queued");

        let backups = self.backups.clone();
        let include_media = request.include_media;
        let handle = spawn_job(ctx, move |ctx| async move {
            backups
                .run_guarded(&guard, &ctx, id, include_media, Retention::Apply)
                .await
        });
        Ok((id, handle))
    }

    /// Create a `pending` restore record for `backup_id` and run it in the
    /// background.
    pub async fn start_restore(
        &self,
        ctx: OperationContext,
        backup_id: DbId,
        restore_media: bool,
        run_migrations: bool,
    ) -> Result<(DbId, JobHandle), TriggerError> {
        let guard = self
            .services
            .lock
            .try_acquire(format!("restore of backup {backup_id}"))?;

        let store = &self.services.store;
        if store.find_backup(backup_id).await?.is_none() {
            return Err(CoreError::NotFound {
                entity: "backup",
                id: backup_id,
            }
            .into());
        }
        let record = store
            .create_restore(&CreateRestoreRecord {
                backup_id,
                restore_media,
                run_migrations,
            })
            .await?;
        let id = record.id;
        tracing::info!(
            restore_id = id,
            operation_id = %record.operation_id,
            backup_id,
            actor = ctx.actor_label(),
            "Restore job queued"
        );

        let restores = self.restores.clone();
        let handle = spawn_job(ctx, move |ctx| async move {
            restores.run_guarded(&guard, &ctx, id).await
        });
        Ok((id, handle))
    }

    /// Verify a backup in the background. Does not take the maintenance lock.
    pub fn start_verify(&self, ctx: OperationContext, backup_id: DbId) -> JobHandle {
        let backups = self.backups.clone();
        spawn_job(ctx, move |ctx| async move { backups.verify(&ctx, backup_id).await })
    }
}

/// Spawn `work` with a progress channel and a child cancellation token,
/// recording its outcome in the final snapshot.
fn spawn_job<F, Fut, T, E>(ctx: OperationContext, work: F) -> JobHandle
where
    F: FnOnce(OperationContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Serialize,
    E: Display,
{
    let (sink, rx) = ProgressSink::channel();
    let cancel = ctx.cancel.child_token();
    let job_ctx = OperationContext {
        actor: ctx.actor,
        progress: sink.clone(),
        cancel: cancel.clone(),
    };

    sink.update(|p| p.state = JobState::Running);
    let task_cancel = cancel.clone();
    let task = tokio::spawn(async move {
        let outcome = work(job_ctx).await;
        sink.update(|p| match outcome {
            Ok(value) => {
                p.state = JobState::Succeeded;
                p.result = serde_json::to_value(&value).ok();
            }
            Err(e) => {
                p.state = if task_cancel.is_cancelled() {
                    JobState::Cancelled
                } else {
                    JobState::Failed
                };
                p.error = Some(e.to_string());
            }
        });
    });

    JobHandle {
        progress: rx,
        task,
        cancel,
    }
}
