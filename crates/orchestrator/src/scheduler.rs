//! Automatic backups.
//!
//! Ticks on a fixed interval; each tick reads the configuration and starts
//! a backup when the most recent schedule slot has no automatic backup yet.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sanvault_core::error::CoreError;
use sanvault_core::schedule::{is_backup_due, AUTO_BACKUP_PREFIX};
use sanvault_core::types::{DbId, Timestamp};
use tokio_util::sync::CancellationToken;

use crate::context::OperationContext;
use crate::jobs::{BackupRequest, JobHandle, JobManager, TriggerError};
use crate::store::{BackupStore, StoreError};

/// Default tick interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schedule(#[from] CoreError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),
}

pub struct BackupScheduler {
    jobs: JobManager,
    store: Arc<dyn BackupStore>,
    poll_interval: Duration,
}

impl BackupScheduler {
    pub fn new(jobs: JobManager, poll_interval: Duration) -> Self {
        Self {
            store: jobs.services().store.clone(),
            jobs,
            poll_interval,
        }
    }

    /// Tick until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.poll_interval.as_secs(),
            "Backup scheduler started"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Backup scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.tick(Utc::now(), &cancel).await {
                        Ok(Some((backup_id, _handle))) => {
                            tracing::info!(backup_id, "Scheduler: automatic backup started");
                        }
                        Ok(None) => {
                            tracing::debug!("Scheduler: no backup due");
                        }
                        Err(SchedulerError::Trigger(TriggerError::Core(CoreError::Conflict(msg)))) => {
                            tracing::info!(reason = %msg, "Scheduler: backup due but maintenance is running");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Scheduler: tick failed");
                        }
                    }
                }
            }
        }
    }

    /// Evaluate the schedule at `now`; start a backup if one is due.
    pub async fn tick(
        &self,
        now: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Option<(DbId, JobHandle)>, SchedulerError> {
        let config = self.store.get_configuration().await?;
        if !config.auto_backup_enabled {
            return Ok(None);
        }

        let last = self
            .store
            .latest_backup_with_prefix(AUTO_BACKUP_PREFIX)
            .await?
            .map(|r| r.created_at);
        if !is_backup_due(&config.backup_frequency, config.backup_hour, last, now)? {
            return Ok(None);
        }

        let mut request =
            BackupRequest::full(format!("{AUTO_BACKUP_PREFIX}{}", now.format("%Y%m%d_%H%M")));
        request.description = format!("Automatic {} backup", config.backup_frequency);
        request.include_media = config.auto_backup_include_media;

        let ctx = OperationContext::new().with_cancel(cancel.child_token());
        let started = self.jobs.start_backup(ctx, request).await?;
        Ok(Some(started))
    }
}
