use clap::{Args, Parser, Subcommand};
use sanvault_core::artifact::BACKUP_TYPE_FULL;
use sanvault_core::types::DbId;
use sanvault_db::models::backup_configuration::UpdateBackupConfiguration;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "sanvault-worker")]
#[command(about = "Database backup, verification and restore worker", long_about = None)]
pub struct Cli {
    /// Recorded as the actor of triggered operations.
    #[arg(long, global = true)]
    pub actor: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Take a backup now
    Backup(BackupArgs),
    /// Re-check a backup's checksum and archive readability
    Verify { backup_id: DbId },
    /// Restore the database from a backup
    Restore(RestoreArgs),
    /// List backups, newest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Delete a backup and its artifacts
    Delete { backup_id: DbId },
    /// Show the log of a backup or restore
    Logs(LogsArgs),
    /// Show or change the backup configuration
    Config(ConfigArgs),
    /// Run the automatic backup scheduler until interrupted
    Schedule,
}

#[derive(Debug, Args)]
pub struct BackupArgs {
    /// Defaults to `manual_<timestamp>`.
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, default_value = "")]
    pub description: String,
    /// `full`, `schema_only` or `data_only`.
    #[arg(long = "type", default_value = BACKUP_TYPE_FULL)]
    pub backup_type: String,
    /// Also archive the media directory.
    #[arg(long)]
    pub media: bool,
}

#[derive(Debug, Args)]
pub struct RestoreArgs {
    pub backup_id: DbId,
    /// Also extract the backup's media archive.
    #[arg(long)]
    pub media: bool,
    /// Apply migrations the running code has that the backup lacks.
    #[arg(long)]
    pub migrate: bool,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct LogsArgs {
    #[arg(long)]
    pub backup: Option<DbId>,
    /// Restore operation id.
    #[arg(long)]
    pub restore: Option<Uuid>,
}

#[derive(Debug, Default, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub storage_path: Option<String>,
    #[arg(long)]
    pub max_backups: Option<i32>,
    #[arg(long)]
    pub auto_backup: Option<bool>,
    /// `hourly`, `daily` or `weekly`.
    #[arg(long)]
    pub frequency: Option<String>,
    #[arg(long)]
    pub hour: Option<i32>,
    #[arg(long)]
    pub auto_media: Option<bool>,
    #[arg(long)]
    pub retention_days: Option<i32>,
    #[arg(long)]
    pub compress: Option<bool>,
}

impl ConfigArgs {
    /// `None` when no field was given, i.e. a read-only invocation.
    pub fn to_update(&self) -> Option<UpdateBackupConfiguration> {
        let update = UpdateBackupConfiguration {
            storage_path: self.storage_path.clone(),
            max_backups: self.max_backups,
            auto_backup_enabled: self.auto_backup,
            backup_frequency: self.frequency.clone(),
            backup_hour: self.hour,
            auto_backup_include_media: self.auto_media,
            retention_days: self.retention_days,
            compress_backups: self.compress,
        };
        let empty = update.storage_path.is_none()
            && update.max_backups.is_none()
            && update.auto_backup_enabled.is_none()
            && update.backup_frequency.is_none()
            && update.backup_hour.is_none()
            && update.auto_backup_include_media.is_none()
            && update.retention_days.is_none()
            && update.compress_backups.is_none();
        (!empty).then_some(update)
    }
}
