use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use sanvault_core::artifact::ARTIFACT_TIMESTAMP_FORMAT;
use sanvault_db::models::operation_log::OperationRef;
use sanvault_orchestrator::backup::BackupOrchestrator;
use sanvault_orchestrator::context::{JobState, OperationContext};
use sanvault_orchestrator::inspector::PgInspector;
use sanvault_orchestrator::jobs::{BackupRequest, JobHandle, JobManager};
use sanvault_orchestrator::process::SystemRunner;
use sanvault_orchestrator::scheduler::BackupScheduler;
use sanvault_orchestrator::services::Services;
use sanvault_orchestrator::store::{BackupStore, PgStore};
use sanvault_worker::cli::{Cli, Commands};
use sanvault_worker::config::{LogFormat, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env()?;
    init_tracing(config.log_format);

    let pool = sanvault_db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    sanvault_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    sanvault_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    let store: Arc<dyn BackupStore> = Arc::new(PgStore::new(pool.clone()));
    let services = Services::new(
        store.clone(),
        Arc::new(SystemRunner),
        Arc::new(PgInspector::new(pool, config.installed_modules.clone())),
        config.orchestrator_settings(),
    );
    let jobs = JobManager::new(services.clone());

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());
    let mut ctx = OperationContext::new().with_cancel(shutdown.clone());
    if let Some(actor) = cli.actor {
        ctx = ctx.with_actor(actor);
    }

    match cli.command {
        Commands::Backup(args) => {
            let name = args.name.unwrap_or_else(|| {
                format!("manual_{}", Utc::now().format(ARTIFACT_TIMESTAMP_FORMAT))
            });
            let request = BackupRequest {
                name,
                description: args.description,
                backup_type: args.backup_type,
                include_media: args.media,
            };
            let (id, handle) = jobs.start_backup(ctx, request).await?;
            tracing::info!(backup_id = id, "Backup started");
            follow(handle).await?;
        }
        Commands::Verify { backup_id } => {
            follow(jobs.start_verify(ctx, backup_id)).await?;
        }
        Commands::Restore(args) => {
            let (id, handle) = jobs
                .start_restore(ctx, args.backup_id, args.media, args.migrate)
                .await?;
            tracing::info!(restore_id = id, backup_id = args.backup_id, "Restore started");
            follow(handle).await?;
        }
        Commands::List { limit, offset } => {
            for b in store.list_backups(limit, offset).await? {
                println!(
                    "{:>6}  {:<11}  {:<11}  {:>12}  {}  {}",
                    b.id,
                    b.status().map_or_else(|| b.status_id.to_string(), |s| s.to_string()),
                    b.backup_type,
                    b.file_size,
                    b.created_at.format("%Y-%m-%d %H:%M:%S"),
                    b.name
                );
            }
        }
        Commands::Delete { backup_id } => {
            BackupOrchestrator::new(services).delete(backup_id).await?;
            println!("Deleted backup {backup_id}");
        }
        Commands::Logs(args) => {
            let operation = match (args.backup, args.restore) {
                (Some(id), _) => OperationRef::Backup(id),
                (None, Some(op)) => OperationRef::Restore(op),
                (None, None) => bail!("either --backup or --restore is required"),
            };
            for entry in store.list_logs(operation).await? {
                println!(
                    "{} {:<7} {}",
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.level,
                    entry.message
                );
            }
        }
        Commands::Config(args) => {
            let current = match args.to_update() {
                Some(update) => store.update_configuration(&update).await?,
                None => store.get_configuration().await?,
            };
            println!("{}", serde_json::to_string_pretty(&current)?);
        }
        Commands::Schedule => {
            BackupScheduler::new(jobs, config.scheduler_poll)
                .run(shutdown)
                .await;
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sanvault_worker=info,sanvault_orchestrator=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            token.cancel();
        }
    });
}

/// Log progress until the job finishes; print its result on success.
async fn follow(handle: JobHandle) -> anyhow::Result<()> {
    let mut progress = handle.subscribe();
    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snap = progress.borrow_and_update().clone();
            if !snap.message.is_empty() && !snap.state.is_finished() {
                tracing::info!(stage = snap.current, of = snap.total, "{}", snap.message);
            }
        }
    });

    let last = handle.wait().await;
    watcher.abort();

    match last.state {
        JobState::Succeeded => {
            if let Some(result) = &last.result {
                println!("{}", serde_json::to_string_pretty(result)?);
            }
            Ok(())
        }
        state => bail!(
            "job {}: {}",
            serde_json::to_value(state)?.as_str().unwrap_or("failed"),
            last.error.unwrap_or_default()
        ),
    }
}
