#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sanvault_core::provenance::CollectError;
use sanvault_core::schema::SchemaSnapshot;
use sanvault_core::types::DbId;
use sanvault_db::models::backup_configuration::UpdateBackupConfiguration;
use sanvault_db::models::backup_record::{BackupRecord, CreateBackupRecord};
use sanvault_db::models::operation_log::OperationRef;
use sanvault_orchestrator::backup::BackupOrchestrator;
use sanvault_orchestrator::context::OperationContext;
use sanvault_orchestrator::inspector::DatabaseInspector;
use sanvault_orchestrator::memory::MemoryStore;
use sanvault_orchestrator::process::{CommandRunner, CommandSpec, ProcessError, ProcessOutput};
use sanvault_orchestrator::services::Services;
use sanvault_orchestrator::settings::OrchestratorSettings;
use sanvault_orchestrator::store::BackupStore;
use tempfile::TempDir;

pub const APP_VERSION: &str = "1.4.2";
pub const SERVER_VERSION: &str = "PostgreSQL 16.2";

/// How the fake tools behave. Adjust between steps with
/// [`FakeRunner::configure`].
#[derive(Default)]
pub struct Script {
    pub dump_exit: i32,
    pub dump_stderr: String,
    /// Runs inside the fake dump tool, after the file is written.
    pub on_dump: Option<Arc<dyn Fn() + Send + Sync>>,
    pub list_exit: i32,
    pub restore_exit: i32,
    pub restore_stderr: String,
    /// The fake restore tool dies on a signal instead of exiting.
    pub restore_signaled: bool,
    /// Runs inside the fake restore tool, before it returns.
    pub on_restore: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Module whose migrate command exits non-zero.
    pub failing_migration: Option<String>,
}

/// Scripted stand-in for `pg_dump`, `pg_restore`, the migrate command and
/// `git`.
#[derive(Default)]
pub struct FakeRunner {
    script: Mutex<Script>,
    calls: Mutex<Vec<CommandSpec>>,
    dumps: Mutex<u32>,
}

impl FakeRunner {
    pub fn configure(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.script.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }

    fn output(exit_code: i32, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
            signaled: false,
            duration_ms: 3,
        }
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: CommandSpec) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().unwrap().push(spec.clone());
        if spec.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(ProcessError::Cancelled(spec.program));
        }

        match spec.program.as_str() {
            "pg_dump" => {
                let n = {
                    let mut dumps = self.dumps.lock().unwrap();
                    *dumps += 1;
                    *dumps
                };
                let file = spec
                    .args
                    .iter()
                    .find_map(|a| a.strip_prefix("--file="))
                    .expect("dump command carries --file=");
                std::fs::write(file, format!("PGDMP fake dump #{n}")).unwrap();

                let (exit, stderr, hook) = {
                    let script = self.script.lock().unwrap();
                    (script.dump_exit, script.dump_stderr.clone(), script.on_dump.clone())
                };
                if let Some(hook) = hook {
                    hook();
                }
                Ok(Self::output(exit, &stderr))
            }
            "pg_restore" if spec.args.first().map(String::as_str) == Some("--list") => {
                let script = self.script.lock().unwrap();
                Ok(Self::output(script.list_exit, ""))
            }
            "pg_restore" => {
                let (exit, stderr, signaled, hook) = {
                    let script = self.script.lock().unwrap();
                    (
                        script.restore_exit,
                        script.restore_stderr.clone(),
                        script.restore_signaled,
                        script.on_restore.clone(),
                    )
                };
                if let Some(hook) = hook {
                    hook();
                }
                if signaled {
                    return Ok(ProcessOutput {
                        exit_code: -1,
                        signaled: true,
                        ..Self::output(0, &stderr)
                    });
                }
                Ok(Self::output(exit, &stderr))
            }
            "migrate" => {
                let module = spec.args.get(1).cloned().unwrap_or_default();
                let script = self.script.lock().unwrap();
                if script.failing_migration.as_deref() == Some(module.as_str()) {
                    Ok(Self::output(1, "migration 0003 raised an exception"))
                } else {
                    Ok(Self::output(0, ""))
                }
            }
            other => Err(ProcessError::NotFound(other.to_string())),
        }
    }
}

/// Inspector returning a settable migration snapshot.
pub struct FakeInspector {
    pub current: Mutex<SchemaSnapshot>,
}

impl FakeInspector {
    pub fn new(current: SchemaSnapshot) -> Self {
        Self {
            current: Mutex::new(current),
        }
    }

    pub fn set_current(&self, snapshot: SchemaSnapshot) {
        *self.current.lock().unwrap() = snapshot;
    }
}

#[async_trait]
impl DatabaseInspector for FakeInspector {
    async fn server_version(&self) -> Result<String, CollectError> {
        Ok(SERVER_VERSION.to_string())
    }

    async fn applied_migrations(&self) -> Result<SchemaSnapshot, CollectError> {
        Ok(self.current.lock().unwrap().clone())
    }

    async fn installed_modules(&self) -> Result<Vec<String>, CollectError> {
        Ok(self.current.lock().unwrap().keys().cloned().collect())
    }

    async fn database_size(&self) -> Result<i64, CollectError> {
        Ok(8_388_608)
    }

    async fn table_row_counts(&self) -> Result<BTreeMap<String, i64>, CollectError> {
        Ok(BTreeMap::from([
            ("hosts".to_string(), 42),
            ("volumes".to_string(), 7),
        ]))
    }
}

pub fn snapshot(entries: &[(&str, &[&str])]) -> SchemaSnapshot {
    entries
        .iter()
        .map(|(module, migrations)| {
            (
                module.to_string(),
                migrations.iter().map(|m| m.to_string()).collect(),
            )
        })
        .collect()
}

pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<MemoryStore>,
    pub runner: Arc<FakeRunner>,
    pub inspector: Arc<FakeInspector>,
    pub services: Services,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let runner = Arc::new(FakeRunner::default());
        let inspector = Arc::new(FakeInspector::new(snapshot(&[
            ("inventory", &["0001_initial", "0002_hosts"]),
            ("san", &["0001_initial"]),
        ])));

        let settings = OrchestratorSettings {
            migrate_command: vec!["migrate".into(), "apply".into()],
            media_root: dir.path().join("media"),
            app_version: Some(APP_VERSION.into()),
            ..Default::default()
        };
        store
            .update_configuration(&UpdateBackupConfiguration {
                storage_path: Some(dir.path().join("backups").display().to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let services = Services::new(store.clone(), runner.clone(), inspector.clone(), settings);
        Self {
            dir,
            store,
            runner,
            inspector,
            services,
        }
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.dir.path().join("backups")
    }

    pub fn media_root(&self) -> PathBuf {
        self.dir.path().join("media")
    }

    /// Create and run a full backup to `completed`.
    pub async fn completed_backup(&self, name: &str, include_media: bool) -> BackupRecord {
        let record = self
            .store
            .create_backup(&CreateBackupRecord::full(name))
            .await
            .unwrap();
        BackupOrchestrator::new(self.services.clone())
            .run(&OperationContext::new(), record.id, include_media)
            .await
            .unwrap()
    }

    pub async fn backup(&self, id: DbId) -> BackupRecord {
        self.store.find_backup(id).await.unwrap().unwrap()
    }

    pub async fn log_messages(&self, operation: OperationRef) -> Vec<(String, String)> {
        self.store
            .list_logs(operation)
            .await
            .unwrap()
            .into_iter()
            .map(|l| (l.level, l.message))
            .collect()
    }
}
