//! Static settings for the orchestrators: tool locations, connection
//! parameters and filesystem roots.
//!
//! Runtime-tunable backup settings (storage path, retention, schedule) live
//! in the `backup_configuration` row instead.

use std::path::PathBuf;
use std::time::Duration;

/// Default wall-clock limit for dump and restore tool runs (1 hour).
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(3600);

/// Connection parameters handed to the dump/restore tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: None,
            database: "postgres".to_string(),
        }
    }
}

impl ConnectionParams {
    /// Connection flags common to every tool invocation.
    pub fn args(&self) -> Vec<String> {
        vec![
            format!("--host={}", self.host),
            format!("--port={}", self.port),
            format!("--username={}", self.user),
            format!("--dbname={}", self.database),
        ]
    }

    /// Environment overlay carrying the password, if any.
    pub fn env(&self) -> Vec<(String, String)> {
        self.password
            .iter()
            .map(|p| ("PGPASSWORD".to_string(), p.clone()))
            .collect()
    }
}

/// Everything the orchestrators need that does not change at runtime.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub connection: ConnectionParams,
    pub pg_dump_bin: String,
    pub pg_restore_bin: String,
    /// Program and leading arguments of the migrate command. The module name
    /// and target migration are appended. Empty disables migration.
    pub migrate_command: Vec<String>,
    pub tool_timeout: Duration,
    pub media_root: PathBuf,
    /// Explicit application version; when absent the git revision is used.
    pub app_version: Option<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            connection: ConnectionParams::default(),
            pg_dump_bin: "pg_dump".to_string(),
            pg_restore_bin: "pg_restore".to_string(),
            migrate_command: Vec::new(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            media_root: PathBuf::from("media"),
            app_version: None,
        }
    }
}

/// Runtime identity recorded on every backup.
pub fn runtime_version() -> String {
    format!(
        "sanvault {} ({}/{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
