use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sanvault_orchestrator::settings::{ConnectionParams, OrchestratorSettings};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub connection: ConnectionParams,
    pub pg_dump_bin: String,
    pub pg_restore_bin: String,
    pub migrate_command: Vec<String>,
    pub media_root: PathBuf,
    pub app_version: Option<String>,
    pub tool_timeout: Duration,
    pub scheduler_poll: Duration,
    pub installed_modules: Vec<String>,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default       |
    /// |-----------------------|---------------|
    /// | `DATABASE_URL`        | required      |
    /// | `PGHOST`              | `localhost`   |
    /// | `PGPORT`              | `5432`        |
    /// | `PGUSER`              | `postgres`    |
    /// | `PGPASSWORD`          | unset         |
    /// | `PGDATABASE`          | `postgres`    |
    /// | `PG_DUMP_BIN`         | `pg_dump`     |
    /// | `PG_RESTORE_BIN`      | `pg_restore`  |
    /// | `MIGRATE_COMMAND`     | unset (migrations disabled) |
    /// | `MEDIA_ROOT`          | `media`       |
    /// | `APP_VERSION`         | git revision  |
    /// | `TOOL_TIMEOUT_SECS`   | `3600`        |
    /// | `SCHEDULER_POLL_SECS` | `60`          |
    /// | `INSTALLED_MODULES`   | from migration ledger |
    /// | `LOG_FORMAT`          | `text`        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`WorkerConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let defaults = ConnectionParams::default();
        let connection = ConnectionParams {
            host: var("PGHOST").unwrap_or(defaults.host),
            port: parsed(&var, "PGPORT", defaults.port)?,
            user: var("PGUSER").unwrap_or(defaults.user),
            password: var("PGPASSWORD"),
            database: var("PGDATABASE").unwrap_or(defaults.database),
        };

        let migrate_command = var("MIGRATE_COMMAND")
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let installed_modules = var("INSTALLED_MODULES")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let log_format = match var("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            database_url,
            connection,
            pg_dump_bin: var("PG_DUMP_BIN").unwrap_or_else(|| "pg_dump".into()),
            pg_restore_bin: var("PG_RESTORE_BIN").unwrap_or_else(|| "pg_restore".into()),
            migrate_command,
            media_root: var("MEDIA_ROOT").map_or_else(|| PathBuf::from("media"), PathBuf::from),
            app_version: var("APP_VERSION"),
            tool_timeout: Duration::from_secs(parsed(&var, "TOOL_TIMEOUT_SECS", 3600)?),
            scheduler_poll: Duration::from_secs(parsed(&var, "SCHEDULER_POLL_SECS", 60)?),
            installed_modules,
            log_format,
        })
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            connection: self.connection.clone(),
            pg_dump_bin: self.pg_dump_bin.clone(),
            pg_restore_bin: self.pg_restore_bin.clone(),
            migrate_command: self.migrate_command.clone(),
            tool_timeout: self.tool_timeout,
            media_root: self.media_root.clone(),
            app_version: self.app_version.clone(),
        }
    }
}

fn parsed<T: FromStr>(
    var: impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/inventory")]).unwrap();
        assert_eq!(config.connection, ConnectionParams::default());
        assert_eq!(config.pg_dump_bin, "pg_dump");
        assert!(config.migrate_command.is_empty());
        assert_eq!(config.tool_timeout, Duration::from_secs(3600));
        assert_eq!(config.scheduler_poll, Duration::from_secs(60));
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.app_version.is_none());
    }

    #[test]
    fn database_url_is_required() {
        assert_matches!(load(&[]), Err(ConfigError::Missing("DATABASE_URL")));
        assert_matches!(
            load(&[("DATABASE_URL", "  ")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn lists_and_numbers_are_parsed() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/inventory"),
            ("PGPORT", "6432"),
            ("PGPASSWORD", "hunter2"),
            ("MIGRATE_COMMAND", "inventory-admin migrate --noinput"),
            ("INSTALLED_MODULES", "inventory, san,,zones "),
            ("TOOL_TIMEOUT_SECS", "120"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();

        assert_eq!(config.connection.port, 6432);
        assert_eq!(config.connection.password.as_deref(), Some("hunter2"));
        assert_eq!(
            config.migrate_command,
            vec!["inventory-admin", "migrate", "--noinput"]
        );
        assert_eq!(config.installed_modules, vec!["inventory", "san", "zones"]);
        assert_eq!(config.orchestrator_settings().tool_timeout, Duration::from_secs(120));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = load(&[("DATABASE_URL", "postgres://db/x"), ("PGPORT", "five")]).unwrap_err();
        assert_matches!(err, ConfigError::Invalid { name: "PGPORT", .. });

        let err = load(&[("DATABASE_URL", "postgres://db/x"), ("LOG_FORMAT", "xml")]).unwrap_err();
        assert_matches!(err, ConfigError::Invalid { name: "LOG_FORMAT", .. });
    }
}
