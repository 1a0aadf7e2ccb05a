//! Argument vectors for the dump, restore, list and migrate tools.
//!
//! Secrets never appear in argv; the password travels in `PGPASSWORD`.

use std::path::Path;

use sanvault_core::artifact::{BACKUP_TYPE_DATA_ONLY, BACKUP_TYPE_SCHEMA_ONLY, BOOKKEEPING_TABLES};
use sanvault_core::schema::MigrationStep;

use crate::process::CommandSpec;
use crate::settings::OrchestratorSettings;

/// Compression level used when `compress_backups` is on.
const DUMP_COMPRESSION_LEVEL: u8 = 6;

/// `pg_dump` in custom format, excluding the bookkeeping tables.
pub fn dump_command(
    settings: &OrchestratorSettings,
    output: &Path,
    backup_type: &str,
    compress: bool,
) -> CommandSpec {
    let mut args = settings.connection.args();
    args.push("--format=custom".to_string());
    args.push(format!("--file={}", output.display()));
    args.push(format!(
        "--compress={}",
        if compress { DUMP_COMPRESSION_LEVEL } else { 0 }
    ));

    match backup_type {
        BACKUP_TYPE_SCHEMA_ONLY => args.push("--schema-only".to_string()),
        BACKUP_TYPE_DATA_ONLY => args.push("--data-only".to_string()),
        _ => {}
    }

    for table in BOOKKEEPING_TABLES {
        args.push(format!("--exclude-table=public.{table}"));
    }

    CommandSpec::new(&settings.pg_dump_bin, args)
        .with_env(settings.connection.env())
        .with_timeout(settings.tool_timeout)
}

/// `pg_restore` over the live database, replacing existing objects.
pub fn restore_command(settings: &OrchestratorSettings, artifact: &Path) -> CommandSpec {
    let mut args = settings.connection.args();
    args.extend(
        ["--clean", "--if-exists", "--no-owner", "--no-privileges"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(artifact.display().to_string());

    CommandSpec::new(&settings.pg_restore_bin, args)
        .with_env(settings.connection.env())
        .with_timeout(settings.tool_timeout)
}

/// `pg_restore --list`: reads the archive's table of contents only.
pub fn list_command(settings: &OrchestratorSettings, artifact: &Path) -> CommandSpec {
    CommandSpec::new(
        &settings.pg_restore_bin,
        vec!["--list".to_string(), artifact.display().to_string()],
    )
    .with_timeout(settings.tool_timeout)
}

/// The configured migrate command for one plan step, or `None` if no
/// migrate command is configured or the step is empty.
pub fn migrate_command(settings: &OrchestratorSettings, step: &MigrationStep) -> Option<CommandSpec> {
    let (program, leading) = settings.migrate_command.split_first()?;
    let target = step.target()?;

    let mut args = leading.to_vec();
    args.push(step.module.clone());
    args.push(target.to_string());

    Some(
        CommandSpec::new(program, args)
            .with_env(settings.connection.env())
            .with_timeout(settings.tool_timeout),
    )
}
