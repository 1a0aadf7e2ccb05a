//! Backup artifact vocabulary: backup types, log levels, artifact naming,
//! and the media-field invariant.

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Backup type constants
// ---------------------------------------------------------------------------

/// Schema and data.
pub const BACKUP_TYPE_FULL: &str = "full";
/// Schema definitions only.
pub const BACKUP_TYPE_SCHEMA_ONLY: &str = "schema_only";
/// Table data only.
pub const BACKUP_TYPE_DATA_ONLY: &str = "data_only";

/// All valid backup types.
pub const VALID_BACKUP_TYPES: &[&str] = &[
    BACKUP_TYPE_FULL,
    BACKUP_TYPE_SCHEMA_ONLY,
    BACKUP_TYPE_DATA_ONLY,
];

// ---------------------------------------------------------------------------
// Log level constants
// ---------------------------------------------------------------------------

pub const LOG_LEVEL_DEBUG: &str = "debug";
pub const LOG_LEVEL_INFO: &str = "info";
pub const LOG_LEVEL_WARNING: &str = "warning";
pub const LOG_LEVEL_ERROR: &str = "error";

/// All valid operation log levels.
pub const VALID_LOG_LEVELS: &[&str] = &[
    LOG_LEVEL_DEBUG,
    LOG_LEVEL_INFO,
    LOG_LEVEL_WARNING,
    LOG_LEVEL_ERROR,
];

// ---------------------------------------------------------------------------
// Bookkeeping tables
// ---------------------------------------------------------------------------

/// Tables owned by the backup subsystem itself.
///
/// Excluded from every dump so a restore never brings back stale
/// in-progress rows from the moment the dump was taken.
pub const BOOKKEEPING_TABLES: &[&str] = &[
    "backup_records",
    "restore_records",
    "backup_operation_logs",
];

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate that a backup type string is one of the known types.
pub fn validate_backup_type(backup_type: &str) -> Result<(), CoreError> {
    if VALID_BACKUP_TYPES.contains(&backup_type) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Unknown backup type: '{backup_type}'. Valid types: {}",
            VALID_BACKUP_TYPES.join(", ")
        )))
    }
}

/// Validate that a log level string is one of the known levels.
pub fn validate_log_level(level: &str) -> Result<(), CoreError> {
    if VALID_LOG_LEVELS.contains(&level) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Unknown log level: '{level}'. Valid levels: {}",
            VALID_LOG_LEVELS.join(", ")
        )))
    }
}

/// A backup that claims to include media must name its media archive.
pub fn validate_media_fields(includes_media: bool, media_file_path: &str) -> Result<(), CoreError> {
    if includes_media && media_file_path.trim().is_empty() {
        return Err(CoreError::Validation(
            "includes_media requires a non-empty media_file_path".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// Timestamp format embedded in artifact names.
pub const ARTIFACT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// File name of the primary dump, e.g. `backup_42_20261018_020000.dump`.
pub fn dump_file_name(backup_id: DbId, at: Timestamp) -> String {
    format!("backup_{backup_id}_{}.dump", at.format(ARTIFACT_TIMESTAMP_FORMAT))
}

/// File name of the media archive, sharing the dump's id and timestamp.
pub fn media_archive_name(backup_id: DbId, at: Timestamp) -> String {
    format!(
        "media_{backup_id}_{}.tar.gz",
        at.format(ARTIFACT_TIMESTAMP_FORMAT)
    )
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn backup_types_validate() {
        for t in VALID_BACKUP_TYPES {
            assert!(validate_backup_type(t).is_ok());
        }
        let err = validate_backup_type("incremental").unwrap_err();
        assert!(err.to_string().contains("incremental"));
    }

    #[test]
    fn log_levels_validate() {
        assert!(validate_log_level("warning").is_ok());
        assert!(validate_log_level("warn").is_err());
    }

    #[test]
    fn media_flag_requires_path() {
        assert!(validate_media_fields(true, "").is_err());
        assert!(validate_media_fields(true, "   ").is_err());
        assert!(validate_media_fields(true, "/backups/media_1.tar.gz").is_ok());
        assert!(validate_media_fields(false, "").is_ok());
    }

    #[test]
    fn artifact_names_share_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 2, 0, 5).unwrap();
        assert_eq!(dump_file_name(42, at), "backup_42_20261018_020005.dump");
        assert_eq!(media_archive_name(42, at), "media_42_20261018_020005.tar.gz");
    }
}
