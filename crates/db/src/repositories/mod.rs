//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods
//! that accept `&PgPool` as the first argument.

pub mod backup_configuration_repo;
pub mod backup_record_repo;
pub mod operation_log_repo;
pub mod restore_record_repo;

pub use backup_configuration_repo::BackupConfigurationRepo;
pub use backup_record_repo::BackupRecordRepo;
pub use operation_log_repo::OperationLogRepo;
pub use restore_record_repo::RestoreRecordRepo;
