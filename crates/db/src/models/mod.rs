//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` DTOs for inserts and targeted updates

pub mod backup_configuration;
pub mod backup_record;
pub mod operation_log;
pub mod restore_record;
