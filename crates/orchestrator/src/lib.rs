//! Backup and restore orchestration.
//!
//! The orchestrators in [`backup`] and [`restore`] drive external dump and
//! restore tools, verify artifacts, reconcile schema snapshots and keep the
//! bookkeeping tables current. Persistence, process execution and database
//! introspection sit behind the [`store::BackupStore`],
//! [`process::CommandRunner`] and [`inspector::DatabaseInspector`] traits so
//! the whole flow can run against in-memory fakes.

pub mod backup;
pub mod cleanup;
pub mod context;
pub mod inspector;
pub mod jobs;
pub mod lock;
pub mod logger;
pub mod media;
pub mod memory;
pub mod process;
pub mod restore;
pub mod scheduler;
pub mod services;
pub mod settings;
pub mod store;
pub mod tools;
