//! Domain logic for the sanvault backup/restore subsystem.
//!
//! Everything in this crate is free of database and process dependencies:
//! status state machines, checksum verification, retention selection,
//! schema reconciliation, restore-output classification, and schedule
//! evaluation. The `db` and `orchestrator` crates build on top of it.

pub mod artifact;
pub mod checksum;
pub mod error;
pub mod provenance;
pub mod restore_output;
pub mod retention;
pub mod schedule;
pub mod schema;
pub mod status;
pub mod types;
