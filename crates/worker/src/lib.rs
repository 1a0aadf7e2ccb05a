//! Process-level wiring for the backup worker: environment configuration and
//! the command-line surface.

pub mod cli;
pub mod config;
