//! Schema reconciliation between a backup's migration snapshot and the
//! migrations applied on the running system.
//!
//! The plan lists migrations the running code has that the backup lacks;
//! those can be applied after a restore. Migrations recorded in the backup
//! that the running code does not know about cannot be applied or undone
//! here and are surfaced as warnings only.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

/// Module name -> ordered list of applied migration identifiers.
pub type SchemaSnapshot = BTreeMap<String, Vec<String>>;

/// Warning issue emitted when the backup was taken by a newer build.
pub const ISSUE_BACKUP_HAS_NEWER_MIGRATIONS: &str = "backup_has_newer_migrations";

/// Direction of a planned migration group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationDirection {
    Forward,
}

/// One module's worth of migrations to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub module: String,
    pub direction: MigrationDirection,
    pub migrations: Vec<String>,
}

impl MigrationStep {
    /// The last migration of the group, i.e. the target to migrate to.
    pub fn target(&self) -> Option<&str> {
        self.migrations.last().map(String::as_str)
    }
}

/// An advisory compatibility problem found during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityWarning {
    pub module: String,
    pub issue: String,
    pub migrations: Vec<String>,
    pub message: String,
}

/// Result of comparing a backup snapshot against the current schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub schema_compatible: bool,
    pub plan: Vec<MigrationStep>,
    pub warnings: Vec<CompatibilityWarning>,
}

/// Compare `backup` against `current`, module by module.
///
/// Modules are visited in name order. Forward migrations keep the order in
/// which `current` lists them; divergent ones keep the backup's order.
pub fn reconcile(backup: &SchemaSnapshot, current: &SchemaSnapshot) -> Reconciliation {
    let empty: Vec<String> = Vec::new();
    let modules: BTreeSet<&String> = backup.keys().chain(current.keys()).collect();

    let mut plan = Vec::new();
    let mut warnings = Vec::new();

    for module in modules {
        let in_backup = backup.get(module).unwrap_or(&empty);
        let in_current = current.get(module).unwrap_or(&empty);

        let forward = difference(in_current, in_backup);
        if !forward.is_empty() {
            plan.push(MigrationStep {
                module: module.clone(),
                direction: MigrationDirection::Forward,
                migrations: forward,
            });
        }

        let divergent = difference(in_backup, in_current);
        if !divergent.is_empty() {
            warnings.push(CompatibilityWarning {
                module: module.clone(),
                issue: ISSUE_BACKUP_HAS_NEWER_MIGRATIONS.to_string(),
                message: format!(
                    "Backup contains {} migration(s) for '{module}' unknown to this build: {}",
                    divergent.len(),
                    divergent.join(", ")
                ),
                migrations: divergent,
            });
        }
    }

    Reconciliation {
        schema_compatible: plan.is_empty() && warnings.is_empty(),
        plan,
        warnings,
    }
}

/// Items of `left` not present in `right`, in `left` order.
fn difference(left: &[String], right: &[String]) -> Vec<String> {
    let right: HashSet<&str> = right.iter().map(String::as_str).collect();
    left.iter()
        .filter(|m| !right.contains(m.as_str()))
        .cloned()
        .collect()
}
