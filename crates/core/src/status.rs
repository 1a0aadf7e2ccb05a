//! Status enums mapping to SMALLINT lookup tables, plus their state machines.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

use serde::{Deserialize, Serialize};

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Every variant, in lookup-table order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Resolve a database status ID back to the enum.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some($name::$variant), )+
                    _ => None,
                }
            }

            /// The snake_case name stored in the lookup table.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_status_enum! {
    /// Backup record lifecycle status.
    BackupStatus {
        Pending = 1 => "pending",
        InProgress = 2 => "in_progress",
        Completed = 3 => "completed",
        Failed = 4 => "failed",
        Verifying = 5 => "verifying",
        Verified = 6 => "verified",
    }
}

define_status_enum! {
    /// Restore record lifecycle status.
    RestoreStatus {
        Pending = 1 => "pending",
        Validating = 2 => "validating",
        PreBackup = 3 => "pre_backup",
        Restoring = 4 => "restoring",
        Migrating = 5 => "migrating",
        Completed = 6 => "completed",
        Failed = 7 => "failed",
        /// Reserved. No transition produces it.
        RolledBack = 8 => "rolled_back",
    }
}

impl BackupStatus {
    /// Statuses reachable from `self`.
    ///
    /// `Failed` is reachable from every non-terminal state. `Verified` may be
    /// re-verified.
    pub fn valid_transitions(self) -> &'static [BackupStatus] {
        use BackupStatus::*;
        match self {
            Pending => &[InProgress, Failed],
            InProgress => &[Completed, Failed],
            Completed => &[Verifying, Failed],
            Verifying => &[Verified, Failed],
            Verified => &[Verifying, Failed],
            Failed => &[],
        }
    }

    pub fn can_transition(self, to: BackupStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Whether a backup in this status has a usable artifact.
    pub fn is_restorable(self) -> bool {
        matches!(self, BackupStatus::Completed | BackupStatus::Verified)
    }
}

impl RestoreStatus {
    /// Statuses reachable from `self`.
    pub fn valid_transitions(self) -> &'static [RestoreStatus] {
        use RestoreStatus::*;
        match self {
            Pending => &[Validating, Failed],
            Validating => &[PreBackup, Failed],
            PreBackup => &[Restoring, Failed],
            Restoring => &[Migrating, Completed, Failed],
            Migrating => &[Completed, Failed],
            Completed | Failed | RolledBack => &[],
        }
    }

    pub fn can_transition(self, to: RestoreStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        self.valid_transitions().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
