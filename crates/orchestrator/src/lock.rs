//! Per-process maintenance lock.
//!
//! At most one backup or restore runs at a time within a process. A second
//! request fails immediately with [`CoreError::Conflict`] instead of
//! queueing. Holding a [`MaintenanceGuard`] is the proof an orchestrator
//! needs to run.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use sanvault_core::error::CoreError;
use sanvault_core::types::Timestamp;

/// What currently holds the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveOperation {
    pub description: String,
    pub since: Timestamp,
}

#[derive(Clone, Default)]
pub struct MaintenanceLock {
    active: Arc<Mutex<Option<ActiveOperation>>>,
}

impl MaintenanceLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<ActiveOperation>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the lock, or fail with `Conflict` naming the current holder.
    pub fn try_acquire(
        &self,
        description: impl Into<String>,
    ) -> Result<MaintenanceGuard, CoreError> {
        let mut slot = self.slot();
        if let Some(active) = slot.as_ref() {
            return Err(CoreError::Conflict(format!(
                "Another maintenance operation is in progress: {} (since {})",
                active.description, active.since
            )));
        }
        *slot = Some(ActiveOperation {
            description: description.into(),
            since: Utc::now(),
        });
        Ok(MaintenanceGuard { lock: self.clone() })
    }

    pub fn current(&self) -> Option<ActiveOperation> {
        self.slot().clone()
    }
}

/// Releases the lock on drop.
pub struct MaintenanceGuard {
    lock: MaintenanceLock,
}

impl MaintenanceGuard {
    pub fn description(&self) -> Option<String> {
        self.lock.current().map(|a| a.description)
    }
}

impl Drop for MaintenanceGuard {
    fn drop(&mut self) {
        *self.lock.slot() = None;
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn second_acquire_conflicts_until_release() {
        let lock = MaintenanceLock::new();
        let guard = lock.try_acquire("backup 1").unwrap();

        let err = lock.try_acquire("restore 2").err().unwrap();
        assert_matches!(err, CoreError::Conflict(msg) if msg.contains("backup 1"));
        assert_eq!(guard.description().as_deref(), Some("backup 1"));

        drop(guard);
        assert!(lock.current().is_none());
        assert!(lock.try_acquire("restore 2").is_ok());
    }
}
