//! Shared handles passed to every orchestrator.

use std::sync::Arc;

use crate::inspector::DatabaseInspector;
use crate::lock::MaintenanceLock;
use crate::process::CommandRunner;
use crate::settings::OrchestratorSettings;
use crate::store::BackupStore;

/// The collaborators an orchestrator works through. Cheap to clone.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn BackupStore>,
    pub runner: Arc<dyn CommandRunner>,
    pub inspector: Arc<dyn DatabaseInspector>,
    pub settings: Arc<OrchestratorSettings>,
    pub lock: MaintenanceLock,
}

impl Services {
    pub fn new(
        store: Arc<dyn BackupStore>,
        runner: Arc<dyn CommandRunner>,
        inspector: Arc<dyn DatabaseInspector>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            runner,
            inspector,
            settings: Arc::new(settings),
            lock: MaintenanceLock::new(),
        }
    }
}
