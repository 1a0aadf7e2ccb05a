//! Explicit per-operation context: who asked, where progress goes, and how
//! to stop.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_finished(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Cancelled)
    }
}

/// Pollable snapshot of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobProgress {
    pub state: JobState,
    pub current: u32,
    pub total: u32,
    pub message: String,
    /// Serialized record on success.
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self {
            state: JobState::Queued,
            current: 0,
            total: 0,
            message: String::new(),
            result: None,
            error: None,
        }
    }
}

/// Where an orchestrator reports stage progress. The default sink drops
/// everything.
#[derive(Clone, Default)]
pub struct ProgressSink {
    tx: Option<Arc<watch::Sender<JobProgress>>>,
}

impl ProgressSink {
    pub fn channel() -> (Self, watch::Receiver<JobProgress>) {
        let (tx, rx) = watch::channel(JobProgress::default());
        (Self { tx: Some(Arc::new(tx)) }, rx)
    }

    pub fn report(&self, current: u32, total: u32, message: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let message = message.into();
            tx.send_modify(|p| {
                p.current = current;
                p.total = total;
                p.message = message;
            });
        }
    }

    /// Apply an arbitrary update to the job snapshot.
    pub fn update(&self, f: impl FnOnce(&mut JobProgress)) {
        if let Some(tx) = &self.tx {
            tx.send_modify(f);
        }
    }
}

/// Context threaded through every orchestrator call.
#[derive(Clone, Default)]
pub struct OperationContext {
    /// Who triggered the operation; `None` for the scheduler.
    pub actor: Option<String>,
    pub progress: ProgressSink,
    pub cancel: CancellationToken,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn actor_label(&self) -> &str {
        self.actor.as_deref().unwrap_or("system")
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_reports_into_channel() {
        let (sink, rx) = ProgressSink::channel();
        sink.report(2, 5, "Dumping database");
        let snap = rx.borrow().clone();
        assert_eq!((snap.current, snap.total), (2, 5));
        assert_eq!(snap.message, "Dumping database");
        assert_eq!(snap.state, JobState::Queued);

        // The default sink is inert.
        ProgressSink::default().report(1, 1, "ignored");
    }
}
