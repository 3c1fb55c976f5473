//! Read-only view of the checkpoint state for `mcpscout status`

use serde::Serialize;
use std::fmt;

use mcpscout_store::{PendingContinuation, StoreError};
use mcpscout_utils::error::ScoutError;
use mcpscout_utils::types::PhaseKind;

use super::Orchestrator;
use super::phase::{Phase, markers};
use super::state::CheckpointState;
use crate::envelope::decode;
use crate::queue::RetryList;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub phase: PhaseKind,
    /// Containers still to visit, while scanning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_containers: Option<usize>,
    /// Items found so far, while scanning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found_items: Option<usize>,
    pub queue_length: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub retry_eligible: usize,
    pub pending_continuations: Vec<PendingContinuation>,
    /// Why the stored state would be discarded by the next run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrupt: Option<String>,
}

impl StatusReport {
    fn empty(phase: PhaseKind) -> Self {
        Self {
            phase,
            pending_containers: None,
            found_items: None,
            queue_length: 0,
            resolved: 0,
            unresolved: 0,
            retry_eligible: 0,
            pending_continuations: Vec::new(),
            corrupt: None,
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Phase: {}", self.phase)?;
        if let Some(reason) = &self.corrupt {
            writeln!(f, "  Checkpoint state is corrupt: {reason}")?;
            writeln!(f, "  The next run discards it and starts a fresh scan")?;
        }
        if let (Some(containers), Some(found)) = (self.pending_containers, self.found_items) {
            writeln!(f, "  Containers pending: {containers}")?;
            writeln!(f, "  Items found: {found}")?;
        }
        writeln!(f, "  Queue length: {}", self.queue_length)?;
        writeln!(
            f,
            "  Accumulated: {} resolved, {} unresolved",
            self.resolved, self.unresolved
        )?;
        writeln!(f, "  Retry-eligible: {}", self.retry_eligible)?;
        match self.pending_continuations.as_slice() {
            [] => write!(f, "  Continuation: none"),
            pending => {
                write!(f, "  Continuation:")?;
                for p in pending {
                    write!(f, "\n    {} due {}", p.handle, p.due_at.to_rfc3339())?;
                }
                Ok(())
            }
        }
    }
}

impl Orchestrator {
    /// See [`CheckpointState::inspect`]
    ///
    /// # Errors
    ///
    /// Propagates store and scheduler read failures.
    pub fn inspect(&self) -> Result<StatusReport, ScoutError> {
        self.checkpoint_state().inspect()
    }
}

impl CheckpointState {
    /// Describe the persisted state without changing it
    ///
    /// # Errors
    ///
    /// Propagates store and scheduler read failures. Corrupt state is
    /// reported in [`StatusReport::corrupt`], not as an error.
    pub fn inspect(&self) -> Result<StatusReport, ScoutError> {
        let mut report = match Phase::load(self.checkpoints.as_ref()) {
            Ok(phase) => Self::describe(&phase),
            Err(ScoutError::State(e)) => StatusReport {
                corrupt: Some(e.to_string()),
                ..StatusReport::empty(PhaseKind::Idle)
            },
            Err(e) => return Err(e),
        };

        match self.checkpoints.get_flag(markers::RETRY) {
            Ok(Some(raw)) => match decode::<RetryList>(markers::RETRY, raw.as_bytes()) {
                Ok(retry) => report.retry_eligible = retry.len(),
                Err(e) => report.corrupt = Some(e.to_string()),
            },
            Ok(None) => {}
            // already reported by the phase load
            Err(StoreError::Corrupt { .. }) if report.corrupt.is_some() => {}
            Err(e) => return Err(e.into()),
        }
        report.pending_continuations = self.scheduler.list_pending()?;
        Ok(report)
    }

    fn describe(phase: &Phase) -> StatusReport {
        let mut report = StatusReport::empty(phase.kind());
        match phase {
            Phase::Idle => {}
            Phase::Scanning { state, .. } => {
                report.pending_containers = Some(state.queue.len());
                report.found_items = Some(state.found_items.len());
            }
            Phase::Researching { queue, results, .. } => {
                report.queue_length = queue.len();
                report.resolved = results.resolved.len();
                report.unresolved = results.unresolved.len();
            }
            Phase::Committing { results } => {
                report.resolved = results.resolved.len();
                report.unresolved = results.unresolved.len();
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{StopAfter, Unlimited};
    use crate::controller::Collaborators;
    use camino::Utf8Path;
    use chrono::Utc;
    use mcpscout_config::Config;
    use mcpscout_research::ScriptedBackend;
    use mcpscout_store::{
        CheckpointStore, MemoryCheckpointStore, MemoryObjectStore, MemoryScheduler,
        MemoryVersionedStore,
    };
    use mcpscout_utils::test_support::mcp_config_json;
    use std::sync::Arc;

    fn orchestrator(checkpoints: Arc<MemoryCheckpointStore>) -> Orchestrator {
        let objects = Arc::new(MemoryObjectStore::new());
        objects.add_leaf(
            "sources",
            "s.json",
            mcp_config_json(&[("a-mcp", "https://a.example"), ("b-mcp", "https://b.example")]),
            Utc::now(),
        );
        Orchestrator::new(
            Config::minimal_for_testing(Utf8Path::new("/work")),
            Collaborators {
                objects,
                files: Arc::new(MemoryVersionedStore::new()),
                checkpoints,
                scheduler: Arc::new(MemoryScheduler::new()),
                research: Arc::new(ScriptedBackend::new()),
            },
        )
    }

    #[tokio::test]
    async fn test_status_reflects_research_progress() {
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let orchestrator = orchestrator(checkpoints.clone());
        assert_eq!(orchestrator.inspect().unwrap().phase, PhaseKind::Idle);

        // container + leaf + first item pass, second item stops
        orchestrator.run(&StopAfter::new(3)).await.unwrap();
        let status = orchestrator.inspect().unwrap();

        assert_eq!(status.phase, PhaseKind::Researching);
        assert_eq!(status.queue_length, 1);
        assert_eq!(status.resolved, 1);
        assert_eq!(status.pending_continuations.len(), 1);
        assert!(status.to_string().contains("Queue length: 1"));

        orchestrator.run(&Unlimited).await.unwrap();
        assert_eq!(orchestrator.inspect().unwrap().phase, PhaseKind::Idle);
    }

    #[test]
    fn test_status_reports_corruption_without_mutating() {
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        checkpoints.set_flag(markers::QUEUE, "[").unwrap();
        let orchestrator = orchestrator(checkpoints.clone());

        let status = orchestrator.inspect().unwrap();

        assert!(status.corrupt.is_some());
        assert_eq!(checkpoints.get_flag(markers::QUEUE).unwrap().as_deref(), Some("["));
    }
}
