//! Run command implementation
//!
//! Handles `mcpscout run [--if-due] [--force-unlock]`.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use mcpscout_config::Config;
use mcpscout_engine::{CheckpointState, Orchestrator, RunOutcome, RunReport, TimeBudget};
use mcpscout_lock::InvocationLock;
use mcpscout_store::FileScheduler;
use mcpscout_utils::error::ScoutError;
use mcpscout_utils::types::PhaseKind;

use super::common;

/// Execute one invocation under the invocation lock
pub async fn execute_run_command(config: &Config, if_due: bool, force_unlock: bool) -> Result<()> {
    // Configuration-missing is fatal before any state is touched
    config.require_runnable().map_err(ScoutError::from)?;
    let rules = common::read_rules(config)?;
    let collaborators = common::build_collaborators(config)?;

    let state_dir = config.state_dir();
    let lock = InvocationLock::acquire(&state_dir, force_unlock, Some(config.budget.lock_ttl_secs))
        .map_err(ScoutError::from)?;

    if if_due && !continuation_due(config, &common::checkpoint_state(config))? {
        println!("No continuation is due; nothing to do");
        release(lock);
        return Ok(());
    }

    let budget = TimeBudget::from_config(&config.budget);
    let orchestrator = Orchestrator::new(config.clone(), collaborators).with_rules(rules);
    let result = orchestrator.run(&budget).await;
    release(lock);

    let report = result?;
    print_summary(&report);
    info!(
        outcome = ?report.outcome,
        researched = report.researched,
        remaining_secs = budget.remaining().as_secs(),
        "Invocation finished"
    );

    if !report.failed_files.is_empty() {
        return Err(ScoutError::PublishFailed {
            file: report.failed_files.join(", "),
            reason: "the commit failed and is retried by the next invocation".to_string(),
        }
        .into());
    }
    Ok(())
}

/// Idle state, or a session without any recorded continuation, always runs.
fn continuation_due(config: &Config, state: &CheckpointState) -> Result<bool, ScoutError> {
    let status = state.inspect()?;
    if status.phase == PhaseKind::Idle || status.pending_continuations.is_empty() {
        return Ok(true);
    }
    Ok(FileScheduler::new(&config.state_dir()).is_due(Utc::now())?)
}

fn release(lock: InvocationLock) {
    if let Err(e) = lock.release() {
        warn!(error = %e, "Failed to release invocation lock");
    }
}

fn print_summary(report: &RunReport) {
    match &report.outcome {
        RunOutcome::Completed => println!("✓ Session completed"),
        RunOutcome::Suspended {
            phase,
            continuation,
        } => println!("⏸ Suspended while {phase}; continuation {continuation} scheduled"),
    }
    println!("  Started in: {}", report.started_in);
    println!("  Researched this invocation: {}", report.researched);
    println!(
        "  Published: {} entries, {} unresolved reports",
        report.published_entries, report.published_reports
    );
    if report.learned_categories > 0 {
        println!("  Learned categories: {}", report.learned_categories);
    }
    for file in &report.failed_files {
        println!("  ✗ Commit failed: {file}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use mcpscout_engine::{Collaborators, StopAfter};
    use mcpscout_research::ScriptedBackend;
    use mcpscout_store::{
        FsCheckpointStore, MemoryObjectStore, MemoryVersionedStore, Scheduler,
    };
    use mcpscout_utils::test_support::mcp_config_json;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_if_due_waits_for_scheduled_continuation() {
        let temp = TempDir::new().unwrap();
        let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let config = Config::minimal_for_testing(&base);
        let state_dir = config.state_dir();
        let state = common::checkpoint_state(&config);

        assert!(continuation_due(&config, &state).unwrap());

        let objects = Arc::new(MemoryObjectStore::new());
        objects.add_leaf(
            "sources",
            "a.json",
            mcp_config_json(&[("a-mcp", "https://a.example")]),
            Utc::now(),
        );
        let scheduler = Arc::new(FileScheduler::new(&state_dir));
        let orchestrator = Orchestrator::new(
            config.clone(),
            Collaborators {
                objects,
                files: Arc::new(MemoryVersionedStore::new()),
                checkpoints: Arc::new(FsCheckpointStore::new(state_dir.clone())),
                scheduler: scheduler.clone(),
                research: Arc::new(ScriptedBackend::new()),
            },
        );
        // suspends before the first container with a continuation a minute out
        assert!(orchestrator.run(&StopAfter::new(0)).await.unwrap().is_suspended());
        assert!(!continuation_due(&config, &state).unwrap());

        for pending in scheduler.list_pending().unwrap() {
            scheduler.cancel(&pending.handle).unwrap();
        }
        assert!(continuation_due(&config, &state).unwrap());
    }
}
