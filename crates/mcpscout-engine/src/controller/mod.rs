//! Phase controller: runs scan, research and commit until done or out of time
//!
//! One call to [`Orchestrator::run`] is one invocation. It reconstructs the
//! [`Phase`] from checkpoint markers, advances it as far as the budget guard
//! allows and either completes (all markers cleared) or suspends (state
//! persisted, exactly one continuation scheduled).

mod phase;
mod state;
mod status;

pub use phase::{Phase, markers};
pub use state::CheckpointState;
pub use status::StatusReport;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use mcpscout_config::Config;
use mcpscout_research::ResearchBackend;
use mcpscout_store::{
    BlobHandle, CheckpointStore, ContinuationHandle, ObjectStore, Scheduler, StoreError,
    VersionedFileStore,
};
use mcpscout_utils::error::{ResearchError, ScoutError};
use mcpscout_utils::redaction::redact_secrets;
use mcpscout_utils::types::{CategoryInfo, ItemKey, PhaseKind};

use crate::budget::BudgetGuard;
use crate::category::{CategoryResolver, CategoryTable};
use crate::envelope::{decode, encode};
use crate::invoker::{ItemOutcome, ResearchInvoker};
use crate::publisher::Publisher;
use crate::queue::{ResolvedEntry, ResultAccumulator, RetryList, SessionData, build_session};
use crate::scan::{ScanFilter, ScanOutcome, ScanState, TreeScanner};
use crate::sources::load_primary_sources;

/// Failed commits of one bucket tolerated before the bucket is dropped
pub const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// The external collaborators an orchestrator drives
#[derive(Clone)]
pub struct Collaborators {
    pub objects: Arc<dyn ObjectStore>,
    pub files: Arc<dyn VersionedFileStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub scheduler: Arc<dyn Scheduler>,
    pub research: Arc<dyn ResearchBackend>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every phase finished and all markers are cleared
    Completed,
    /// State is persisted and a continuation is scheduled
    Suspended {
        phase: PhaseKind,
        continuation: ContinuationHandle,
    },
}

/// Summary of one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub started_in: PhaseKind,
    pub outcome: RunOutcome,
    /// Items popped from the queue this invocation
    pub researched: usize,
    pub learned_categories: usize,
    pub published_entries: usize,
    pub published_reports: usize,
    /// Files whose commit failed this invocation
    pub failed_files: Vec<String>,
}

impl RunReport {
    fn new(started_in: PhaseKind) -> Self {
        Self {
            started_in,
            outcome: RunOutcome::Completed,
            researched: 0,
            learned_categories: 0,
            published_entries: 0,
            published_reports: 0,
            failed_files: Vec::new(),
        }
    }

    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        matches!(self.outcome, RunOutcome::Suspended { .. })
    }
}

enum Step {
    Next(Phase),
    Suspend(PhaseKind),
    Done,
}

pub struct Orchestrator {
    config: Config,
    objects: Arc<dyn ObjectStore>,
    files: Arc<dyn VersionedFileStore>,
    state: CheckpointState,
    research: Arc<dyn ResearchBackend>,
    rules_text: String,
    report_date: Option<NaiveDate>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        Self {
            config,
            objects: collaborators.objects,
            files: collaborators.files,
            state: CheckpointState::new(collaborators.checkpoints, collaborators.scheduler),
            research: collaborators.research,
            rules_text: String::new(),
            report_date: None,
        }
    }

    /// Rules text handed to every research call
    #[must_use]
    pub fn with_rules(mut self, rules_text: impl Into<String>) -> Self {
        self.rules_text = rules_text.into();
        self
    }

    /// Fix the date of report sections instead of using today's date
    #[must_use]
    pub const fn with_report_date(mut self, date: NaiveDate) -> Self {
        self.report_date = Some(date);
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one invocation.
    ///
    /// # Errors
    ///
    /// Store and configuration failures that leave no consistent state to
    /// persist. Corrupt checkpoints are not errors: they are discarded and a
    /// fresh scan starts.
    pub async fn run(&self, guard: &dyn BudgetGuard) -> Result<RunReport, ScoutError> {
        let mut phase = self.load_phase()?;
        let mut report = RunReport::new(phase.kind());
        info!(phase = %phase.kind(), "Starting invocation");

        loop {
            let step = match phase {
                Phase::Idle => Step::Next(self.start_scan().await?),
                Phase::Scanning { handle, state } => self.scan(handle, state, guard).await?,
                Phase::Researching {
                    session_handle,
                    session,
                    queue,
                    results,
                } => {
                    self.research_items(
                        session_handle,
                        &session,
                        queue,
                        results,
                        guard,
                        &mut report,
                    )
                    .await?
                }
                Phase::Committing { results } => self.commit(results, &mut report).await?,
            };

            match step {
                Step::Next(next) => {
                    debug!(from = %report.started_in, to = %next.kind(), "Phase transition");
                    phase = next;
                }
                Step::Suspend(kind) => {
                    let continuation = self.suspend(kind)?;
                    report.outcome = RunOutcome::Suspended {
                        phase: kind,
                        continuation,
                    };
                    return Ok(report);
                }
                Step::Done => {
                    self.complete()?;
                    info!(
                        entries = report.published_entries,
                        reports = report.published_reports,
                        "Session complete"
                    );
                    return Ok(report);
                }
            }
        }
    }

    /// See [`CheckpointState::reset`]
    ///
    /// # Errors
    ///
    /// Propagates store and scheduler failures.
    pub fn reset(&self) -> Result<(), ScoutError> {
        self.state.reset()
    }

    /// The checkpoint markers and continuations this orchestrator works on
    #[must_use]
    pub const fn checkpoint_state(&self) -> &CheckpointState {
        &self.state
    }

    fn publisher(&self) -> Publisher<'_> {
        Publisher::new(
            self.files.as_ref(),
            &self.config.files,
            self.config.format.indent_width,
        )
    }

    fn load_phase(&self) -> Result<Phase, ScoutError> {
        match Phase::load(self.state.checkpoints.as_ref()) {
            Err(ScoutError::State(e)) => {
                error!(error = %e, "Discarding corrupt checkpoint state; a fresh scan begins");
                self.state.clear_session_markers()?;
                Ok(Phase::Idle)
            }
            other => other,
        }
    }

    fn load_retry(&self) -> Result<RetryList, ScoutError> {
        let Some(raw) = self.state.checkpoints.get_flag(markers::RETRY)? else {
            return Ok(RetryList::default());
        };
        match decode(markers::RETRY, raw.as_bytes()) {
            Ok(retry) => Ok(retry),
            Err(e) => {
                error!(error = %e, "Discarding corrupt retry-eligible list");
                self.state.checkpoints.delete_flag(markers::RETRY)?;
                Ok(RetryList::default())
            }
        }
    }

    async fn start_scan(&self) -> Result<Phase, ScoutError> {
        let sources = &self.config.sources;
        let seed =
            load_primary_sources(self.objects.as_ref(), &sources.primary, &sources.shape_key).await;
        info!(
            primary_items = seed.len(),
            roots = sources.scan_roots.len(),
            "Starting scan"
        );

        Ok(Phase::Scanning {
            handle: None,
            state: ScanState::start(&sources.scan_roots, seed),
        })
    }

    async fn scan(
        &self,
        handle: Option<BlobHandle>,
        mut state: ScanState,
        guard: &dyn BudgetGuard,
    ) -> Result<Step, ScoutError> {
        let filter = ScanFilter {
            cutoff: self.config.sources.cutoff_instant()?,
            extension: self.config.sources.extension.clone(),
            shape_key: self.config.sources.shape_key.clone(),
        };

        match TreeScanner::new(self.objects.as_ref(), &filter)
            .run(&mut state, guard)
            .await
        {
            ScanOutcome::Suspended => {
                self.persist_scan(handle, &state)?;
                Ok(Step::Suspend(PhaseKind::Scanning))
            }
            ScanOutcome::Completed => self.finish_scan(handle, state).await.map(Step::Next),
        }
    }

    fn persist_scan(&self, old: Option<BlobHandle>, state: &ScanState) -> Result<(), ScoutError> {
        let payload = encode(markers::SCAN_STATE, state)?;
        let handle = self
            .state
            .checkpoints
            .create_blob(markers::SCAN_STATE, payload.as_bytes())?;
        self.state
            .checkpoints
            .set_flag(markers::SCAN_STATE, &encode(markers::SCAN_STATE, &handle)?)?;

        if let Some(old) = old {
            self.state.delete_blob_quietly(&old);
        }
        debug!(
            blob = %handle,
            pending = state.queue.len(),
            found = state.found_items.len(),
            "Persisted scan state"
        );
        Ok(())
    }

    /// Freeze the session and build the queue.
    ///
    /// If the published entries cannot be read the completed scan is
    /// persisted first so the next invocation does not scan again.
    async fn finish_scan(
        &self,
        handle: Option<BlobHandle>,
        state: ScanState,
    ) -> Result<Phase, ScoutError> {
        let published = match self.publisher().published_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                self.persist_scan(handle, &state)?;
                return Err(e.into());
            }
        };
        let retry = self.load_retry()?;
        let discovered = state.found_items.len();
        let (session, queue) = build_session(state.found_items, &published, &retry);
        info!(
            discovered,
            published = published.len(),
            retry_eligible = retry.len(),
            queued = queue.len(),
            "Scan complete; session built"
        );

        let results = ResultAccumulator::default();
        let mut set = BTreeMap::from([
            (markers::QUEUE.to_string(), encode(markers::QUEUE, &queue)?),
            (markers::RESULTS.to_string(), encode(markers::RESULTS, &results)?),
        ]);

        let next = if queue.is_empty() {
            self.state
                .checkpoints
                .update_flags(&set, &[markers::SCAN_STATE, markers::SESSION])?;
            Phase::Committing { results }
        } else {
            let session_handle = self.state.checkpoints.create_blob(
                markers::SESSION,
                encode(markers::SESSION, &session)?.as_bytes(),
            )?;
            set.insert(
                markers::SESSION.to_string(),
                encode(markers::SESSION, &session_handle)?,
            );
            self.state.checkpoints.update_flags(&set, &[markers::SCAN_STATE])?;
            Phase::Researching {
                session_handle,
                session,
                queue,
                results,
            }
        };

        if let Some(old) = handle {
            self.state.delete_blob_quietly(&old);
        }
        Ok(next)
    }

    async fn research_items(
        &self,
        session_handle: BlobHandle,
        session: &SessionData,
        mut queue: VecDeque<ItemKey>,
        mut results: ResultAccumulator,
        guard: &dyn BudgetGuard,
        report: &mut RunReport,
    ) -> Result<Step, ScoutError> {
        let publisher = self.publisher();
        let mut resolver =
            CategoryResolver::new(Self::categories_or_empty(&publisher).await, &self.config.format);
        let mut retry = self.load_retry()?;
        let invoker = ResearchInvoker::new(
            self.research.as_ref(),
            &self.rules_text,
            Duration::from_secs(self.config.research.timeout_secs),
        );
        let item_delay = Duration::from_millis(self.config.budget.item_delay_ms);

        while !queue.is_empty() {
            if guard.should_stop() {
                info!(remaining = queue.len(), "Research suspended");
                return Ok(Step::Suspend(PhaseKind::Researching));
            }
            let Some(key) = queue.pop_front() else {
                break;
            };

            match session.items.get(&key) {
                Some(descriptor) => {
                    let prefix = resolver.prefix_of(&key);
                    let outcome = invoker
                        .research(
                            &key,
                            descriptor,
                            resolver.resolve(&key),
                            resolver.table().categories(),
                            guard.time_left(),
                        )
                        .await;

                    match outcome {
                        ItemOutcome::Resolved { entry, learned } => {
                            if let Some(info) = learned {
                                self.learn_category(&publisher, &mut resolver, &prefix, info)
                                    .await;
                                report.learned_categories += 1;
                            }
                            info!(item = %key, category = %entry.category, "Item resolved");
                            retry.clear(&key);
                            results.resolved.push(entry);
                        }
                        ItemOutcome::Unresolved(text) => {
                            info!(item = %key, "Item unresolved");
                            retry.clear(&key);
                            results.unresolved.push(text);
                        }
                        ItemOutcome::Failed(ResearchError::BudgetExceeded { limit, .. }) => {
                            info!(item = %key, limit, "Research call budget used up");
                            queue.push_front(key);
                            return Ok(Step::Suspend(PhaseKind::Researching));
                        }
                        ItemOutcome::OutOfTime => {
                            info!(item = %key, "Time budget ran out during research call");
                            queue.push_front(key);
                            return Ok(Step::Suspend(PhaseKind::Researching));
                        }
                        ItemOutcome::Failed(e) => {
                            let reason = redact_secrets(&e.to_string());
                            let attempts = retry.record_failure(&key, descriptor, &reason);
                            warn!(item = %key, attempts, error = %reason, "Research call failed");
                            if attempts >= self.config.research.max_retry_attempts {
                                retry.clear(&key);
                                results.unresolved.push(format!(
                                    "### {key}\n\nResearch failed after {attempts} attempts: {reason}\n"
                                ));
                            }
                        }
                    }
                }
                None => warn!(item = %key, "Queued item missing from session; skipping"),
            }

            self.persist_progress(&queue, &results, &retry)?;
            report.researched += 1;

            if !queue.is_empty() && !item_delay.is_zero() {
                tokio::time::sleep(item_delay).await;
            }
        }

        self.state.checkpoints.delete_flag(markers::SESSION)?;
        self.state.delete_blob_quietly(&session_handle);
        info!(
            resolved = results.resolved.len(),
            unresolved = results.unresolved.len(),
            "Research complete"
        );
        Ok(Step::Next(Phase::Committing { results }))
    }

    /// Queue, results and retry list are written as one flag update
    fn persist_progress(
        &self,
        queue: &VecDeque<ItemKey>,
        results: &ResultAccumulator,
        retry: &RetryList,
    ) -> Result<(), ScoutError> {
        let mut set = BTreeMap::from([
            (markers::QUEUE.to_string(), encode(markers::QUEUE, queue)?),
            (markers::RESULTS.to_string(), encode(markers::RESULTS, results)?),
        ]);
        let remove: &[&str] = if retry.is_empty() {
            &[markers::RETRY]
        } else {
            set.insert(markers::RETRY.to_string(), encode(markers::RETRY, retry)?);
            &[]
        };
        self.state.checkpoints.update_flags(&set, remove)?;
        Ok(())
    }

    async fn learn_category(
        &self,
        publisher: &Publisher<'_>,
        resolver: &mut CategoryResolver,
        prefix: &str,
        info: CategoryInfo,
    ) {
        match publisher.publish_category(prefix, info.clone()).await {
            Ok(table) => resolver.replace_table(table),
            Err(e) => {
                warn!(prefix, error = %e, "Could not publish learned category; kept for this run");
                resolver.learn(prefix, info);
            }
        }
    }

    async fn commit(
        &self,
        mut results: ResultAccumulator,
        report: &mut RunReport,
    ) -> Result<Step, ScoutError> {
        let publisher = self.publisher();

        if !results.resolved.is_empty() {
            match Self::commit_entries(&publisher, &results.resolved).await {
                Ok(count) => {
                    report.published_entries = count;
                    results.resolved.clear();
                    results.entry_commit_failures = 0;
                }
                Err(e) => {
                    report.failed_files.push(self.config.files.entries.clone());
                    results.entry_commit_failures += 1;
                    let failures = results.entry_commit_failures;
                    if Self::give_up(&self.config.files.entries, failures, &e) {
                        results.resolved.clear();
                        results.entry_commit_failures = 0;
                    }
                }
            }
        }

        if !results.unresolved.is_empty() {
            let date = self.report_date.unwrap_or_else(|| Utc::now().date_naive());
            match publisher.publish_reports(&results.unresolved, date).await {
                Ok(count) => {
                    report.published_reports = count;
                    results.unresolved.clear();
                    results.report_commit_failures = 0;
                }
                Err(e) => {
                    report.failed_files.push(self.config.files.reports.clone());
                    results.report_commit_failures += 1;
                    let failures = results.report_commit_failures;
                    if Self::give_up(&self.config.files.reports, failures, &e) {
                        results.unresolved.clear();
                        results.report_commit_failures = 0;
                    }
                }
            }
        }

        if results.is_empty() {
            return Ok(Step::Done);
        }

        let set = BTreeMap::from([
            (markers::QUEUE.to_string(), encode(markers::QUEUE, &Vec::<ItemKey>::new())?),
            (markers::RESULTS.to_string(), encode(markers::RESULTS, &results)?),
        ]);
        self.state.checkpoints.update_flags(&set, &[])?;
        Ok(Step::Suspend(PhaseKind::Committing))
    }

    async fn commit_entries(
        publisher: &Publisher<'_>,
        entries: &[ResolvedEntry],
    ) -> Result<usize, StoreError> {
        let table = Self::categories_or_empty(publisher).await;
        publisher.publish_entries(entries, &table).await
    }

    /// The published category table, or an empty one if it cannot be read.
    ///
    /// Without the table every prefix counts as unseen and new blocks are
    /// described by their category key.
    async fn categories_or_empty(publisher: &Publisher<'_>) -> CategoryTable {
        match publisher.load_categories().await {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "Category table unavailable; continuing without it");
                CategoryTable::default()
            }
        }
    }

    /// Log a failed commit; true once the bucket has failed too often to keep
    fn give_up(file: &str, failures: u32, err: &StoreError) -> bool {
        if failures >= MAX_COMMIT_ATTEMPTS {
            error!(file, failures, error = %err, "Dropping results after repeated commit failures");
            true
        } else {
            warn!(file, failures, error = %err, "Commit failed; will retry next invocation");
            false
        }
    }

    /// Replace any pending continuation with exactly one new one
    fn suspend(&self, phase: PhaseKind) -> Result<ContinuationHandle, ScoutError> {
        self.state.cancel_pending()?;
        let delay = Duration::from_secs(self.config.budget.continuation_delay_secs);
        let handle = self.state.scheduler.schedule_once(delay)?;
        self.state
            .checkpoints
            .set_flag(markers::CONTINUATION, &encode(markers::CONTINUATION, &handle)?)?;
        info!(
            phase = %phase,
            continuation = %handle,
            delay_secs = delay.as_secs(),
            "Suspended; continuation scheduled"
        );
        Ok(handle)
    }

    fn complete(&self) -> Result<(), ScoutError> {
        self.state.clear_session_markers()?;
        self.state.cancel_pending()
    }
}
