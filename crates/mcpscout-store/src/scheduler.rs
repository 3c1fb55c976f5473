//! One-shot continuation scheduling

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use mcpscout_utils::atomic_write::write_file_atomic;
use mcpscout_utils::error::StoreError;

/// Handle to a scheduled continuation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationHandle(pub String);

impl fmt::Display for ContinuationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingContinuation {
    pub handle: ContinuationHandle,
    pub due_at: DateTime<Utc>,
}

/// Arranges for the orchestrator to be invoked again later
pub trait Scheduler: Send + Sync {
    fn schedule_once(&self, delay: Duration) -> Result<ContinuationHandle, StoreError>;

    /// Cancel a continuation. Cancelling an unknown handle succeeds.
    fn cancel(&self, handle: &ContinuationHandle) -> Result<(), StoreError>;

    fn list_pending(&self) -> Result<Vec<PendingContinuation>, StoreError>;
}

/// Scheduler that records continuations as files.
///
/// An external timer (cron, a CI schedule) runs `mcpscout run --if-due`,
/// which consults [`FileScheduler::is_due`] before doing any work.
#[derive(Debug, Clone)]
pub struct FileScheduler {
    dir: Utf8PathBuf,
}

impl FileScheduler {
    #[must_use]
    pub fn new(state_dir: &Utf8Path) -> Self {
        Self {
            dir: state_dir.join("continuations"),
        }
    }

    fn path_for(&self, handle: &ContinuationHandle) -> Utf8PathBuf {
        self.dir.join(format!("{handle}.json"))
    }

    /// Whether any pending continuation is due at `now`
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Scheduler::list_pending`].
    pub fn is_due(&self, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.list_pending()?.iter().any(|p| p.due_at <= now))
    }
}

impl Scheduler for FileScheduler {
    fn schedule_once(&self, delay: Duration) -> Result<ContinuationHandle, StoreError> {
        let now = Utc::now();
        let due_at = now
            + chrono::Duration::from_std(delay)
                .map_err(|e| StoreError::InvalidResponse(format!("invalid delay: {e}")))?;
        let handle = ContinuationHandle(format!(
            "cont-{}-{}",
            now.timestamp_nanos_opt().unwrap_or_default(),
            std::process::id()
        ));

        let pending = PendingContinuation {
            handle: handle.clone(),
            due_at,
        };
        let path = self.path_for(&handle);
        let json = serde_json::to_string_pretty(&pending)
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        write_file_atomic(&path, &json).map_err(|e| StoreError::io(&path, format!("{e:#}")))?;

        debug!(continuation = %handle, due_at = %due_at, "Scheduled continuation");
        Ok(handle)
    }

    fn cancel(&self, handle: &ContinuationHandle) -> Result<(), StoreError> {
        let path = self.path_for(handle);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn list_pending(&self) -> Result<Vec<PendingContinuation>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut pending = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| StoreError::io(path.display(), e))?;
            let item: PendingContinuation = serde_json::from_str(&raw).map_err(|e| {
                StoreError::InvalidResponse(format!("{}: {e}", path.display()))
            })?;
            pending.push(item);
        }
        pending.sort_by(|a, b| a.due_at.cmp(&b.due_at).then_with(|| a.handle.cmp(&b.handle)));
        Ok(pending)
    }
}
