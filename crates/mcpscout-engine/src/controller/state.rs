use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use mcpscout_store::{BlobHandle, CheckpointStore, Scheduler, StoreError};
use mcpscout_utils::error::ScoutError;

use super::phase::markers;
use crate::envelope::decode;

/// Checkpoint markers and pending continuations, without the collaborators
/// a run needs.
///
/// `status` and `reset` work through this view alone, so neither needs
/// research credentials or the object store.
#[derive(Clone)]
pub struct CheckpointState {
    pub(super) checkpoints: Arc<dyn CheckpointStore>,
    pub(super) scheduler: Arc<dyn Scheduler>,
}

impl CheckpointState {
    #[must_use]
    pub fn new(checkpoints: Arc<dyn CheckpointStore>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            checkpoints,
            scheduler,
        }
    }

    /// Discard every checkpoint marker including the retry-eligible list
    ///
    /// # Errors
    ///
    /// Propagates store and scheduler failures.
    pub fn reset(&self) -> Result<(), ScoutError> {
        self.clear_session_markers()?;
        self.checkpoints.delete_flag(markers::RETRY)?;
        self.cancel_pending()?;
        info!("Checkpoint state reset");
        Ok(())
    }

    pub(super) fn cancel_pending(&self) -> Result<(), ScoutError> {
        for pending in self.scheduler.list_pending()? {
            self.scheduler.cancel(&pending.handle)?;
            debug!(continuation = %pending.handle, "Cancelled continuation");
        }
        Ok(())
    }

    /// Remove every phase marker and the blobs they name. The retry list stays
    /// unless the flag storage itself no longer parses, in which case every
    /// flag goes.
    pub(super) fn clear_session_markers(&self) -> Result<(), ScoutError> {
        let flags = match self.checkpoints.flags() {
            Ok(flags) => flags,
            Err(StoreError::Corrupt { path, reason }) => {
                warn!(path = %path, error = %reason, "Flag storage unreadable; clearing all flags");
                self.checkpoints.clear_flags()?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        for marker in [markers::SCAN_STATE, markers::SESSION] {
            if let Some(raw) = flags.get(marker)
                && let Ok(handle) = decode::<BlobHandle>(marker, raw.as_bytes())
            {
                self.delete_blob_quietly(&handle);
            }
        }
        self.checkpoints
            .update_flags(&BTreeMap::new(), &markers::PHASE_MARKERS)?;
        Ok(())
    }

    pub(super) fn delete_blob_quietly(&self, handle: &BlobHandle) {
        if let Err(e) = self.checkpoints.delete_blob(handle) {
            warn!(blob = %handle, error = %e, "Could not delete checkpoint blob");
        }
    }
}
