//! Phase reconstruction from checkpoint markers
//!
//! No phase field is persisted. Which markers exist decides the phase:
//!
//! | markers present | phase |
//! |-----------------|-------|
//! | `scan_state` | Scanning |
//! | `queue` (non-empty), `session`, `results` | Researching |
//! | `queue` (empty), `results` | Committing |
//! | none of the above | Idle |

use std::collections::{BTreeMap, VecDeque};

use mcpscout_store::{BlobHandle, CheckpointStore, StoreError};
use mcpscout_utils::error::{ScoutError, StateError};
use mcpscout_utils::types::{ItemKey, PhaseKind};

use crate::envelope::decode;
use crate::queue::{ResultAccumulator, SessionData};
use crate::scan::ScanState;

/// Flag keys holding checkpoint state
pub mod markers {
    pub const SCAN_STATE: &str = "scan_state";
    pub const SESSION: &str = "session";
    pub const QUEUE: &str = "queue";
    pub const RESULTS: &str = "results";
    /// Retry-eligible items; outlives sessions
    pub const RETRY: &str = "retry";
    pub const CONTINUATION: &str = "continuation";

    /// Everything cleared when a session ends
    pub const PHASE_MARKERS: [&str; 5] = [SCAN_STATE, SESSION, QUEUE, RESULTS, CONTINUATION];
}

/// Orchestrator state, reconstructed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning {
        /// Blob of the last persisted scan state; `None` for a scan not yet persisted
        handle: Option<BlobHandle>,
        state: ScanState,
    },
    Researching {
        session_handle: BlobHandle,
        session: SessionData,
        queue: VecDeque<ItemKey>,
        results: ResultAccumulator,
    },
    Committing {
        results: ResultAccumulator,
    },
}

impl Phase {
    #[must_use]
    pub const fn kind(&self) -> PhaseKind {
        match self {
            Self::Idle => PhaseKind::Idle,
            Self::Scanning { .. } => PhaseKind::Scanning,
            Self::Researching { .. } => PhaseKind::Researching,
            Self::Committing { .. } => PhaseKind::Committing,
        }
    }

    /// Rebuild the phase from the markers in `store`.
    ///
    /// # Errors
    ///
    /// [`ScoutError::State`] when a marker or the blob it names cannot be
    /// decoded, or a blob a marker names is gone. Store failures pass through
    /// as [`ScoutError::Store`].
    pub fn load(store: &dyn CheckpointStore) -> Result<Self, ScoutError> {
        let flags = store.flags().map_err(|e| match e {
            StoreError::Corrupt { path, reason } => {
                ScoutError::State(StateError::CorruptCheckpoint {
                    marker: path,
                    reason,
                })
            }
            other => ScoutError::Store(other),
        })?;

        if let Some(raw) = flags.get(markers::SCAN_STATE) {
            let handle: BlobHandle = decode(markers::SCAN_STATE, raw.as_bytes())?;
            let blob = read_blob(store, markers::SCAN_STATE, &handle)?;
            let state = decode(markers::SCAN_STATE, &blob)?;
            return Ok(Self::Scanning {
                handle: Some(handle),
                state,
            });
        }

        let Some(raw_queue) = flags.get(markers::QUEUE) else {
            return Ok(Self::Idle);
        };
        let queue: VecDeque<ItemKey> = decode(markers::QUEUE, raw_queue.as_bytes())?;
        let results = decode_optional(&flags, markers::RESULTS)?.unwrap_or_default();

        if queue.is_empty() {
            return Ok(Self::Committing { results });
        }

        let session_handle: BlobHandle = decode_optional(&flags, markers::SESSION)?
            .ok_or_else(|| StateError::CorruptCheckpoint {
                marker: markers::SESSION.to_string(),
                reason: "queue is pending but no session is recorded".to_string(),
            })?;
        let blob = read_blob(store, markers::SESSION, &session_handle)?;
        let session = decode(markers::SESSION, &blob)?;

        Ok(Self::Researching {
            session_handle,
            session,
            queue,
            results,
        })
    }
}

fn decode_optional<T: serde::de::DeserializeOwned>(
    flags: &BTreeMap<String, String>,
    marker: &str,
) -> Result<Option<T>, StateError> {
    flags
        .get(marker)
        .map(|raw| decode(marker, raw.as_bytes()))
        .transpose()
}

/// A blob named by a marker but missing from the store is corruption
fn read_blob(
    store: &dyn CheckpointStore,
    marker: &str,
    handle: &BlobHandle,
) -> Result<Vec<u8>, ScoutError> {
    store.read_blob(handle).map_err(|e| match e {
        StoreError::NotFound(_) => ScoutError::State(StateError::CorruptCheckpoint {
            marker: marker.to_string(),
            reason: format!("blob {handle} is missing"),
        }),
        other => ScoutError::Store(other),
    })
}
