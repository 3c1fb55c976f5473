//! Storage collaborators used by the mcpscout orchestrator
//!
//! Each collaborator is a trait with a production implementation and an
//! in-memory implementation:
//!
//! | Trait | Production | Memory |
//! |-------|------------|--------|
//! | [`ObjectStore`] | [`FsObjectStore`] | [`MemoryObjectStore`] |
//! | [`VersionedFileStore`] | [`LocalVersionedStore`], [`GitHubContentsStore`] | [`MemoryVersionedStore`] |
//! | [`CheckpointStore`] | [`FsCheckpointStore`] | [`MemoryCheckpointStore`] |
//! | [`Scheduler`] | [`FileScheduler`] | [`MemoryScheduler`] |

pub mod checkpoint;
pub mod github;
pub mod memory;
pub mod object;
pub mod scheduler;
pub mod versioned;

pub use checkpoint::{BlobHandle, CheckpointStore, FsCheckpointStore};
pub use github::GitHubContentsStore;
pub use memory::{MemoryCheckpointStore, MemoryObjectStore, MemoryScheduler, MemoryVersionedStore};
pub use object::{FsObjectStore, LeafEntry, ObjectStore, StoredObject};
pub use scheduler::{ContinuationHandle, FileScheduler, PendingContinuation, Scheduler};
pub use versioned::{LocalVersionedStore, VersionToken, VersionedFile, VersionedFileStore};

pub use mcpscout_utils::error::StoreError;
