//! In-memory store implementations
//!
//! Used by tests and by embedders that drive the orchestrator without a
//! filesystem. Each type exposes a few inspection and failure-injection
//! helpers on top of its trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mcpscout_utils::error::StoreError;

use crate::checkpoint::{BlobHandle, CheckpointStore};
use crate::object::{LeafEntry, ObjectStore, StoredObject};
use crate::scheduler::{ContinuationHandle, PendingContinuation, Scheduler};
use crate::versioned::{VersionToken, VersionedFile, VersionedFileStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct ObjectTree {
    children: BTreeMap<String, Vec<String>>,
    leaves: BTreeMap<String, Vec<LeafEntry>>,
    content: BTreeMap<String, Vec<u8>>,
    failing: BTreeSet<String>,
}

/// Object store holding a tree built through [`MemoryObjectStore::add_leaf`]
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    tree: Mutex<ObjectTree>,
    leaf_reads: AtomicU32,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `child` under `parent`
    pub fn add_container(&self, parent: &str, child: &str) {
        let mut tree = lock(&self.tree);
        let children = tree.children.entry(parent.to_string()).or_default();
        if !children.iter().any(|c| c == child) {
            children.push(child.to_string());
        }
        tree.children.entry(child.to_string()).or_default();
    }

    /// Add a leaf named `name` to `container`; returns its handle
    pub fn add_leaf(
        &self,
        container: &str,
        name: &str,
        content: impl Into<Vec<u8>>,
        modified: DateTime<Utc>,
    ) -> String {
        let handle = if container.is_empty() {
            name.to_string()
        } else {
            format!("{container}/{name}")
        };
        let mut tree = lock(&self.tree);
        tree.content.insert(handle.clone(), content.into());
        tree.leaves
            .entry(container.to_string())
            .or_default()
            .push(LeafEntry {
                handle: handle.clone(),
                name: name.to_string(),
                modified,
            });
        handle
    }

    /// Make every listing of `container` fail with a transport error
    pub fn fail_container(&self, container: &str) {
        lock(&self.tree).failing.insert(container.to_string());
    }

    /// Number of successful [`ObjectStore::read_leaf`] calls
    pub fn leaf_reads(&self) -> u32 {
        self.leaf_reads.load(Ordering::SeqCst)
    }

    fn check(&self, container: &str) -> Result<(), StoreError> {
        if lock(&self.tree).failing.contains(container) {
            return Err(StoreError::Transport(format!("listing {container} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_children(&self, container: &str) -> Result<Vec<String>, StoreError> {
        self.check(container)?;
        Ok(lock(&self.tree)
            .children
            .get(container)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_leaves(&self, container: &str) -> Result<Vec<LeafEntry>, StoreError> {
        self.check(container)?;
        Ok(lock(&self.tree)
            .leaves
            .get(container)
            .cloned()
            .unwrap_or_default())
    }

    async fn read_leaf(&self, leaf: &LeafEntry) -> Result<Vec<u8>, StoreError> {
        let bytes = lock(&self.tree)
            .content
            .get(&leaf.handle)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(leaf.handle.clone()))?;
        self.leaf_reads.fetch_add(1, Ordering::SeqCst);
        Ok(bytes)
    }

    async fn get_object(&self, handle: &str) -> Result<StoredObject, StoreError> {
        let tree = lock(&self.tree);
        let bytes = tree
            .content
            .get(handle)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(handle.to_string()))?;
        let modified = tree
            .leaves
            .values()
            .flatten()
            .find(|leaf| leaf.handle == handle)
            .map_or(DateTime::<Utc>::UNIX_EPOCH, |leaf| leaf.modified);
        Ok(StoredObject { bytes, modified })
    }
}

#[derive(Debug, Default)]
struct VersionedState {
    files: BTreeMap<String, (String, u64)>,
    revision: u64,
    writes: u32,
    conflicts_remaining: u32,
    fail_writes: bool,
}

/// Versioned store whose tokens are monotonically increasing revision numbers
#[derive(Debug, Default)]
pub struct MemoryVersionedStore {
    state: Mutex<VersionedState>,
}

impl MemoryVersionedStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `path` outside the versioning protocol, as another writer would
    pub fn put(&self, path: &str, content: &str) {
        let mut state = lock(&self.state);
        state.revision += 1;
        let revision = state.revision;
        state.files.insert(path.to_string(), (content.to_string(), revision));
    }

    #[must_use]
    pub fn content(&self, path: &str) -> Option<String> {
        lock(&self.state).files.get(path).map(|(c, _)| c.clone())
    }

    /// Number of successful writes
    #[must_use]
    pub fn write_count(&self) -> u32 {
        lock(&self.state).writes
    }

    /// Reject the next `times` writes with a conflict
    pub fn conflict_on_write(&self, times: u32) {
        lock(&self.state).conflicts_remaining = times;
    }

    /// Make every write fail with a transport error until reset
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }
}

#[async_trait]
impl VersionedFileStore for MemoryVersionedStore {
    async fn read(&self, path: &str) -> Result<VersionedFile, StoreError> {
        Ok(match lock(&self.state).files.get(path) {
            Some((content, revision)) => VersionedFile {
                content: content.clone(),
                version: Some(VersionToken(revision.to_string())),
            },
            None => VersionedFile::default(),
        })
    }

    async fn write(
        &self,
        path: &str,
        content: &str,
        version: Option<&VersionToken>,
        _message: &str,
    ) -> Result<VersionToken, StoreError> {
        let mut state = lock(&self.state);
        if state.fail_writes {
            return Err(StoreError::Transport(format!("write to {path} failed")));
        }
        if state.conflicts_remaining > 0 {
            state.conflicts_remaining -= 1;
            return Err(StoreError::Conflict {
                path: path.to_string(),
            });
        }

        let current = state
            .files
            .get(path)
            .map(|(_, revision)| VersionToken(revision.to_string()));
        if current.as_ref() != version {
            return Err(StoreError::Conflict {
                path: path.to_string(),
            });
        }

        state.revision += 1;
        state.writes += 1;
        let revision = state.revision;
        state.files.insert(path.to_string(), (content.to_string(), revision));
        Ok(VersionToken(revision.to_string()))
    }
}

#[derive(Debug, Default)]
struct CheckpointState {
    blobs: BTreeMap<BlobHandle, Vec<u8>>,
    flags: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    state: Mutex<CheckpointState>,
    counter: AtomicU64,
}

impl MemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn blob_count(&self) -> usize {
        lock(&self.state).blobs.len()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn create_blob(&self, label: &str, bytes: &[u8]) -> Result<BlobHandle, StoreError> {
        let sequence = self.counter.fetch_add(1, Ordering::SeqCst);
        let label = label.replace('_', "-").to_ascii_lowercase();
        let handle = BlobHandle::parse(&format!("{label}-{sequence}"))?;
        lock(&self.state).blobs.insert(handle.clone(), bytes.to_vec());
        Ok(handle)
    }

    fn read_blob(&self, handle: &BlobHandle) -> Result<Vec<u8>, StoreError> {
        lock(&self.state)
            .blobs
            .get(handle)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(handle.to_string()))
    }

    fn delete_blob(&self, handle: &BlobHandle) -> Result<(), StoreError> {
        lock(&self.state).blobs.remove(handle);
        Ok(())
    }

    fn flags(&self) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(lock(&self.state).flags.clone())
    }

    fn clear_flags(&self) -> Result<(), StoreError> {
        lock(&self.state).flags.clear();
        Ok(())
    }

    fn update_flags(
        &self,
        set: &BTreeMap<String, String>,
        remove: &[&str],
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        for key in remove {
            state.flags.remove(*key);
        }
        state
            .flags
            .extend(set.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryScheduler {
    pending: Mutex<Vec<PendingContinuation>>,
    scheduled: AtomicU32,
}

impl MemoryScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total continuations ever scheduled, including cancelled ones
    #[must_use]
    pub fn scheduled_total(&self) -> u32 {
        self.scheduled.load(Ordering::SeqCst)
    }
}

impl Scheduler for MemoryScheduler {
    fn schedule_once(&self, delay: Duration) -> Result<ContinuationHandle, StoreError> {
        let sequence = self.scheduled.fetch_add(1, Ordering::SeqCst);
        let handle = ContinuationHandle(format!("cont-{sequence}"));
        let due_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        lock(&self.pending).push(PendingContinuation {
            handle: handle.clone(),
            due_at,
        });
        Ok(handle)
    }

    fn cancel(&self, handle: &ContinuationHandle) -> Result<(), StoreError> {
        lock(&self.pending).retain(|p| &p.handle != handle);
        Ok(())
    }

    fn list_pending(&self) -> Result<Vec<PendingContinuation>, StoreError> {
        Ok(lock(&self.pending).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_object_store_failure_injection() {
        let store = MemoryObjectStore::new();
        store.add_container("", "team");
        store.add_leaf("team", "a.json", "{}", Utc::now());

        assert_eq!(store.list_children("").await.unwrap(), ["team"]);
        assert_eq!(store.list_leaves("team").await.unwrap().len(), 1);

        store.fail_container("team");
        assert!(matches!(
            store.list_leaves("team").await,
            Err(StoreError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_versioned_store_detects_foreign_write() {
        let store = MemoryVersionedStore::new();
        store.put("f", "one");
        let read = store.read("f").await.unwrap();

        store.put("f", "two");
        let result = store.write("f", "three", read.version.as_ref(), "m").await;

        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        assert_eq!(store.content("f").as_deref(), Some("two"));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_conflicts_are_consumed() {
        let store = MemoryVersionedStore::new();
        store.conflict_on_write(1);

        assert!(store.write("f", "x", None, "m").await.is_err());
        assert!(store.write("f", "x", None, "m").await.is_ok());
    }

    #[test]
    fn test_scheduler_counts_cancelled() {
        let scheduler = MemoryScheduler::new();
        let first = scheduler.schedule_once(Duration::from_secs(1)).unwrap();
        scheduler.cancel(&first).unwrap();
        scheduler.schedule_once(Duration::from_secs(1)).unwrap();

        assert_eq!(scheduler.scheduled_total(), 2);
        assert_eq!(scheduler.list_pending().unwrap().len(), 1);
    }
}
