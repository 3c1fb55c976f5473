//! Durable blob and flag storage for run checkpoints
//!
//! Blobs hold large values (scan state, session maps) and are addressed by a
//! generated [`BlobHandle`]. Flags are a small string-to-string map whose
//! updates are applied all at once, so a checkpoint that touches several
//! markers is never observed half-written.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use mcpscout_utils::atomic_write::{read_optional, write_bytes_atomic, write_file_atomic};
use mcpscout_utils::error::StoreError;

/// Opaque handle to a stored blob
///
/// Deserialization goes through [`BlobHandle::parse`], so a handle read back
/// from a flag can never name a path outside the blob directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct BlobHandle(String);

impl BlobHandle {
    /// Parse a handle previously rendered with [`BlobHandle::as_str`]
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidResponse`] if the value contains
    /// characters other than lowercase ASCII letters, digits and `-`.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let valid = !raw.is_empty()
            && raw
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(StoreError::InvalidResponse(format!("invalid blob handle: {raw:?}")))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BlobHandle {
    type Error = StoreError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<BlobHandle> for String {
    fn from(handle: BlobHandle) -> Self {
        handle.0
    }
}

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable key-value storage for checkpoints
pub trait CheckpointStore: Send + Sync {
    /// Store `bytes` as a new blob. `label` becomes part of the handle.
    fn create_blob(&self, label: &str, bytes: &[u8]) -> Result<BlobHandle, StoreError>;

    /// Read a blob. A missing blob is [`StoreError::NotFound`].
    fn read_blob(&self, handle: &BlobHandle) -> Result<Vec<u8>, StoreError>;

    /// Delete a blob. Deleting a missing blob succeeds.
    fn delete_blob(&self, handle: &BlobHandle) -> Result<(), StoreError>;

    /// All flags currently set. Unparseable flag storage is [`StoreError::Corrupt`].
    fn flags(&self) -> Result<BTreeMap<String, String>, StoreError>;

    /// Drop every flag, including flag storage that no longer parses
    fn clear_flags(&self) -> Result<(), StoreError>;

    /// Apply `set` and `remove` to the flags as one durable update
    fn update_flags(
        &self,
        set: &BTreeMap<String, String>,
        remove: &[&str],
    ) -> Result<(), StoreError>;

    fn get_flag(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.flags()?.remove(key))
    }

    fn set_flag(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let set = BTreeMap::from([(key.to_string(), value.to_string())]);
        self.update_flags(&set, &[])
    }

    fn delete_flag(&self, key: &str) -> Result<(), StoreError> {
        self.update_flags(&BTreeMap::new(), &[key])
    }
}

/// Checkpoint store rooted in a state directory.
///
/// ```text
/// <dir>/flags.json
/// <dir>/blobs/<handle>.json
/// ```
#[derive(Debug)]
pub struct FsCheckpointStore {
    dir: Utf8PathBuf,
    counter: AtomicU64,
}

impl FsCheckpointStore {
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    fn flags_path(&self) -> Utf8PathBuf {
        self.dir.join("flags.json")
    }

    fn blob_path(&self, handle: &BlobHandle) -> Utf8PathBuf {
        self.dir.join("blobs").join(format!("{handle}.json"))
    }

    fn next_handle(&self, label: &str) -> Result<BlobHandle, StoreError> {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        let stamp = chrono::Utc::now().timestamp_millis();
        let label: String = label
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        BlobHandle::parse(&format!(
            "{}-{stamp}-{}-{sequence}",
            label.trim_matches('-'),
            std::process::id()
        ))
    }
}

impl CheckpointStore for FsCheckpointStore {
    fn create_blob(&self, label: &str, bytes: &[u8]) -> Result<BlobHandle, StoreError> {
        let handle = self.next_handle(label)?;
        let path = self.blob_path(&handle);
        write_bytes_atomic(&path, bytes).map_err(|e| StoreError::io(&path, format!("{e:#}")))?;
        debug!(blob = %handle, bytes = bytes.len(), "Created checkpoint blob");
        Ok(handle)
    }

    fn read_blob(&self, handle: &BlobHandle) -> Result<Vec<u8>, StoreError> {
        let path = self.blob_path(handle);
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(handle.to_string()),
            _ => StoreError::io(&path, e),
        })
    }

    fn delete_blob(&self, handle: &BlobHandle) -> Result<(), StoreError> {
        let path = self.blob_path(handle);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn flags(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let path = self.flags_path();
        let Some(raw) = read_optional(&path).map_err(|e| StoreError::io(&path, format!("{e:#}")))?
        else {
            return Ok(BTreeMap::new());
        };
        serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    fn clear_flags(&self) -> Result<(), StoreError> {
        let path = self.flags_path();
        write_file_atomic(&path, "{}").map_err(|e| StoreError::io(&path, format!("{e:#}")))?;
        debug!(path = %path, "Cleared checkpoint flags");
        Ok(())
    }

    fn update_flags(
        &self,
        set: &BTreeMap<String, String>,
        remove: &[&str],
    ) -> Result<(), StoreError> {
        let mut flags = self.flags()?;
        for key in remove {
            flags.remove(*key);
        }
        flags.extend(set.iter().map(|(k, v)| (k.clone(), v.clone())));

        let path = self.flags_path();
        let json = serde_json::to_string_pretty(&flags)
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        write_file_atomic(&path, &json).map_err(|e| StoreError::io(&path, format!("{e:#}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsCheckpointStore) {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().join("state")).unwrap();
        (temp, FsCheckpointStore::new(dir))
    }

    #[test]
    fn test_blob_lifecycle() {
        let (_temp, store) = store();

        let handle = store.create_blob("scan_state", b"{\"pending\":[]}").unwrap();
        assert!(handle.as_str().starts_with("scan-state-"));
        assert_eq!(store.read_blob(&handle).unwrap(), b"{\"pending\":[]}");

        store.delete_blob(&handle).unwrap();
        assert!(matches!(store.read_blob(&handle), Err(StoreError::NotFound(_))));
        store.delete_blob(&handle).unwrap();
    }

    #[test]
    fn test_handles_are_unique() {
        let (_temp, store) = store();
        let a = store.create_blob("session", b"1").unwrap();
        let b = store.create_blob("session", b"2").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.read_blob(&a).unwrap(), b"1");
    }

    #[test]
    fn test_flag_updates_apply_together() {
        let (_temp, store) = store();
        assert!(store.flags().unwrap().is_empty());

        store.set_flag("queue", "[]").unwrap();
        store.set_flag("retry", "{}").unwrap();

        let set = BTreeMap::from([("results".to_string(), "{}".to_string())]);
        store.update_flags(&set, &["queue"]).unwrap();

        let flags = store.flags().unwrap();
        assert_eq!(flags.keys().collect::<Vec<_>>(), ["results", "retry"]);
        assert_eq!(store.get_flag("queue").unwrap(), None);

        store.delete_flag("retry").unwrap();
        assert_eq!(store.get_flag("retry").unwrap(), None);
    }

    #[test]
    fn test_flags_survive_reopen() {
        let (_temp, store) = store();
        store.set_flag("session", "abc").unwrap();

        let reopened = FsCheckpointStore::new(store.dir().to_path_buf());
        assert_eq!(reopened.get_flag("session").unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_handle_parse_rejects_paths() {
        assert!(BlobHandle::parse("../flags").is_err());
        assert!(BlobHandle::parse("").is_err());
        assert!(BlobHandle::parse("scan-1").is_ok());
    }

    #[test]
    fn test_handle_deserialize_validates() {
        let handle: BlobHandle = serde_json::from_str("\"session-3\"").unwrap();
        assert_eq!(handle.as_str(), "session-3");
        assert_eq!(serde_json::to_string(&handle).unwrap(), "\"session-3\"");

        assert!(serde_json::from_str::<BlobHandle>("\"../x\"").is_err());
        assert!(serde_json::from_str::<BlobHandle>("\"blobs/../../etc\"").is_err());
    }

    #[test]
    fn test_unparseable_flags_are_corrupt_and_clearable() {
        let (_temp, store) = store();
        store.set_flag("retry", "{}").unwrap();
        std::fs::write(store.dir().join("flags.json"), "{\"queue\": ").unwrap();

        assert!(matches!(store.flags(), Err(StoreError::Corrupt { .. })));
        assert!(matches!(store.set_flag("queue", "[]"), Err(StoreError::Corrupt { .. })));

        store.clear_flags().unwrap();
        assert!(store.flags().unwrap().is_empty());
        store.set_flag("queue", "[]").unwrap();
        assert_eq!(store.get_flag("queue").unwrap().as_deref(), Some("[]"));
    }
}
