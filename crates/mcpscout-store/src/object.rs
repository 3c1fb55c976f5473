//! Hierarchical object store: containers holding leaves and child containers

use async_trait::async_trait;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use std::io;

use mcpscout_utils::error::StoreError;

/// A terminal object inside a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    /// Handle accepted by [`ObjectStore::read_leaf`] and [`ObjectStore::get_object`]
    pub handle: String,
    /// Name unique within the container
    pub name: String,
    pub modified: DateTime<Utc>,
}

/// An object fetched directly by handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub modified: DateTime<Utc>,
}

/// Read-only access to a hierarchical container store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Child containers of `container`, in a stable order
    async fn list_children(&self, container: &str) -> Result<Vec<String>, StoreError>;

    /// Leaves directly inside `container`, in a stable order
    async fn list_leaves(&self, container: &str) -> Result<Vec<LeafEntry>, StoreError>;

    /// Content of a leaf returned by [`ObjectStore::list_leaves`]
    async fn read_leaf(&self, leaf: &LeafEntry) -> Result<Vec<u8>, StoreError>;

    /// Fetch an object by handle without listing its container
    async fn get_object(&self, handle: &str) -> Result<StoredObject, StoreError>;
}

/// Object store over a local directory.
///
/// Directories are containers and regular files are leaves. Handles are
/// `/`-separated paths relative to the root; the empty handle and `.` name
/// the root itself. Handles that would leave the root are rejected.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: Utf8PathBuf,
}

impl FsObjectStore {
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn resolve(&self, handle: &str) -> Result<Utf8PathBuf, StoreError> {
        let relative = Utf8Path::new(handle.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Utf8Component::Normal(part) => resolved.push(part),
                Utf8Component::CurDir => {}
                _ => return Err(StoreError::NotFound(format!("{handle} escapes the store root"))),
            }
        }
        Ok(resolved)
    }

    fn child_handle(container: &str, name: &str) -> String {
        let container = container.trim_matches('/');
        if container.is_empty() || container == "." {
            name.to_string()
        } else {
            format!("{container}/{name}")
        }
    }

    async fn entries(
        &self,
        container: &str,
    ) -> Result<Vec<(String, std::fs::Metadata)>, StoreError> {
        let dir = self.resolve(container)?;
        let mut reader = tokio::fs::read_dir(&dir).await.map_err(|e| map_io(&dir, &e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(|e| map_io(&dir, &e))? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let metadata = entry.metadata().await.map_err(|e| map_io(&dir, &e))?;
            entries.push((name, metadata));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list_children(&self, container: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries(container)
            .await?
            .into_iter()
            .filter(|(_, meta)| meta.is_dir())
            .map(|(name, _)| Self::child_handle(container, &name))
            .collect())
    }

    async fn list_leaves(&self, container: &str) -> Result<Vec<LeafEntry>, StoreError> {
        Ok(self
            .entries(container)
            .await?
            .into_iter()
            .filter(|(_, meta)| meta.is_file())
            .map(|(name, meta)| LeafEntry {
                handle: Self::child_handle(container, &name),
                modified: modified_of(&meta),
                name,
            })
            .collect())
    }

    async fn read_leaf(&self, leaf: &LeafEntry) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(&leaf.handle)?;
        tokio::fs::read(&path).await.map_err(|e| map_io(&path, &e))
    }

    async fn get_object(&self, handle: &str) -> Result<StoredObject, StoreError> {
        let path = self.resolve(handle)?;
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| map_io(&path, &e))?;
        if !metadata.is_file() {
            return Err(StoreError::NotFound(format!("{handle} is not a file")));
        }
        let bytes = tokio::fs::read(&path).await.map_err(|e| map_io(&path, &e))?;
        Ok(StoredObject {
            bytes,
            modified: modified_of(&metadata),
        })
    }
}

fn modified_of(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn map_io(path: &Utf8Path, err: &io::Error) -> StoreError {
    match err.kind() {
        io::ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
        _ => StoreError::io(path, err),
    }
}
