//! Versioned text files with optimistic concurrency

use async_trait::async_trait;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use mcpscout_utils::atomic_write::{read_optional, write_file_atomic};
use mcpscout_utils::error::StoreError;

/// Opaque value identifying the revision of a file that was read
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(pub String);

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content of a file together with the token a later write must present
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionedFile {
    pub content: String,
    /// `None` when the file does not exist yet
    pub version: Option<VersionToken>,
}

impl VersionedFile {
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.version.is_some()
    }
}

/// A store of text files where every write carries the token of the revision it replaces
#[async_trait]
pub trait VersionedFileStore: Send + Sync {
    /// Read `path`. A missing file reads as empty content with no token.
    async fn read(&self, path: &str) -> Result<VersionedFile, StoreError>;

    /// Replace `path` if its current revision still matches `version`.
    ///
    /// `version == None` creates the file and fails if it already exists.
    /// A stale token yields [`StoreError::Conflict`]; nothing is written.
    async fn write(
        &self,
        path: &str,
        content: &str,
        version: Option<&VersionToken>,
        message: &str,
    ) -> Result<VersionToken, StoreError>;
}

/// Versioned store over a local directory; the token is the blake3 hash of the content
#[derive(Debug, Clone)]
pub struct LocalVersionedStore {
    root: Utf8PathBuf,
}

impl LocalVersionedStore {
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<Utf8PathBuf, StoreError> {
        let relative = Utf8Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Utf8Component::Normal(_) | Utf8Component::CurDir))
        {
            return Err(StoreError::NotFound(format!("{path} is outside the repository")));
        }
        Ok(self.root.join(relative))
    }

    fn token_for(content: &str) -> VersionToken {
        VersionToken(blake3::hash(content.as_bytes()).to_hex().to_string())
    }

    fn read_sync(&self, path: &str) -> Result<VersionedFile, StoreError> {
        let full = self.resolve(path)?;
        match read_optional(&full).map_err(|e| StoreError::io(&full, format!("{e:#}")))? {
            Some(content) => Ok(VersionedFile {
                version: Some(Self::token_for(&content)),
                content,
            }),
            None => Ok(VersionedFile::default()),
        }
    }
}

#[async_trait]
impl VersionedFileStore for LocalVersionedStore {
    async fn read(&self, path: &str) -> Result<VersionedFile, StoreError> {
        self.read_sync(path)
    }

    async fn write(
        &self,
        path: &str,
        content: &str,
        version: Option<&VersionToken>,
        message: &str,
    ) -> Result<VersionToken, StoreError> {
        let current = self.read_sync(path)?;
        if current.version.as_ref() != version {
            return Err(StoreError::Conflict {
                path: path.to_string(),
            });
        }

        let full = self.resolve(path)?;
        write_file_atomic(&full, content).map_err(|e| StoreError::io(&full, format!("{e:#}")))?;
        debug!(file = path, message, "Wrote versioned file");

        // The atomic writer normalizes line endings; hash what is on disk.
        Ok(Self::token_for(&content.replace("\r\n", "\n").replace('\r', "\n")))
    }
}
