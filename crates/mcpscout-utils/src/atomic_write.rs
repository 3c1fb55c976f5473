//! Crash-safe file replacement
//!
//! Checkpoint blobs, scalar flags and locally published files are all replaced
//! through a temporary file in the target directory: write, fsync, rename.
//! A reader therefore sees either the previous content or the new content,
//! never a torn write. When the rename crosses filesystems the content is
//! copied next to the target first.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Outcome of an atomic write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomicWriteResult {
    /// Bytes written to the target
    pub bytes_written: usize,
    /// Whether the cross-filesystem fallback was used
    pub used_cross_filesystem_fallback: bool,
}

/// Atomically replace `path` with UTF-8 text, normalizing line endings to LF.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created or the
/// temporary file cannot be written, synced or renamed.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<AtomicWriteResult> {
    let normalized = normalize_line_endings(content);
    write_bytes_atomic(path, normalized.as_bytes())
}

/// Atomically replace `path` with raw bytes.
///
/// # Errors
///
/// Same as [`write_file_atomic`].
pub fn write_bytes_atomic(path: &Utf8Path, bytes: &[u8]) -> Result<AtomicWriteResult> {
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let parent = if parent.as_str().is_empty() {
        Utf8Path::new(".")
    } else {
        parent
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create parent directory: {parent}"))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in: {parent}"))?;
    temp_file
        .write_all(bytes)
        .context("Failed to write content to temporary file")?;
    temp_file
        .as_file()
        .sync_all()
        .context("Failed to fsync temporary file")?;

    let mut result = AtomicWriteResult {
        bytes_written: bytes.len(),
        used_cross_filesystem_fallback: false,
    };

    let temp_path = temp_file.path().to_path_buf();
    match temp_file.persist(path.as_std_path()) {
        Ok(_) => {}
        Err(e) if is_cross_filesystem_error(&e.error) => {
            result.used_cross_filesystem_fallback = true;
            copy_then_replace(&temp_path, bytes, path)?;
        }
        Err(e) => {
            return Err(anyhow::Error::new(e.error))
                .with_context(|| format!("Failed to atomically write file: {path}"));
        }
    }

    Ok(result)
}

/// Read a UTF-8 file, returning `None` when it does not exist
///
/// # Errors
///
/// Returns an error for any failure other than the file being absent.
pub fn read_optional(path: &Utf8Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(normalize_line_endings(&content))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => {
            Err(anyhow::Error::new(e)).with_context(|| format!("Failed to read file: {path}"))
        }
    }
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(unix)]
fn is_cross_filesystem_error(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(18) // EXDEV
}

#[cfg(not(unix))]
fn is_cross_filesystem_error(_err: &std::io::Error) -> bool {
    false
}

fn copy_then_replace(temp_path: &Path, bytes: &[u8], target: &Utf8Path) -> Result<()> {
    let target_dir = target.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut staged = NamedTempFile::new_in(target_dir)
        .with_context(|| format!("Failed to create temp file in target directory: {target_dir}"))?;
    staged
        .write_all(bytes)
        .context("Failed to write content during cross-filesystem copy")?;
    staged
        .as_file()
        .sync_all()
        .context("Failed to fsync during cross-filesystem copy")?;
    staged
        .persist(target.as_std_path())
        .map_err(|e| anyhow::Error::new(e.error))
        .context("Failed to persist during cross-filesystem copy")?;

    let _ = fs::remove_file(temp_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn target(temp: &TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(temp.path().join(name)).unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let path = target(&temp, "flags.json");

        let result = write_file_atomic(&path, "{\"queue\": []}").unwrap();

        assert_eq!(result.bytes_written, 13);
        assert!(!result.used_cross_filesystem_fallback);
        assert_eq!(read_optional(&path).unwrap().as_deref(), Some("{\"queue\": []}"));
    }

    #[test]
    fn test_line_endings_are_normalized() {
        let temp = TempDir::new().unwrap();
        let path = target(&temp, "servers.yaml");

        write_file_atomic(&path, "categories:\r\n  search:\r\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "categories:\n  search:\n");
    }

    #[test]
    fn test_creates_missing_parents_and_overwrites() {
        let temp = TempDir::new().unwrap();
        let path = target(&temp, "state/blobs/scan-1.json");

        write_bytes_atomic(&path, b"first").unwrap();
        write_bytes_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_read_optional_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(read_optional(&target(&temp, "absent.md")).unwrap().is_none());
    }
}
