//! Advisory lock that keeps mcpscout invocations from overlapping
//!
//! Orchestrator runs assume at most one live invocation per state directory.
//! Hosts such as cron or systemd timers cannot always promise that, so every
//! `mcpscout run` takes this lock first. The lock is advisory and coordinates
//! mcpscout processes only; it is not a security boundary.

use camino::{Utf8Path, Utf8PathBuf};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Age after which a lock held by a live process is reported as stale (in seconds)
pub const DEFAULT_STALE_THRESHOLD_SECS: u64 = 3600;

const LOCK_FILE_NAME: &str = "run.lock";

/// Lock information stored in the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID holding the lock
    pub pid: u32,
    /// Seconds since UNIX epoch when the lock was taken
    pub created_at: u64,
    /// mcpscout version that took the lock
    pub mcpscout_version: String,
}

/// Errors raised while taking or inspecting the invocation lock
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Another invocation is running (PID {pid}, started {age_secs}s ago)")]
    InvocationRunning { pid: u32, age_secs: u64 },

    #[error(
        "Lock held by PID {pid} for {age_secs}s exceeds the stale threshold. Use --force-unlock to override"
    )]
    StaleLock { pid: u32, age_secs: u64 },

    #[error("Lock file is corrupted or invalid: {reason}")]
    CorruptedLock { reason: String },

    #[error("Failed to acquire lock: {reason}")]
    AcquisitionFailed { reason: String },

    #[error("IO error during lock operation: {0}")]
    Io(#[from] io::Error),
}

/// Exclusive lock over a state directory, released on drop
pub struct InvocationLock {
    path: Utf8PathBuf,
    _fd_lock: Option<Box<RwLock<fs::File>>>,
    info: LockInfo,
}

impl InvocationLock {
    /// Path of the lock file inside `state_dir`
    #[must_use]
    pub fn lock_path(state_dir: &Utf8Path) -> Utf8PathBuf {
        state_dir.join(LOCK_FILE_NAME)
    }

    /// Take the lock for `state_dir`.
    ///
    /// A lock left behind by a process that is no longer running is taken
    /// over silently. A lock held by a live process is refused, unless it is
    /// older than the stale threshold and `force` is set.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvocationRunning`] when another live invocation
    /// holds the lock, [`LockError::StaleLock`] when a live holder exceeded the
    /// threshold without `force`, and [`LockError::CorruptedLock`] when the
    /// existing lock file cannot be parsed and `force` is not set.
    pub fn acquire(
        state_dir: &Utf8Path,
        force: bool,
        ttl_seconds: Option<u64>,
    ) -> Result<Self, LockError> {
        fs::create_dir_all(state_dir).map_err(|e| LockError::AcquisitionFailed {
            reason: format!("Failed to create state directory {state_dir}: {e}"),
        })?;

        let path = Self::lock_path(state_dir);
        let ttl = ttl_seconds.unwrap_or(DEFAULT_STALE_THRESHOLD_SECS);

        match create_exclusive(&path) {
            Ok(file) => return Self::finalize(path, file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        match Self::read_lock_file(&path) {
            Ok(Some(existing)) => check_existing(&existing, force, ttl)?,
            Ok(None) => debug!(path = %path, "Lock vanished before it could be inspected"),
            Err(e) if force => warn!(error = %e, "Overriding unreadable lock file"),
            Err(e) => return Err(e),
        }

        remove_lock_file(&path)?;

        match create_exclusive(&path) {
            Ok(file) => Self::finalize(path, file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(LockError::AcquisitionFailed {
                    reason: "another invocation took the lock first".to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read the lock currently recorded for `state_dir`, if any
    ///
    /// # Errors
    ///
    /// Returns [`LockError::CorruptedLock`] when the file exists but is unreadable.
    pub fn inspect(state_dir: &Utf8Path) -> Result<Option<LockInfo>, LockError> {
        Self::read_lock_file(&Self::lock_path(state_dir))
    }

    /// Release the lock and remove its file
    ///
    /// # Errors
    ///
    /// Returns an IO error if the lock file cannot be removed.
    pub fn release(mut self) -> Result<(), LockError> {
        self._fd_lock.take();
        remove_lock_file(&self.path)
    }

    #[must_use]
    pub const fn info(&self) -> &LockInfo {
        &self.info
    }

    fn finalize(path: Utf8PathBuf, file: fs::File) -> Result<Self, LockError> {
        let info = LockInfo {
            pid: process::id(),
            created_at: now_secs(),
            mcpscout_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let json =
            serde_json::to_string_pretty(&info).map_err(|e| LockError::AcquisitionFailed {
                reason: format!("Failed to serialize lock info: {e}"),
            })?;

        let mut rw_lock = Box::new(RwLock::new(file));
        {
            let guard = rw_lock
                .try_write()
                .map_err(|_| LockError::InvocationRunning {
                    pid: 0,
                    age_secs: 0,
                })?;
            let mut file_ref = &*guard;
            file_ref.write_all(json.as_bytes())?;
            file_ref.flush()?;
            file_ref.sync_all()?;
        }

        debug!(path = %path, pid = info.pid, "Invocation lock acquired");
        Ok(Self {
            path,
            _fd_lock: Some(rw_lock),
            info,
        })
    }

    fn read_lock_file(path: &Utf8Path) -> Result<Option<LockInfo>, LockError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LockError::CorruptedLock {
                    reason: format!("Failed to read lock file {path}: {e}"),
                });
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| LockError::CorruptedLock {
                reason: format!("Failed to parse lock file {path}: {e}"),
            })
    }
}

impl Drop for InvocationLock {
    fn drop(&mut self) {
        if self._fd_lock.take().is_some() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl std::fmt::Debug for InvocationLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationLock")
            .field("path", &self.path)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

fn check_existing(existing: &LockInfo, force: bool, ttl_seconds: u64) -> Result<(), LockError> {
    let age_secs = now_secs().saturating_sub(existing.created_at);

    if !is_process_running(existing.pid) {
        warn!(
            pid = existing.pid,
            age_secs, "Previous invocation exited without releasing its lock; taking over"
        );
        return Ok(());
    }

    if force {
        warn!(pid = existing.pid, age_secs, "Forcing lock override");
        return Ok(());
    }

    if age_secs > ttl_seconds {
        Err(LockError::StaleLock {
            pid: existing.pid,
            age_secs,
        })
    } else {
        Err(LockError::InvocationRunning {
            pid: existing.pid,
            age_secs,
        })
    }
}

fn create_exclusive(path: &Utf8Path) -> io::Result<fs::File> {
    fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
}

fn remove_lock_file(path: &Utf8Path) -> Result<(), LockError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs permission and existence checks only.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

// Without a portable liveness check every recorded holder counts as live.
#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    true
}
