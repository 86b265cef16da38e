//! Run lock adapters: OS advisory file lock and an in-process flag

use feedloom_domain::{LockError, LockHolder, RunLock, RunLockGuard};
use std::fs::{File, OpenOptions, TryLockError};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;

const LOCK_FILE: &str = "update.lock";

/// Exclusive non-blocking lock on `<data_dir>/update.lock`.
///
/// The OS releases the lock when the file handle closes, so a crashed run
/// never leaves a stale lock behind. The file body only carries the holder
/// for diagnostics.
pub struct FileRunLock {
    path: PathBuf,
}

impl FileRunLock {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(LOCK_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Holder recorded by whoever currently owns (or last owned) the lock
    pub fn read_holder(&self) -> Option<LockHolder> {
        let body = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&body).ok()
    }
}

struct FileRunGuard {
    file: File,
    holder: LockHolder,
}

impl RunLockGuard for FileRunGuard {
    fn holder(&self) -> &LockHolder {
        &self.holder
    }
}

impl Drop for FileRunGuard {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = self.file.unlock();
        tracing::debug!(pid = self.holder.pid, "Released run lock");
    }
}

impl RunLock for FileRunLock {
    fn try_acquire(&self) -> Result<Box<dyn RunLockGuard>, LockError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LockError::Io(e.to_string()))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| LockError::Io(format!("{}: {}", self.path.display(), e)))?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(LockError::AlreadyRunning {
                    holder: self.read_holder(),
                });
            }
            Err(TryLockError::Error(e)) => return Err(LockError::Io(e.to_string())),
        }

        let holder = LockHolder {
            pid: std::process::id(),
            started_at: OffsetDateTime::now_utc(),
        };
        let body = serde_json::to_string(&holder).map_err(|e| LockError::Io(e.to_string()))?;

        file.set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| file.write_all(body.as_bytes()))
            .and_then(|_| file.flush())
            .map_err(|e| LockError::Io(e.to_string()))?;

        tracing::debug!(path = %self.path.display(), pid = holder.pid, "Acquired run lock");

        Ok(Box::new(FileRunGuard { file, holder }))
    }
}

/// Lock shared by orchestrators inside one process
#[derive(Clone, Default)]
pub struct InProcessRunLock {
    held: Arc<AtomicBool>,
}

impl InProcessRunLock {
    pub fn new() -> Self {
        Self::default()
    }
}

struct InProcessGuard {
    held: Arc<AtomicBool>,
    holder: LockHolder,
}

impl RunLockGuard for InProcessGuard {
    fn holder(&self) -> &LockHolder {
        &self.holder
    }
}

impl Drop for InProcessGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

impl RunLock for InProcessRunLock {
    fn try_acquire(&self) -> Result<Box<dyn RunLockGuard>, LockError> {
        if self
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LockError::AlreadyRunning { holder: None });
        }

        Ok(Box::new(InProcessGuard {
            held: Arc::clone(&self.held),
            holder: LockHolder {
                pid: std::process::id(),
                started_at: OffsetDateTime::now_utc(),
            },
        }))
    }
}
