//! Per-item advisory file locks.
//!
//! Two aggregate writes for the same item must never interleave. Rather
//! than a single lock guarding the whole aggregates directory, each item
//! gets its own lock file so unrelated items never contend.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Error acquiring an item lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("timed out waiting {waited:?} for lock at {path}")]
    Timeout { path: PathBuf, waited: Duration },

    #[error("io error locking {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// An exclusive hold on one item's lock file. Released on drop.
pub struct ItemGuard {
    file: File,
    path: PathBuf,
}

impl ItemGuard {
    /// Acquire the lock for `item_id` under `lock_dir`, polling until
    /// `timeout` elapses.
    pub fn acquire(lock_dir: &Path, item_id: &str, timeout: Duration) -> Result<Self, LockError> {
        std::fs::create_dir_all(lock_dir).map_err(|source| LockError::Io {
            path: lock_dir.to_path_buf(),
            source,
        })?;
        let path = lock_dir.join(format!("{item_id}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;

        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file, path }),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() >= timeout {
                        return Err(LockError::Timeout {
                            path,
                            waited: start.elapsed(),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(source) => return Err(LockError::Io { path, source }),
            }
        }
    }

    /// Acquire with the default 5-second timeout.
    pub fn acquire_default(lock_dir: &Path, item_id: &str) -> Result<Self, LockError> {
        Self::acquire(lock_dir, item_id, DEFAULT_TIMEOUT)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ItemGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
