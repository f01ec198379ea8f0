// SPDX-License-Identifier: Apache-2.0

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Exclusive advisory lock guarding a tombstone against a second tailer.
///
/// Held on `<tombstone>.lock` for as long as the value lives. Two processes
/// checkpointing the same family would overwrite each other's positions.
#[derive(Debug)]
pub struct TombstoneLock {
    file: File,
    path: PathBuf,
}

impl TombstoneLock {
    /// Take the lock for `tombstone_path` without blocking.
    ///
    /// Returns `Error::Locked` when another holder has it.
    pub fn acquire(tombstone_path: &Path) -> Result<Self> {
        let path = lock_path(tombstone_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Err(Error::Locked(tombstone_path.to_path_buf()));
            }
            return Err(Error::Io(err));
        }

        debug!(path = ?path, "Acquired tombstone lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TombstoneLock {
    fn drop(&mut self) {
        // Closing the descriptor releases it too; unlock first so a waiting
        // process sees it promptly.
        unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
    }
}

fn lock_path(tombstone_path: &Path) -> PathBuf {
    let mut name = tombstone_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path(Path::new("/var/lib/rotail/tombstone.json")),
            PathBuf::from("/var/lib/rotail/tombstone.json.lock")
        );
    }

    #[test]
    fn test_second_acquire_fails() {
        let dir = TempDir::new().unwrap();
        let tombstone = dir.path().join("tombstone.json");

        let held = TombstoneLock::acquire(&tombstone).unwrap();
        assert!(held.path().exists());

        let err = TombstoneLock::acquire(&tombstone).unwrap_err();
        assert!(matches!(err, Error::Locked(p) if p == tombstone));
    }

    #[test]
    fn test_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let tombstone = dir.path().join("state/tombstone.json");

        drop(TombstoneLock::acquire(&tombstone).unwrap());
        let again = TombstoneLock::acquire(&tombstone);
        assert!(again.is_ok());
    }
}
