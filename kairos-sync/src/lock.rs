//! Single-instance guard
//!
//! A second sender against the same baseline would split-brain the progress
//! journal, so at most one process per host may run. The guard is an
//! advisory exclusive lock over the whole lock file, held for the lifetime
//! of the process and released by the OS on any exit path.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{Result, SyncError};

pub struct InstanceLock {
    file: std::fs::File,
    path: PathBuf,
}

impl InstanceLock {
    /// Create the lock file if absent and take a non-blocking exclusive
    /// lock. Fails with [`SyncError::AlreadyRunning`] when another process
    /// holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc != 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::WouldBlock {
                    return Err(SyncError::AlreadyRunning(path.to_path_buf()));
                }
                return Err(SyncError::Io(err));
            }
        }

        // Record the holder's pid; purely informational.
        file.set_len(0)?;
        let mut writer = &file;
        let _ = writer.write_all(format!("{}\n", std::process::id()).as_bytes());
        let _ = writer.flush();

        debug!("acquired instance lock at {}", path.display());
        Ok(InstanceLock {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        // The lock file itself stays behind. Removing it would race a
        // waiter holding a descriptor to the unlinked inode against a
        // fresh process creating a new file.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sender.lock");

        let first = InstanceLock::acquire(&path).unwrap();
        let second = InstanceLock::acquire(&path);
        assert!(matches!(second, Err(SyncError::AlreadyRunning(_))));

        drop(first);
        InstanceLock::acquire(&path).unwrap();
    }

    #[test]
    fn test_parent_directory_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deep/sender.lock");
        let lock = InstanceLock::acquire(&path).unwrap();
        assert!(lock.path().exists());
    }
}
