// ABOUTME: Run-level exclusive lock so overlapping invocations cannot interleave
// ABOUTME: The lock is released when the guard is dropped or the process exits

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::SyncError;

#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Takes the lock without waiting; a held lock is reported as a configuration error.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create lock directory {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            return Err(SyncError::Configuration(format!(
                "another sync run holds {}",
                path.display()
            ))
            .into());
        }

        file.set_len(0).ok();
        writeln!(file, "{}", std::process::id()).ok();

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("run.lock");

        let first = RunLock::acquire(&path).unwrap();
        let err = RunLock::acquire(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::Configuration(_))
        ));

        drop(first);
        assert!(RunLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_creates_missing_parent() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested/dir/run.lock");
        let lock = RunLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), path.as_path());
        assert!(path.exists());
    }
}
