//! Writer exclusion for the flat-file store.
//!
//! Rewrites replace the store by rename, so the advisory lock is taken on a
//! sidecar next to it (`users.tsv` -> `users.tsv.lock`) rather than on the
//! store itself. Readers never lock.

use crate::error::ErrorCode;
use fs2::FileExt;
use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

const MIN_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_millis(80);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another writer kept the sidecar locked for the whole wait.
    #[error("{} is held by another writer (gave up after {waited:?})", sidecar.display())]
    Busy { sidecar: PathBuf, waited: Duration },

    #[error("cannot open lock sidecar: {0}")]
    Io(#[from] io::Error),
}

impl LockError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Busy { .. } => ErrorCode::LockContention,
            Self::Io(_) => ErrorCode::StoreWriteFailed,
        }
    }
}

/// Held for the duration of a store rewrite; unlocked on drop.
#[derive(Debug)]
pub struct StoreLock {
    sidecar: PathBuf,
    file: File,
}

impl StoreLock {
    /// Lock the sidecar belonging to `store`, retrying with a growing backoff
    /// until `timeout` has passed.
    pub fn for_store(store: &Path, timeout: Duration) -> Result<Self, LockError> {
        let sidecar = sidecar_path(store);
        if let Some(dir) = sidecar.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&sidecar)?;

        let started = Instant::now();
        let mut backoff = MIN_BACKOFF;
        while file.try_lock_exclusive().is_err() {
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(LockError::Busy { sidecar, waited });
            }
            thread::sleep(backoff.min(timeout.saturating_sub(waited)));
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        Ok(Self { sidecar, file })
    }

    #[must_use]
    pub fn sidecar(&self) -> &Path {
        &self.sidecar
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// `<store>.lock`, next to the store.
#[must_use]
pub fn sidecar_path(store: &Path) -> PathBuf {
    let mut name = store
        .file_name()
        .map_or_else(OsString::new, std::ffi::OsStr::to_os_string);
    name.push(".lock");
    store.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tempfile::TempDir;

    #[test]
    fn sidecar_sits_next_to_store() {
        assert_eq!(
            sidecar_path(Path::new("/srv/cohort/users.tsv")),
            PathBuf::from("/srv/cohort/users.tsv.lock")
        );
        assert_eq!(sidecar_path(Path::new("users")), PathBuf::from("users.lock"));
    }

    #[test]
    fn second_writer_is_busy_while_first_holds() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("users.tsv");

        let held = StoreLock::for_store(&store, Duration::from_millis(50)).unwrap();
        assert!(held.sidecar().exists());

        let err = StoreLock::for_store(&store, Duration::from_millis(25)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LockContention);
        assert!(err.to_string().contains("users.tsv.lock"));
    }

    #[test]
    fn lock_is_free_again_after_drop() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("users.tsv");

        drop(StoreLock::for_store(&store, Duration::from_millis(50)).unwrap());
        assert!(StoreLock::for_store(&store, Duration::ZERO).is_ok());
    }

    #[test]
    fn waiting_writer_gets_lock_once_released() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("users.tsv");
        let (locked_tx, locked_rx) = mpsc::channel();

        let holder = {
            let store = store.clone();
            thread::spawn(move || {
                let guard = StoreLock::for_store(&store, Duration::from_secs(1)).unwrap();
                locked_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(40));
                drop(guard);
            })
        };

        locked_rx.recv().unwrap();
        let waited = StoreLock::for_store(&store, Duration::from_secs(2));
        holder.join().unwrap();
        assert!(waited.is_ok());
    }

    #[test]
    fn creates_missing_parent_directory() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("nested/deeper/users.tsv");
        let lock = StoreLock::for_store(&store, Duration::from_millis(10)).unwrap();
        assert!(lock.sidecar().parent().unwrap().is_dir());
    }
}
