//! Hierarchical, in-memory, non-blocking path locking.
//!
//! A single `Mutex`-guarded `LockSet` tracks which paths are currently held
//! for reading or writing, split by whether the path names a file or a
//! directory. Acquisition is fail-fast: if a request would conflict with
//! something already held, it returns `BusyPath` immediately rather than
//! waiting. Conflicts are decided by ancestor/descendant relationships
//! between normalized, absolute paths (`Path::starts_with` is exactly the
//! longest-common-prefix check this needs, since both sides are always
//! already-normalized real paths).
//!
//! The mutex is a plain `std::sync::Mutex`: its critical sections are pure
//! bookkeeping over in-memory `Vec<PathBuf>`s and never cross an `.await`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::StorageError;

#[derive(Default)]
struct LockSet {
    files_read: Vec<PathBuf>,
    files_write: Vec<PathBuf>,
    dirs_read: Vec<PathBuf>,
    dirs_write: Vec<PathBuf>,
}

fn remove_one(set: &mut Vec<PathBuf>, path: &Path) {
    if let Some(idx) = set.iter().position(|p| p == path) {
        set.swap_remove(idx);
    }
}

/// The shared lock table. Cheap to clone (it's an `Arc` internally via its
/// constructor returning one), acquisitions are `O(n)` in the number of
/// currently-held locks.
pub struct PathLock {
    state: Mutex<LockSet>,
}

impl PathLock {
    pub fn new() -> Arc<PathLock> {
        Arc::new(PathLock {
            state: Mutex::new(LockSet::default()),
        })
    }

    /// True once every set is empty - useful for a clean-shutdown assertion.
    pub fn is_quiescent(&self) -> bool {
        let st = self.state.lock().unwrap();
        st.files_read.is_empty()
            && st.files_write.is_empty()
            && st.dirs_read.is_empty()
            && st.dirs_write.is_empty()
    }

    pub fn rlock_file(self: &Arc<Self>, path: &Path) -> Result<FileReadGuard, StorageError> {
        let mut st = self.state.lock().unwrap();
        let busy = st.files_write.iter().any(|f| f == path)
            || st.dirs_write.iter().any(|d| path.starts_with(d));
        if busy {
            return Err(StorageError::BusyPath(path.display().to_string()));
        }
        st.files_read.push(path.to_path_buf());
        Ok(FileReadGuard {
            lock: self.clone(),
            path: path.to_path_buf(),
        })
    }

    pub fn wlock_file(self: &Arc<Self>, path: &Path) -> Result<FileWriteGuard, StorageError> {
        let mut st = self.state.lock().unwrap();
        let busy = st.files_read.iter().any(|f| f == path)
            || st.dirs_read.iter().any(|d| path.starts_with(d))
            || st.dirs_write.iter().any(|d| path.starts_with(d));
        if busy {
            return Err(StorageError::BusyPath(path.display().to_string()));
        }
        st.files_write.push(path.to_path_buf());
        Ok(FileWriteGuard {
            lock: self.clone(),
            path: path.to_path_buf(),
        })
    }

    pub fn rlock_dir(self: &Arc<Self>, path: &Path) -> Result<DirReadGuard, StorageError> {
        let mut st = self.state.lock().unwrap();
        let busy = st.files_write.iter().any(|f| f.starts_with(path))
            || st.dirs_write.iter().any(|d| d.starts_with(path) || path.starts_with(d));
        if busy {
            return Err(StorageError::BusyPath(path.display().to_string()));
        }
        st.dirs_read.push(path.to_path_buf());
        Ok(DirReadGuard {
            lock: self.clone(),
            path: path.to_path_buf(),
        })
    }

    pub fn wlock_dir(self: &Arc<Self>, path: &Path) -> Result<DirWriteGuard, StorageError> {
        let mut st = self.state.lock().unwrap();
        let busy = st.files_write.iter().any(|f| f.starts_with(path))
            || st.dirs_write.iter().any(|d| d.starts_with(path) || path.starts_with(d))
            || st.files_read.iter().any(|f| f.starts_with(path))
            || st.dirs_read.iter().any(|d| d.starts_with(path) || path.starts_with(d));
        if busy {
            return Err(StorageError::BusyPath(path.display().to_string()));
        }
        st.dirs_write.push(path.to_path_buf());
        Ok(DirWriteGuard {
            lock: self.clone(),
            path: path.to_path_buf(),
        })
    }
}

macro_rules! guard {
    ($name:ident, $field:ident) => {
        pub struct $name {
            lock: Arc<PathLock>,
            path: PathBuf,
        }

        impl Drop for $name {
            fn drop(&mut self) {
                let mut st = self.lock.state.lock().unwrap();
                remove_one(&mut st.$field, &self.path);
            }
        }
    };
}

guard!(FileReadGuard, files_read);
guard!(FileWriteGuard, files_write);
guard!(DirReadGuard, dirs_read);
guard!(DirWriteGuard, dirs_write);
