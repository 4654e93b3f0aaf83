//! Composes `PathLock` and `PathResolver` with actual filesystem syscalls.
//!
//! Every mutating operation follows the same two-phase shape: a short probe
//! phase takes a read lock on the operation's own leaf path(s) to compute
//! which ancestor (if any) needs to be created, then a commit phase takes
//! the real write lock(s), re-checks preconditions, and performs the
//! mutation. The probe lock target varies by operation - a single leaf for
//! `new_file`/`new_dir`, both src and dest for copy/move - and is always
//! released before the commit phase takes its own locks. Filesystem
//! syscalls run on `tokio::task::spawn_blocking` so they never block the
//! async runtime; `PathLock`'s own critical sections stay synchronous and
//! never cross an `.await`.
//!
//! Every operation logs a `debug` event naming itself and its path(s) on
//! entry; `BusyPath`/`DangerousPath` rejections are additionally logged at
//! `warn` through `log_err`, since they mean either contention worth
//! watching or a client probing for escapes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio_stream::{Stream, StreamExt};

use crate::error::{AppError, StorageError};
use crate::path_lock::{DirReadGuard, DirWriteGuard, FileReadGuard, FileWriteGuard, PathLock};
use crate::path_resolver::PathResolver;

#[derive(Serialize, Clone, Debug)]
pub struct DirEntryInfo {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// Either a file or a directory write-lock, held as the "commit" lock for
/// operations whose leaf may be a file but whose ancestor is always a dir.
enum CommitGuard {
    File(#[allow(dead_code)] FileWriteGuard),
    Dir(#[allow(dead_code)] DirWriteGuard),
}

pub struct Storage {
    root: PathBuf,
    resolver: PathResolver,
    locks: Arc<PathLock>,
}

async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

/// Logs `BusyPath`/`DangerousPath` at `warn` before handing the error back
/// to the caller; every other `StorageError` variant is left to the
/// `IntoResponse` impl to report.
fn log_err(operation: &'static str, err: StorageError) -> StorageError {
    match &err {
        StorageError::BusyPath(p) => tracing::warn!(operation, path = %p, "path busy"),
        StorageError::DangerousPath(p) => tracing::warn!(operation, path = %p, "dangerous path rejected"),
        _ => {}
    }
    err
}

impl Storage {
    pub fn new(root: PathBuf) -> Storage {
        Storage {
            root: root.clone(),
            resolver: PathResolver::new(root),
            locks: PathLock::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_quiescent(&self) -> bool {
        self.locks.is_quiescent()
    }

    fn resolve(&self, operation: &'static str, path: &str) -> Result<PathBuf, StorageError> {
        self.resolver.resolve(path).map_err(|e| log_err(operation, e))
    }

    fn require_parent(
        &self,
        operation: &'static str,
        path: &str,
        real_path: &Path,
    ) -> Result<PathBuf, StorageError> {
        real_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| log_err(operation, StorageError::DangerousPath(path.to_string())))
    }

    fn nonexistent_root(&self, operation: &'static str, parent: &Path) -> Result<PathBuf, StorageError> {
        self.resolver
            .resolve_nonexistent_root(parent)
            .map_err(|e| log_err(operation, e))
    }

    // ---- dir operations ----------------------------------------------

    pub async fn list_dir(&self, path: &str) -> Result<Vec<DirEntryInfo>, AppError> {
        tracing::debug!(operation = "list_dir", path, "storage operation");
        let real_path = self.resolve("list_dir", path)?;
        let _g = self.locks.rlock_dir(&real_path).map_err(|e| log_err("list_dir", e))?;

        if !exists(&real_path).await {
            return Err(StorageError::NotFound(path.to_string()).into());
        }
        let meta = tokio::fs::metadata(&real_path).await?;
        if !meta.is_dir() {
            return Err(StorageError::NotADir(path.to_string()).into());
        }

        let resolver = self.resolver.clone();
        let real_path2 = real_path.clone();
        let mut entries = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<DirEntryInfo>> {
            let mut out = Vec::new();
            for entry in std::fs::read_dir(&real_path2)? {
                let entry = entry?;
                let p = entry.path();
                let kind = if p.is_dir() { "d" } else { "f" };
                out.push(DirEntryInfo {
                    path: resolver.trim_root(&p),
                    kind,
                });
            }
            Ok(out)
        })
        .await??;

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    pub async fn new_dir(&self, path: &str) -> Result<(), AppError> {
        tracing::debug!(operation = "new_dir", path, "storage operation");
        let real_path = self.resolve("new_dir", path)?;
        let parent = self.require_parent("new_dir", path, &real_path)?;

        let ancestor = {
            let _probe = self.locks.rlock_dir(&real_path).map_err(|e| log_err("new_dir", e))?;
            self.nonexistent_root("new_dir", &parent)?
        };
        let lock_path = if exists(&ancestor).await {
            real_path.clone()
        } else {
            ancestor
        };
        let _commit = self.locks.wlock_dir(&lock_path).map_err(|e| log_err("new_dir", e))?;

        if exists(&real_path).await {
            return Err(StorageError::AlreadyExists(path.to_string()).into());
        }
        tokio::fs::create_dir_all(&real_path).await?;
        Ok(())
    }

    pub async fn copy_dir(&self, src: &str, dest: &str) -> Result<(), AppError> {
        tracing::debug!(operation = "copy_dir", src, dest, "storage operation");
        let real_src = self.resolve("copy_dir", src)?;
        let real_dest = self.resolve("copy_dir", dest)?;
        if real_src == real_dest {
            return Err(StorageError::SameSrcDest(src.to_string(), dest.to_string()).into());
        }
        let dest_parent = self.require_parent("copy_dir", dest, &real_dest)?;

        let ancestor = {
            let _probe_src = self.locks.rlock_dir(&real_src).map_err(|e| log_err("copy_dir", e))?;
            let _probe_dest = self.locks.rlock_dir(&real_dest).map_err(|e| log_err("copy_dir", e))?;
            self.nonexistent_root("copy_dir", &dest_parent)?
        };

        let _src_guard = self.locks.wlock_dir(&real_src).map_err(|e| log_err("copy_dir", e))?;
        let dest_lock_path = if exists(&ancestor).await {
            real_dest.clone()
        } else {
            ancestor
        };
        let _dest_guard = self.locks.wlock_dir(&dest_lock_path).map_err(|e| log_err("copy_dir", e))?;

        if !exists(&real_src).await {
            return Err(StorageError::NotFound(src.to_string()).into());
        }
        if !tokio::fs::metadata(&real_src).await?.is_dir() {
            return Err(StorageError::NotADir(src.to_string()).into());
        }
        if exists(&real_dest).await {
            return Err(StorageError::AlreadyExists(dest.to_string()).into());
        }

        copy_dir_recursive(real_src, real_dest).await?;
        Ok(())
    }

    pub async fn move_dir(&self, src: &str, dest: &str) -> Result<(), AppError> {
        tracing::debug!(operation = "move_dir", src, dest, "storage operation");
        let real_src = self.resolve("move_dir", src)?;
        let real_dest = self.resolve("move_dir", dest)?;
        if real_src == real_dest {
            return Err(StorageError::SameSrcDest(src.to_string(), dest.to_string()).into());
        }
        let dest_parent = self.require_parent("move_dir", dest, &real_dest)?;

        let ancestor = {
            let _probe_src = self.locks.rlock_dir(&real_src).map_err(|e| log_err("move_dir", e))?;
            let _probe_dest = self.locks.rlock_dir(&real_dest).map_err(|e| log_err("move_dir", e))?;
            self.nonexistent_root("move_dir", &dest_parent)?
        };

        let _src_guard = self.locks.wlock_dir(&real_src).map_err(|e| log_err("move_dir", e))?;
        let dest_lock_path = if exists(&ancestor).await {
            real_dest.clone()
        } else {
            ancestor
        };
        let _dest_guard = self.locks.wlock_dir(&dest_lock_path).map_err(|e| log_err("move_dir", e))?;

        if !exists(&real_src).await {
            return Err(StorageError::NotFound(src.to_string()).into());
        }
        if !tokio::fs::metadata(&real_src).await?.is_dir() {
            return Err(StorageError::NotADir(src.to_string()).into());
        }
        if exists(&real_dest).await {
            return Err(StorageError::AlreadyExists(dest.to_string()).into());
        }

        if let Some(parent) = real_dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&real_src, &real_dest).await?;
        Ok(())
    }

    pub async fn remove_dir(&self, path: &str) -> Result<(), AppError> {
        tracing::debug!(operation = "remove_dir", path, "storage operation");
        let real_path = self.resolve("remove_dir", path)?;
        let _g = self.locks.wlock_dir(&real_path).map_err(|e| log_err("remove_dir", e))?;

        if !exists(&real_path).await {
            return Err(StorageError::NotFound(path.to_string()).into());
        }
        if !tokio::fs::metadata(&real_path).await?.is_dir() {
            return Err(StorageError::NotADir(path.to_string()).into());
        }
        tokio::fs::remove_dir_all(&real_path).await?;
        Ok(())
    }

    // ---- file operations ----------------------------------------------

    pub async fn new_file(&self, path: &str) -> Result<(), AppError> {
        tracing::debug!(operation = "new_file", path, "storage operation");
        let real_path = self.resolve("new_file", path)?;
        let parent = self.require_parent("new_file", path, &real_path)?;

        let ancestor = {
            let _probe = self.locks.rlock_file(&real_path).map_err(|e| log_err("new_file", e))?;
            self.nonexistent_root("new_file", &parent)?
        };
        let _commit = if exists(&ancestor).await {
            CommitGuard::File(self.locks.wlock_file(&real_path).map_err(|e| log_err("new_file", e))?)
        } else {
            CommitGuard::Dir(self.locks.wlock_dir(&ancestor).map_err(|e| log_err("new_file", e))?)
        };

        if exists(&real_path).await {
            return Err(StorageError::AlreadyExists(path.to_string()).into());
        }
        tokio::fs::create_dir_all(&parent).await?;
        tokio::fs::File::create(&real_path).await?;
        Ok(())
    }

    pub async fn copy_file(&self, src: &str, dest: &str) -> Result<(), AppError> {
        tracing::debug!(operation = "copy_file", src, dest, "storage operation");
        let real_src = self.resolve("copy_file", src)?;
        let real_dest = self.resolve("copy_file", dest)?;
        if real_src == real_dest {
            return Err(StorageError::SameSrcDest(src.to_string(), dest.to_string()).into());
        }
        let dest_parent = self.require_parent("copy_file", dest, &real_dest)?;

        let ancestor = {
            let _probe_src = self.locks.rlock_file(&real_src).map_err(|e| log_err("copy_file", e))?;
            let _probe_dest = self.locks.rlock_file(&real_dest).map_err(|e| log_err("copy_file", e))?;
            self.nonexistent_root("copy_file", &dest_parent)?
        };

        let _src_guard = self.locks.rlock_file(&real_src).map_err(|e| log_err("copy_file", e))?;
        let _dest_commit = if exists(&ancestor).await {
            CommitGuard::File(self.locks.wlock_file(&real_dest).map_err(|e| log_err("copy_file", e))?)
        } else {
            CommitGuard::Dir(self.locks.wlock_dir(&ancestor).map_err(|e| log_err("copy_file", e))?)
        };

        if !exists(&real_src).await {
            return Err(StorageError::NotFound(src.to_string()).into());
        }
        if !tokio::fs::metadata(&real_src).await?.is_file() {
            return Err(StorageError::NotAFile(src.to_string()).into());
        }
        if exists(&real_dest).await {
            return Err(StorageError::AlreadyExists(dest.to_string()).into());
        }

        tokio::fs::create_dir_all(&dest_parent).await?;
        tokio::fs::copy(&real_src, &real_dest).await?;
        Ok(())
    }

    pub async fn move_file(&self, src: &str, dest: &str) -> Result<(), AppError> {
        tracing::debug!(operation = "move_file", src, dest, "storage operation");
        let real_src = self.resolve("move_file", src)?;
        let real_dest = self.resolve("move_file", dest)?;
        if real_src == real_dest {
            return Err(StorageError::SameSrcDest(src.to_string(), dest.to_string()).into());
        }
        let dest_parent = self.require_parent("move_file", dest, &real_dest)?;

        let ancestor = {
            let _probe_src = self.locks.rlock_file(&real_src).map_err(|e| log_err("move_file", e))?;
            let _probe_dest = self.locks.rlock_file(&real_dest).map_err(|e| log_err("move_file", e))?;
            self.nonexistent_root("move_file", &dest_parent)?
        };

        let _src_guard = self.locks.wlock_file(&real_src).map_err(|e| log_err("move_file", e))?;
        let _dest_commit = if exists(&ancestor).await {
            CommitGuard::File(self.locks.wlock_file(&real_dest).map_err(|e| log_err("move_file", e))?)
        } else {
            CommitGuard::Dir(self.locks.wlock_dir(&ancestor).map_err(|e| log_err("move_file", e))?)
        };

        if !exists(&real_src).await {
            return Err(StorageError::NotFound(src.to_string()).into());
        }
        if !tokio::fs::metadata(&real_src).await?.is_file() {
            return Err(StorageError::NotAFile(src.to_string()).into());
        }
        if exists(&real_dest).await {
            return Err(StorageError::AlreadyExists(dest.to_string()).into());
        }

        tokio::fs::create_dir_all(&dest_parent).await?;
        tokio::fs::rename(&real_src, &real_dest).await?;
        Ok(())
    }

    pub async fn remove_file(&self, path: &str) -> Result<(), AppError> {
        tracing::debug!(operation = "remove_file", path, "storage operation");
        let real_path = self.resolve("remove_file", path)?;
        let _g = self.locks.wlock_file(&real_path).map_err(|e| log_err("remove_file", e))?;

        if !exists(&real_path).await {
            return Err(StorageError::NotFound(path.to_string()).into());
        }
        if !tokio::fs::metadata(&real_path).await?.is_file() {
            return Err(StorageError::NotAFile(path.to_string()).into());
        }
        tokio::fs::remove_file(&real_path).await?;
        Ok(())
    }

    /// Streams a multipart field's bytes into a brand-new file, using the
    /// same probe/commit locking as `new_file`. On a write failure partway
    /// through, the partially-written file is removed.
    pub async fn save_multipart_file<S, E>(&self, path: &str, mut data: S) -> Result<(), AppError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::error::Error + Send + Sync + 'static,
    {
        tracing::debug!(operation = "save_multipart_file", path, "storage operation");
        let real_path = self.resolve("save_multipart_file", path)?;
        let parent = self.require_parent("save_multipart_file", path, &real_path)?;

        let ancestor = {
            let _probe = self
                .locks
                .rlock_file(&real_path)
                .map_err(|e| log_err("save_multipart_file", e))?;
            self.nonexistent_root("save_multipart_file", &parent)?
        };
        let _commit = if exists(&ancestor).await {
            CommitGuard::File(
                self.locks
                    .wlock_file(&real_path)
                    .map_err(|e| log_err("save_multipart_file", e))?,
            )
        } else {
            CommitGuard::Dir(
                self.locks
                    .wlock_dir(&ancestor)
                    .map_err(|e| log_err("save_multipart_file", e))?,
            )
        };

        if exists(&real_path).await {
            return Err(StorageError::AlreadyExists(path.to_string()).into());
        }
        tokio::fs::create_dir_all(&parent).await?;
        let mut file = tokio::fs::File::create(&real_path).await?;

        let write_result: Result<(), AppError> = async {
            while let Some(chunk) = data.next().await {
                let bytes = chunk.map_err(|e| AppError::internal("axum::extract::multipart::MultipartError", e))?;
                file.write_all(&bytes).await?;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = write_result {
            drop(file);
            let _ = tokio::fs::remove_file(&real_path).await;
            return Err(e);
        }
        Ok(())
    }

    pub async fn open_read_stream(
        &self,
        path: &str,
    ) -> Result<(FileReadGuard, tokio::fs::File, PathBuf), AppError> {
        tracing::debug!(operation = "open_read_stream", path, "storage operation");
        let real_path = self.resolve("open_read_stream", path)?;
        let guard = self
            .locks
            .rlock_file(&real_path)
            .map_err(|e| log_err("open_read_stream", e))?;

        if !exists(&real_path).await {
            return Err(StorageError::NotFound(path.to_string()).into());
        }
        let meta = tokio::fs::metadata(&real_path).await?;
        if !meta.is_file() {
            return Err(StorageError::NotAFile(path.to_string()).into());
        }
        let file = tokio::fs::File::open(&real_path).await?;
        Ok((guard, file, real_path))
    }

    pub async fn open_zip_source(&self, path: &str) -> Result<(DirReadGuard, PathBuf, String), AppError> {
        tracing::debug!(operation = "open_zip_source", path, "storage operation");
        let real_path = self.resolve("open_zip_source", path)?;
        let guard = self
            .locks
            .rlock_dir(&real_path)
            .map_err(|e| log_err("open_zip_source", e))?;

        if !exists(&real_path).await {
            return Err(StorageError::NotFound(path.to_string()).into());
        }
        let meta = tokio::fs::metadata(&real_path).await?;
        if !meta.is_dir() {
            return Err(StorageError::NotADir(path.to_string()).into());
        }
        let filename = real_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        Ok((guard, real_path, filename))
    }
}

async fn copy_dir_recursive(src: PathBuf, dest: PathBuf) -> Result<(), AppError> {
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        for entry in walkdir::WalkDir::new(&src) {
            let entry = entry.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            let rel = entry.path().strip_prefix(&src).unwrap();
            let target = dest.join(rel);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)?;
            } else if entry.file_type().is_file() {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    })
    .await??;
    Ok(())
}
