//! Confines client-supplied paths to a data root.
//!
//! `resolve` joins and lexically normalizes a client path onto the root,
//! rejecting anything that walks above it. `resolve_nonexistent_root` walks
//! *up* from an already-resolved real path to find the shallowest directory
//! in a to-be-created chain that doesn't exist yet (or the path itself, if
//! it already exists) - this is the value Storage needs to know which lock
//! to take when materializing missing intermediate directories.

use std::path::{Component, Path, PathBuf};

use crate::error::StorageError;

#[derive(Clone, Debug)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: PathBuf) -> PathResolver {
        PathResolver { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins `client_path` onto the root and normalizes it, rejecting any
    /// result that escapes the root.
    pub fn resolve(&self, client_path: &str) -> Result<PathBuf, StorageError> {
        let trimmed = client_path.trim_matches('/');
        let joined = self.root.join(trimmed);
        let real = lexically_normalize(&joined);

        if !real.starts_with(&self.root) {
            return Err(StorageError::DangerousPath(client_path.to_string()));
        }
        Ok(real)
    }

    /// Walks up the parent chain of an already-resolved real `path` while
    /// its parent does not exist on disk, stopping as soon as a parent does.
    /// Ported directly from the original `Storage.resolve_nonexistent_root`:
    /// if `path`'s own parent already exists, `path` is returned unchanged
    /// (Storage's caller then finds it exists and locks the leaf instead);
    /// otherwise this returns the shallowest missing directory in the chain,
    /// which is the directory that must be write-locked to safely create
    /// everything below it.
    pub fn resolve_nonexistent_root(&self, path: &Path) -> Result<PathBuf, StorageError> {
        let mut path = path.to_path_buf();
        let mut parent = parent_or_self(&path);

        while !parent.exists() {
            if path.as_os_str().len() <= self.root.as_os_str().len() {
                return Err(StorageError::DangerousPath(path.display().to_string()));
            }
            path = parent;
            parent = parent_or_self(&path);
        }

        Ok(path)
    }

    /// Strips the root prefix from a real path, leaving the client-visible
    /// path (with its leading separator).
    pub fn trim_root(&self, real_path: &Path) -> String {
        let root_str = self.root.to_string_lossy();
        let real_str = real_path.to_string_lossy();
        match real_str.strip_prefix(root_str.as_ref()) {
            Some(rest) if !rest.is_empty() => rest.to_string(),
            _ => "/".to_string(),
        }
    }
}

fn parent_or_self(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf())
}

fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => out.push(component.as_os_str()),
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
