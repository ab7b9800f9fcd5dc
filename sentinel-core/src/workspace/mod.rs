//! File operations confined to one sandbox.
//!
//! Every relative path is resolved through the shared path guard before it
//! touches the filesystem; [`FileStore`] never joins paths on its own.

mod tree;

use std::io;
use std::path::PathBuf;

use sentinel_commons::SandboxPaths;
use tokio::task;
use tracing::debug;

use crate::error::{Result, SentinelError};
use crate::sandbox::SandboxRoot;
use crate::utils::write_atomic;

pub use tree::FileNode;

#[derive(Debug, Clone)]
pub struct FileStore {
    root: SandboxRoot,
}

impl FileStore {
    pub fn new(root: SandboxRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &SandboxRoot {
        &self.root
    }

    /// Canonical absolute path for `path` inside the sandbox.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        Ok(self.root.resolve_within(path)?)
    }

    /// Root-relative POSIX form of a path inside the sandbox.
    pub fn display(&self, absolute: &std::path::Path) -> String {
        self.root.display_relative(absolute)
    }

    /// Recursive listing: directories first, then alphabetical.
    pub async fn list(&self) -> Result<Vec<FileNode>> {
        let root = self.root.path().to_path_buf();
        let listed = task::spawn_blocking({
            let root = root.clone();
            move || tree::build_tree(&root)
        })
        .await
        .map_err(|error| SentinelError::io("list", &root, io::Error::other(error)))?;
        listed.map_err(|source| SentinelError::io("list", root, source))
    }

    pub async fn read(&self, path: &str) -> Result<String> {
        let resolved = self.resolve(path)?;
        self.ensure_file(path, &resolved).await?;
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|source| SentinelError::io("read", resolved, source))
    }

    /// Atomically replace (or create) `path` with `content`, creating parent
    /// directories. Returns the number of bytes written.
    pub async fn write(&self, path: &str, content: &str) -> Result<usize> {
        let resolved = self.resolve(path)?;
        if tokio::fs::metadata(&resolved)
            .await
            .is_ok_and(|metadata| metadata.is_dir())
        {
            return Err(SentinelError::NotAFile(path.to_string()));
        }

        let bytes = content.as_bytes().to_vec();
        let len = bytes.len();
        let target = resolved.clone();
        task::spawn_blocking(move || -> io::Result<()> {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            write_atomic(&target, &bytes)
        })
        .await
        .map_err(|error| SentinelError::io("write", &resolved, io::Error::other(error)))?
        .map_err(|source| SentinelError::io("write", &resolved, source))?;

        debug!(target: "sentinel.sandbox", path = %path, bytes = len, "wrote file");
        Ok(len)
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        let resolved = self.resolve(path)?;
        self.ensure_file(path, &resolved).await?;
        tokio::fs::remove_file(&resolved)
            .await
            .map_err(|source| SentinelError::io("remove", resolved, source))?;
        debug!(target: "sentinel.sandbox", path = %path, "removed file");
        Ok(())
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        let resolved = self.resolve(path)?;
        tokio::fs::try_exists(&resolved)
            .await
            .map_err(|source| SentinelError::io("stat", resolved, source))
    }

    pub async fn is_file(&self, path: &str) -> Result<bool> {
        let resolved = self.resolve(path)?;
        match tokio::fs::metadata(&resolved).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SentinelError::io("stat", resolved, source)),
        }
    }

    async fn ensure_file(&self, requested: &str, resolved: &std::path::Path) -> Result<()> {
        match tokio::fs::metadata(resolved).await {
            Ok(metadata) if metadata.is_dir() => Err(SentinelError::NotAFile(requested.to_string())),
            Ok(_) => Ok(()),
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                Err(SentinelError::NotFound(requested.to_string()))
            }
            Err(source) => Err(SentinelError::io("stat", resolved, source)),
        }
    }
}
