//! Object storage seam and the on-disk backend.

use crate::errors::BackupError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

type Result<T> = std::result::Result<T, BackupError>;

/// An object in a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Full key
    pub key: String,
    /// Size in bytes
    pub size: u64,
}

/// Flat key/value object storage with `/`-separated keys
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable location, for logs
    fn describe(&self) -> String;

    /// Upload a local file
    async fn put_file(&self, key: &str, path: &Path) -> Result<()>;

    /// Upload bytes
    async fn put_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Download an object into a local file
    async fn get_file(&self, key: &str, dest: &Path) -> Result<()>;

    /// Download an object into memory
    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>>;

    /// Object metadata, `None` when absent
    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>>;

    /// Every object under a prefix, sorted by key
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Delete one object
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Objects stored as files below a directory
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Store rooted at `root`, created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !clean {
            return Err(BackupError::Storage {
                operation: "resolve key".to_string(),
                reason: format!("invalid object key '{}'", key),
            });
        }
        Ok(self.root.join(relative))
    }
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<ObjectInfo>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(root, &path, out)?;
        } else if file_type.is_file() {
            let key = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            out.push(ObjectInfo {
                key,
                size: entry.metadata()?.len(),
            });
        }
    }
    Ok(())
}

fn missing_as_not_found(key: &str, e: std::io::Error) -> BackupError {
    if e.kind() == std::io::ErrorKind::NotFound {
        BackupError::ObjectNotFound(key.to_string())
    } else {
        BackupError::Io(e)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let dest = self.path_for(key)?;
        let src = path.to_path_buf();
        debug!("put {} -> {}", src.display(), dest.display());
        smol::unblock(move || {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&src, &dest).map(|_| ())
        })
        .await?;
        Ok(())
    }

    async fn put_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let dest = self.path_for(key)?;
        smol::unblock(move || {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&dest, bytes)
        })
        .await?;
        Ok(())
    }

    async fn get_file(&self, key: &str, dest: &Path) -> Result<()> {
        let src = self.path_for(key)?;
        let dest = dest.to_path_buf();
        smol::unblock(move || std::fs::copy(&src, &dest).map(|_| ()))
            .await
            .map_err(|e| missing_as_not_found(key, e))
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let src = self.path_for(key)?;
        smol::unblock(move || std::fs::read(&src))
            .await
            .map_err(|e| missing_as_not_found(key, e))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>> {
        let path = self.path_for(key)?;
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(ObjectInfo {
                key: key.to_string(),
                size: meta.len(),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        let mut objects = smol::unblock(move || {
            let mut out = Vec::new();
            if root.is_dir() {
                walk(&root, &root, &mut out)?;
            }
            Ok::<_, std::io::Error>(out)
        })
        .await?;
        objects.retain(|o| o.key.starts_with(&prefix));
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        std::fs::remove_file(&path).map_err(|e| missing_as_not_found(key, e))?;

        // Drop directories the delete left empty, stopping at the root.
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.root || std::fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
        Ok(())
    }
}
