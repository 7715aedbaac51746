//! Filesystem object store
//!
//! Objects live as plain files under a root directory, with the object key
//! used as a relative path. Keys are `{user_id}/{blob_id}`, so each user
//! gets one subdirectory. Writes go through a temp file plus rename so a
//! crashed upload never leaves a readable partial object.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;

use vaultsync_core::ports::ObjectStore;

/// Object store backed by a local directory
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Creates a store rooted at `root`, creating the directory if needed
    ///
    /// # Errors
    /// Returns an error when the root directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create object root {}", root.display()))?;
        Ok(Self { root })
    }

    /// Resolves a key to a path under the root, rejecting traversal
    fn resolve(&self, key: &str) -> anyhow::Result<PathBuf> {
        if key.is_empty() {
            bail!("object key cannot be empty");
        }
        let path = Path::new(key);
        if path.is_absolute()
            || path
                .components()
                .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            bail!("object key escapes the store root: {key}");
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, data: &[u8], _content_type: Option<&str>)
        -> anyhow::Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, data)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to finalize {}", path.display()))?;

        tracing::debug!(key, size = data.len(), "object written");
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }
}
