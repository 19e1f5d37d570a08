//! Filesystem transport backed by the workspace cache directory

use crate::error::{OmniError, OmniResult};
use crate::transport::Transport;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Stores cache assets under a workspace-scoped directory
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The conventional location inside a workspace
    pub fn in_workspace(workspace_root: &Path) -> Self {
        Self::new(workspace_root.join(".omni/cache"))
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn read(&self, key: &str) -> OmniResult<Vec<u8>> {
        let path = self.root.join(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(OmniError::CacheMissing(key.to_string()))
            }
            Err(e) => Err(OmniError::cache_io(format!("reading cache asset {key:?}"), e)),
        }
    }

    async fn write(&self, key: &str, contents: Vec<u8>) -> OmniResult<()> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| OmniError::cache_io(format!("creating directory {parent:?}"), e))?;
        }

        // Write to a sibling temp file and rename so a concurrent
        // reader sees either the old asset or the new one, never a
        // partial write.
        let tmp = PathBuf::from(format!("{}.tmp", path.display()));
        fs::write(&tmp, contents)
            .await
            .map_err(|e| OmniError::cache_io(format!("writing cache asset {key:?}"), e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| OmniError::cache_io(format!("publishing cache asset {key:?}"), e))
    }
}
