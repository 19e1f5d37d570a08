//! Lockfile-based workspace lock

use crate::error::{OmniError, OmniResult};
use crate::lock::Lock;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// A lock held by exclusively creating a file in the workspace cache
/// directory
pub struct LocalLock {
    path: PathBuf,
}

impl LocalLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The conventional location inside a workspace
    pub fn in_workspace(workspace_root: &Path) -> Self {
        Self::new(workspace_root.join(".omni/cache/lock"))
    }
}

#[async_trait]
impl Lock for LocalLock {
    async fn lock(&self) -> OmniResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| OmniError::LockBackend(format!("creating {parent:?}: {e}")))?;
        }

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(OmniError::LockAlreadyHeld),
            Err(e) => Err(OmniError::LockBackend(format!(
                "creating lock file {:?}: {e}",
                self.path
            ))),
        }
    }

    async fn unlock(&self) -> OmniResult<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(OmniError::LockNotHeld),
            Err(e) => Err(OmniError::LockBackend(format!(
                "removing lock file {:?}: {e}",
                self.path
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn lock_creates_the_lock_file() {
        let tmp = TempDir::new().unwrap();
        let lock = LocalLock::in_workspace(tmp.path());

        lock.lock().await.unwrap();
        assert!(tmp.path().join(".omni/cache/lock").exists());
    }

    #[tokio::test]
    async fn second_lock_fails_already_held() {
        let tmp = TempDir::new().unwrap();
        let first = LocalLock::in_workspace(tmp.path());
        let second = LocalLock::in_workspace(tmp.path());

        first.lock().await.unwrap();
        let err = second.lock().await.unwrap_err();
        assert!(matches!(err, OmniError::LockAlreadyHeld));
    }

    #[tokio::test]
    async fn unlock_removes_the_lock_file() {
        let tmp = TempDir::new().unwrap();
        let lock = LocalLock::in_workspace(tmp.path());

        lock.lock().await.unwrap();
        lock.unlock().await.unwrap();
        assert!(!tmp.path().join(".omni/cache/lock").exists());
    }

    #[tokio::test]
    async fn unlock_without_lock_fails_not_held() {
        let tmp = TempDir::new().unwrap();
        let lock = LocalLock::in_workspace(tmp.path());

        let err = lock.unlock().await.unwrap_err();
        assert!(matches!(err, OmniError::LockNotHeld));
    }

    #[tokio::test]
    async fn lock_after_unlock_succeeds() {
        let tmp = TempDir::new().unwrap();
        let lock = LocalLock::in_workspace(tmp.path());

        lock.lock().await.unwrap();
        lock.unlock().await.unwrap();
        lock.lock().await.unwrap();
    }
}
