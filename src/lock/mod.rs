//! Workspace-scoped mutual exclusion
//!
//! Exactly one process may touch a workspace's cache at a time. The
//! lock is non-reentrant: acquiring a held lock fails instead of
//! blocking, and releasing an unheld lock is an error.

pub mod local;
pub mod remote;

pub use local::LocalLock;
pub use remote::RemoteLock;

use crate::error::OmniResult;
use async_trait::async_trait;

/// Cross-process mutual exclusion over one workspace's cache
#[async_trait]
pub trait Lock: Send + Sync {
    /// Acquire the lock; fails with `LockAlreadyHeld` when another
    /// process holds it
    async fn lock(&self) -> OmniResult<()>;

    /// Release the lock; fails with `LockNotHeld` when no acquisition
    /// is recorded
    async fn unlock(&self) -> OmniResult<()>;
}
