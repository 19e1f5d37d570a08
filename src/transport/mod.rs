//! Transport abstraction over cache asset storage
//!
//! A transport moves whole cache assets by key. The backends are the
//! local filesystem and an S3-compatible object store; the cache layers
//! never know which one they talk to.

pub mod local;
pub mod remote;

pub use local::LocalTransport;
pub use remote::RemoteTransport;

use crate::error::OmniResult;
use async_trait::async_trait;

/// Reads and writes cache assets by key.
///
/// `read` distinguishes an absent asset (`OmniError::CacheMissing`)
/// from every other failure. `write` publishes all bytes or leaves the
/// destination unchanged; a reader never observes a partial asset.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn read(&self, key: &str) -> OmniResult<Vec<u8>>;

    async fn write(&self, key: &str, contents: Vec<u8>) -> OmniResult<()>;
}
