//! Object store transport for the shared remote cache
//!
//! Keys are prefixed with the workspace name so one bucket can serve
//! many workspaces. Credentials, region, and endpoint overrides follow
//! the standard AWS discovery chain.

use crate::config::RemoteCacheConfig;
use crate::error::{OmniError, OmniResult};
use crate::transport::Transport;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

/// Stores cache assets in an S3-compatible bucket
pub struct RemoteTransport {
    client: Client,
    bucket: String,
    workspace: String,
}

impl RemoteTransport {
    /// Build a client from the workspace's remote cache settings
    pub async fn connect(workspace: &str, cfg: &RemoteCacheConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if !cfg.region.is_empty() {
            loader = loader.region(Region::new(cfg.region.clone()));
        }
        let sdk_config = loader.load().await;

        Self {
            client: Client::new(&sdk_config),
            bucket: cfg.bucket.clone(),
            workspace: workspace.to_string(),
        }
    }

    fn object_key(&self, key: &str) -> String {
        format!("{}/{}", self.workspace, key)
    }
}

#[async_trait]
impl Transport for RemoteTransport {
    async fn read(&self, key: &str) -> OmniResult<Vec<u8>> {
        let object_key = self.object_key(key);
        debug!("fetching remote cache asset {object_key}");

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    OmniError::CacheMissing(key.to_string())
                } else {
                    OmniError::RemoteCache(format!("failed to fetch {object_key:?}: {e}"))
                }
            })?;

        let bytes = output.body.collect().await.map_err(|e| {
            OmniError::RemoteCache(format!("failed to stream {object_key:?}: {e}"))
        })?;

        Ok(bytes.into_bytes().to_vec())
    }

    async fn write(&self, key: &str, contents: Vec<u8>) -> OmniResult<()> {
        let object_key = self.object_key(key);
        debug!("publishing remote cache asset {object_key}");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(contents))
            .send()
            .await
            .map_err(|e| OmniError::RemoteCache(format!("failed to publish {object_key:?}: {e}")))?;

        Ok(())
    }
}
