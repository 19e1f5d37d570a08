//! Coordination-table workspace lock for the remote cache
//!
//! One item per workspace, keyed by `ProjectName`, with a boolean
//! `LockAcquired` attribute. Both transitions are conditional writes so
//! two processes racing for the lock cannot both win.

use crate::config::RemoteCacheConfig;
use crate::error::{OmniError, OmniResult};
use crate::lock::Lock;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;

const KEY_ATTRIBUTE: &str = "ProjectName";
const LOCK_ATTRIBUTE: &str = "LockAcquired";

/// A lock recorded as a conditional row in a coordination table
pub struct RemoteLock {
    client: Client,
    table: String,
    workspace: String,
}

impl RemoteLock {
    /// Build a client from the workspace's remote cache settings
    pub async fn connect(workspace: &str, cfg: &RemoteCacheConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if !cfg.region.is_empty() {
            loader = loader.region(Region::new(cfg.region.clone()));
        }
        let sdk_config = loader.load().await;

        Self {
            client: Client::new(&sdk_config),
            table: cfg.table.clone(),
            workspace: workspace.to_string(),
        }
    }

    async fn transition(
        &self,
        condition: &str,
        to: bool,
        conflict: OmniError,
    ) -> OmniResult<()> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table)
            .key(KEY_ATTRIBUTE, AttributeValue::S(self.workspace.clone()))
            .update_expression(format!("SET {LOCK_ATTRIBUTE} = :next"))
            .condition_expression(condition)
            .expression_attribute_values(":next", AttributeValue::Bool(to))
            .expression_attribute_values(":current", AttributeValue::Bool(!to))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Err(conflict)
            }
            Err(e) => Err(OmniError::LockBackend(format!(
                "updating lock for {:?}: {e}",
                self.workspace
            ))),
        }
    }
}

#[async_trait]
impl Lock for RemoteLock {
    async fn lock(&self) -> OmniResult<()> {
        self.transition(
            &format!("attribute_not_exists({LOCK_ATTRIBUTE}) OR {LOCK_ATTRIBUTE} = :current"),
            true,
            OmniError::LockAlreadyHeld,
        )
        .await
    }

    async fn unlock(&self) -> OmniResult<()> {
        self.transition(
            &format!("{LOCK_ATTRIBUTE} = :current"),
            false,
            OmniError::LockNotHeld,
        )
        .await
    }
}
