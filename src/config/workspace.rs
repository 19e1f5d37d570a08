//! Workspace configuration (`omni-workspace.yaml`)

use crate::error::{OmniError, OmniResult};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Root workspace configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Workspace name, used to scope remote cache keys and the lock
    pub name: String,

    /// Target directories relative to the workspace root
    pub targets: Vec<String>,

    /// Remote cache settings
    pub remote_cache: RemoteCacheConfig,
}

/// Remote cache settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteCacheConfig {
    /// Use the remote backend by default
    pub enabled: bool,

    /// Object store bucket for cache assets
    pub bucket: String,

    /// Coordination table for the workspace lock
    pub table: String,

    /// Backend region
    pub region: String,
}

impl WorkspaceConfig {
    /// Load the workspace config from `root`, trying `.yaml` then `.yml`
    pub fn load(root: &Path) -> OmniResult<Self> {
        let mut path = root.join("omni-workspace.yaml");
        if !path.exists() {
            path = root.join("omni-workspace.yml");
        }

        let raw = fs::read_to_string(&path).map_err(|e| OmniError::ConfigRead {
            path: path.clone(),
            source: e,
        })?;

        let cfg: Self =
            serde_yaml::from_str(&raw).map_err(|e| OmniError::ConfigParse { path, source: e })?;
        cfg.validate()?;

        Ok(cfg)
    }

    fn validate(&self) -> OmniResult<()> {
        if self.name.is_empty() {
            return Err(OmniError::ConfigInvalid(
                "workspace name is not defined".to_string(),
            ));
        }
        if self.remote_cache.enabled {
            self.validate_remote()?;
        }
        Ok(())
    }

    /// Check that the remote cache settings are usable
    pub fn validate_remote(&self) -> OmniResult<()> {
        if self.remote_cache.bucket.is_empty() {
            return Err(OmniError::ConfigInvalid(
                "bucket name is not defined in workspace config".to_string(),
            ));
        }
        if self.remote_cache.table.is_empty() {
            return Err(OmniError::ConfigInvalid(
                "table name is not defined in workspace config".to_string(),
            ));
        }
        Ok(())
    }
}
