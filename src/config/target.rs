//! Target configuration (`omni-target.yaml` in each target directory)

use crate::error::{OmniError, OmniResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Per-target configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TargetConfig {
    /// Other target directories this target depends on
    pub dependencies: Vec<String>,

    /// Globs relative to the workspace root that feed the workspace
    /// fingerprint
    pub workspace_assets: Vec<String>,

    /// Task name to pipeline record
    pub pipeline: HashMap<String, PipelineConfig>,
}

/// A single named task within a target's pipeline
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Shell command to execute
    pub command: String,

    /// Either `task` (sibling in this target) or `^task` (same-named
    /// task in each cross-target dependency)
    pub depends_on: Vec<String>,

    /// Input globs relative to the target directory
    pub includes: Vec<String>,

    /// Globs excluded from the target fingerprint
    pub excludes: Vec<String>,

    /// Output globs relative to the target directory
    pub outputs: Vec<String>,
}

impl TargetConfig {
    /// Load the target config from `dir`, trying `.yaml` then `.yml`
    pub fn load(dir: &Path) -> OmniResult<Self> {
        let mut path = dir.join("omni-target.yaml");
        if !path.exists() {
            path = dir.join("omni-target.yml");
        }

        let raw = fs::read_to_string(&path).map_err(|e| OmniError::ConfigRead {
            path: path.clone(),
            source: e,
        })?;

        serde_yaml::from_str(&raw).map_err(|e| OmniError::ConfigParse { path, source: e })
    }
}
