//! User-facing configuration for Omni
//!
//! A workspace is described by `omni-workspace.yaml` at its root and an
//! `omni-target.yaml` in each target directory.

pub mod target;
pub mod workspace;

pub use target::{PipelineConfig, TargetConfig};
pub use workspace::{RemoteCacheConfig, WorkspaceConfig};

use crate::error::OmniResult;
use std::collections::HashMap;
use std::path::{Component, Path};
use tracing::debug;

/// Normalize a config-supplied directory path to a canonical relative
/// form (`./foo/` and `foo` both become `foo`)
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    for comp in Path::new(path).components() {
        match comp {
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                if parts.last().is_some_and(|p| p != "..") {
                    parts.pop();
                } else {
                    parts.push("..".to_string());
                }
            }
            Component::Normal(c) => parts.push(c.to_string_lossy().into_owned()),
        }
    }

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Load target configs for a run, keyed by cleaned directory path.
///
/// Without a filter, every workspace target is loaded. With one, the
/// filtered target and its transitive `dependencies` are loaded so that
/// dependency nodes can still be materialized.
pub fn load_target_configs(
    root: &Path,
    workspace: &WorkspaceConfig,
    filter: Option<&str>,
) -> OmniResult<HashMap<String, TargetConfig>> {
    let mut configs = HashMap::new();

    match filter {
        None => {
            for dir in &workspace.targets {
                let key = clean_path(dir);
                let cfg = TargetConfig::load(&root.join(&key))?;
                configs.insert(key, cfg);
            }
        }
        Some(dir) => load_dependent_configs(root, dir, &mut configs)?,
    }

    debug!("loaded {} target config(s)", configs.len());
    Ok(configs)
}

fn load_dependent_configs(
    root: &Path,
    dir: &str,
    configs: &mut HashMap<String, TargetConfig>,
) -> OmniResult<()> {
    let key = clean_path(dir);
    if configs.contains_key(&key) {
        return Ok(());
    }

    let cfg = TargetConfig::load(&root.join(&key))?;
    let dependencies = cfg.dependencies.clone();
    configs.insert(key, cfg);

    for dep in dependencies {
        load_dependent_configs(root, &dep, configs)?;
    }

    Ok(())
}
