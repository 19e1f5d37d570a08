//! Cache persistence: task results, bundle publishing, output
//! restoration
//!
//! The writer owns the next-run temp directory and shares the reader's
//! bookkeeping (invalid nodes, output globs, hasher). Finalize runs
//! single-threaded after the graph quiesces, so reading those
//! structures needs no extra locking.

use crate::cache::{archive, path, CacheDirs, CacheReader, TaskResult, WORKSPACE_KEY};
use crate::error::{OmniError, OmniResult};
use crate::transport::Transport;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;
use walkdir::WalkDir;

/// Persists the artifacts of one run and restores cached outputs
pub struct CacheWriter {
    transport: Arc<dyn Transport>,
    reader: Arc<CacheReader>,
    next_dir: PathBuf,
}

impl CacheWriter {
    pub fn new(
        transport: Arc<dyn Transport>,
        reader: Arc<CacheReader>,
        dirs: &CacheDirs,
    ) -> Self {
        Self {
            transport,
            reader,
            next_dir: dirs.next.clone(),
        }
    }

    /// Persist one executed task's result into the next-run tree
    pub fn write_task_result(&self, dir: &str, name: &str, result: &TaskResult) -> OmniResult<()> {
        let path = self
            .next_dir
            .join(dir)
            .join("results")
            .join(format!("{name}.json"));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| OmniError::cache_io(format!("creating directory {parent:?}"), e))?;
        }

        let bytes = serde_json::to_vec(result)?;
        fs::write(&path, bytes)
            .map_err(|e| OmniError::cache_io(format!("writing task result {path:?}"), e))
    }

    /// True when finalize has bundles or the workspace fingerprint to
    /// republish
    pub fn needs_update(&self) -> bool {
        self.reader.is_work_invalid() || !self.reader.invalid_nodes.is_empty()
    }

    /// Republish cache artifacts for everything this run invalidated,
    /// then restore cached outputs into the workspace
    pub async fn finalize(&self) -> OmniResult<()> {
        if !self.needs_update() {
            return Ok(());
        }

        self.update_workspace().await?;

        for (dir, tasks) in self.reader.invalid_nodes.snapshot_keys() {
            self.update_target(&dir, &tasks).await?;
        }

        self.restore_outputs().await
    }

    async fn update_workspace(&self) -> OmniResult<()> {
        if !self.reader.is_work_invalid() {
            return Ok(());
        }

        // Every target's asset patterns feed the shared fingerprint
        let patterns: Vec<String> = self
            .reader
            .target_configs
            .values()
            .flat_map(|cfg| cfg.workspace_assets.iter().cloned())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();

        let paths = path::workspace_paths(self.reader.root(), &patterns, &self.reader.targets)?;
        let hashes = self.reader.hasher.hash(&paths)?;
        debug!("publishing workspace fingerprint ({} hashes)", hashes.len());

        self.transport
            .write(WORKSPACE_KEY, hash_set_json(&hashes)?)
            .await
    }

    async fn update_target(&self, dir: &str, invalid_tasks: &[String]) -> OmniResult<()> {
        let Some(cfg) = self.reader.target_configs.get(dir) else {
            return Ok(());
        };

        // Fingerprint only the invalid tasks' patterns; untouched tasks
        // fall out of the stored set and re-verify on the next run
        let mut includes = BTreeSet::new();
        let mut excludes = BTreeSet::new();
        for task in invalid_tasks {
            if let Some(pipeline) = cfg.pipeline.get(task) {
                includes.extend(pipeline.includes.iter().cloned());
                excludes.extend(pipeline.excludes.iter().cloned());
            }
        }
        let includes: Vec<String> = includes.into_iter().collect();
        let excludes: Vec<String> = excludes.into_iter().collect();

        let paths = path::target_paths(self.reader.root(), dir, &includes, &excludes)?;
        let hashes = self.reader.hasher.hash(&paths)?;

        let bundle_dir = self.next_dir.join(dir);
        fs::create_dir_all(&bundle_dir)
            .map_err(|e| OmniError::cache_io(format!("creating directory {bundle_dir:?}"), e))?;
        fs::write(bundle_dir.join("inputs.json"), hash_set_json(&hashes)?).map_err(|e| {
            OmniError::cache_io(format!("writing inputs.json for {dir:?}"), e)
        })?;

        self.collect_outputs(dir, &bundle_dir)?;

        let bytes = archive::pack(&bundle_dir)?;
        debug!("publishing cache bundle for {dir} ({} bytes)", bytes.len());
        self.transport
            .write(&format!("{dir}-meta.tar.zst"), bytes)
            .await
    }

    /// Copy files matching the target's accumulated output globs into
    /// the bundle's outputs/ tree
    fn collect_outputs(&self, dir: &str, bundle_dir: &Path) -> OmniResult<()> {
        let patterns = self.reader.outputs.get(dir).unwrap_or_default();
        let paths = path::output_paths(self.reader.root(), dir, &patterns)?;

        let prefix = format!("{dir}/");
        for rel in paths {
            let inner = rel.strip_prefix(&prefix).unwrap_or(&rel);
            let src = self.reader.root().join(&rel);
            let dst = bundle_dir.join("outputs").join(inner);
            copy_file(&src, &dst)?;
        }

        Ok(())
    }

    /// Copy cached outputs back into the workspace, one task per
    /// target, concurrently. The first error wins; in-flight copies
    /// still run to completion.
    async fn restore_outputs(&self) -> OmniResult<()> {
        let mut workers = JoinSet::new();

        for dir in self.reader.outputs.keys() {
            let src = self.reader.prev_dir().join(&dir).join("outputs");
            let dst = self.reader.root().join(&dir);
            workers.spawn_blocking(move || restore_directory(&src, &dst));
        }

        let mut first_err = None;
        while let Some(joined) = workers.join_next().await {
            let result = joined
                .unwrap_or_else(|e| Err(OmniError::Internal(format!("restore task failed: {e}"))));
            if let Err(err) = result {
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Serialize hashes as the persisted hash-set shape:
/// `{"<hex>": {}, ...}`
fn hash_set_json(hashes: &[String]) -> OmniResult<Vec<u8>> {
    let map: serde_json::Map<String, serde_json::Value> = hashes
        .iter()
        .map(|hash| (hash.clone(), serde_json::Value::Object(Default::default())))
        .collect();

    Ok(serde_json::to_vec(&serde_json::Value::Object(map))?)
}

fn restore_directory(src: &Path, dst: &Path) -> OmniResult<()> {
    if !src.exists() {
        return Ok(());
    }

    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| OmniError::Walk {
            path: src.to_path_buf(),
            source: e,
        })?;

        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| OmniError::cache_io(format!("creating directory {target:?}"), e))?;
        } else if entry.file_type().is_file() {
            copy_file(entry.path(), &target)?;
        }
    }

    Ok(())
}

fn copy_file(src: &Path, dst: &Path) -> OmniResult<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| OmniError::cache_io(format!("creating directory {parent:?}"), e))?;
    }
    fs::copy(src, dst)
        .map_err(|e| OmniError::cache_io(format!("copying {src:?} to {dst:?}"), e))?;
    Ok(())
}
