//! Cache validation and cached-result reads
//!
//! The reader decides whether a node may skip execution. A node is
//! clean only when the workspace fingerprint, its target fingerprint,
//! and every one of its prerequisites are clean; any miss is recorded
//! so the writer knows which bundles to republish.

use crate::cache::map::{ConcurrentMap, NestedConcurrentMap};
use crate::cache::{archive, path, CacheDirs, Hasher, TaskResult, WORKSPACE_KEY};
use crate::config::TargetConfig;
use crate::error::{OmniError, OmniResult};
use crate::graph::Node;
use crate::transport::Transport;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::debug;

/// A fingerprint hash set loaded from the transport, remembering
/// whether the asset existed at all
struct StoredFingerprint {
    hashes: ConcurrentMap<()>,
    missing: bool,
}

impl StoredFingerprint {
    fn loaded(hashes: ConcurrentMap<()>) -> Self {
        Self {
            hashes,
            missing: false,
        }
    }

    fn missing() -> Self {
        Self {
            hashes: ConcurrentMap::new(),
            missing: true,
        }
    }

    /// The cleanliness decision for one candidate path list:
    /// - asset missing, no candidates: nothing to verify against, dirty
    /// - asset missing, candidates: dirty
    /// - asset present, no candidates: vacuously clean
    /// - both present: clean iff every hash is stored
    fn check(&self, hasher: &Hasher, paths: &[String]) -> OmniResult<bool> {
        if paths.is_empty() {
            return Ok(!self.missing);
        }
        if self.missing {
            return Ok(false);
        }

        let hashes = hasher.hash(paths)?;
        Ok(self.hashes.contains_all(&hashes))
    }
}

/// Validates nodes against the previous run's fingerprints and serves
/// cached results out of the unpacked bundles
pub struct CacheReader {
    transport: Arc<dyn Transport>,
    pub(crate) target_configs: HashMap<String, TargetConfig>,
    /// Cleaned directory list from the workspace config
    pub(crate) targets: Vec<String>,
    root: PathBuf,
    pub(crate) hasher: Hasher,
    prev_dir: PathBuf,
    /// Target dir to the accumulated output globs of every validated
    /// node in that target
    pub(crate) outputs: ConcurrentMap<Vec<String>>,
    /// Target dir to the set of task names whose cache was invalid
    pub(crate) invalid_nodes: NestedConcurrentMap<()>,
    work_cache: OnceCell<StoredFingerprint>,
    target_caches: Mutex<HashMap<String, Arc<OnceCell<Arc<StoredFingerprint>>>>>,
    /// Sticky: set on the first workspace miss, never cleared
    work_invalid: AtomicBool,
    no_cache: bool,
}

impl CacheReader {
    pub fn new(
        transport: Arc<dyn Transport>,
        target_configs: HashMap<String, TargetConfig>,
        targets: Vec<String>,
        root: impl Into<PathBuf>,
        dirs: &CacheDirs,
        no_cache: bool,
    ) -> Self {
        let root = root.into();
        Self {
            transport,
            target_configs,
            targets,
            hasher: Hasher::new(root.clone()),
            root,
            prev_dir: dirs.prev.clone(),
            outputs: ConcurrentMap::new(),
            invalid_nodes: NestedConcurrentMap::new(),
            work_cache: OnceCell::new(),
            target_caches: Mutex::new(HashMap::new()),
            work_invalid: AtomicBool::new(false),
            no_cache,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn prev_dir(&self) -> &Path {
        &self.prev_dir
    }

    /// True once any node has observed the workspace fingerprint as
    /// stale. Racy reads are fine: the flag only ever goes false to
    /// true, and a stale false merely costs a redundant verification.
    pub fn is_work_invalid(&self) -> bool {
        self.work_invalid.load(Ordering::Acquire)
    }

    /// Decide whether `node` may be served from cache. Records the
    /// node's output globs either way, and on a miss records the node
    /// as invalid so dependents and the writer see it.
    pub async fn validate(&self, node: &Node, deps: &HashSet<String>) -> OmniResult<bool> {
        self.outputs.append(&node.dir, &node.pipeline.outputs);

        let verdict = self.validate_all(node, deps).await;
        if !matches!(verdict, Ok(true)) {
            self.invalid_nodes
                .get_or_insert(&node.dir)
                .put(node.name.clone(), ());
        }

        verdict
    }

    async fn validate_all(&self, node: &Node, deps: &HashSet<String>) -> OmniResult<bool> {
        if self.no_cache || self.is_work_invalid() || self.has_invalid_dependency(deps) {
            return Ok(false);
        }

        if !self.validate_workspace(&node.dir).await? {
            self.work_invalid.store(true, Ordering::Release);
            return Ok(false);
        }

        self.validate_target(node).await
    }

    fn has_invalid_dependency(&self, deps: &HashSet<String>) -> bool {
        deps.iter().any(|id| {
            let Some((dir, name)) = id.rsplit_once(':') else {
                return false;
            };
            self.invalid_nodes
                .get(dir)
                .is_some_and(|names| names.get(name).is_some())
        })
    }

    async fn validate_workspace(&self, dir: &str) -> OmniResult<bool> {
        let assets = self
            .target_configs
            .get(dir)
            .map(|cfg| cfg.workspace_assets.as_slice())
            .unwrap_or_default();
        let paths = path::workspace_paths(&self.root, assets, &self.targets)?;

        let stored = self.workspace_fingerprint().await?;
        stored.check(&self.hasher, &paths)
    }

    /// Load the workspace fingerprint at most once per run
    async fn workspace_fingerprint(&self) -> OmniResult<&StoredFingerprint> {
        self.work_cache
            .get_or_try_init(|| async {
                match self.transport.read(WORKSPACE_KEY).await {
                    Ok(bytes) => {
                        let hashes = ConcurrentMap::new();
                        hashes.load_hash_set(&bytes)?;
                        debug!("loaded workspace fingerprint ({} hashes)", hashes.len());
                        Ok(StoredFingerprint::loaded(hashes))
                    }
                    Err(err) if err.is_missing() => {
                        debug!("no workspace fingerprint published yet");
                        Ok(StoredFingerprint::missing())
                    }
                    Err(err) => Err(err),
                }
            })
            .await
    }

    async fn validate_target(&self, node: &Node) -> OmniResult<bool> {
        let paths = path::target_paths(
            &self.root,
            &node.dir,
            &node.pipeline.includes,
            &node.pipeline.excludes,
        )?;

        let stored = self.target_fingerprint(&node.dir).await?;
        stored.check(&self.hasher, &paths)
    }

    /// Load a target's fingerprint at most once per run; the first
    /// caller unpacks the bundle, later callers wait for the loaded set
    async fn target_fingerprint(&self, dir: &str) -> OmniResult<Arc<StoredFingerprint>> {
        let cell = self
            .target_caches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(dir.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let stored = cell
            .get_or_try_init(|| async { self.load_target_fingerprint(dir).await.map(Arc::new) })
            .await?;

        Ok(stored.clone())
    }

    async fn load_target_fingerprint(&self, dir: &str) -> OmniResult<StoredFingerprint> {
        let key = format!("{dir}-meta.tar.zst");
        let bytes = match self.transport.read(&key).await {
            Ok(bytes) => bytes,
            Err(err) if err.is_missing() => {
                debug!("no cache bundle published for {dir}");
                return Ok(StoredFingerprint::missing());
            }
            Err(err) => return Err(err),
        };

        let dst = self.prev_dir.join(dir);
        fs::create_dir_all(&dst)
            .map_err(|e| OmniError::cache_io(format!("creating cache directory {dst:?}"), e))?;
        archive::unpack(&bytes, &dst)?;
        debug!("unpacked cache bundle for {dir}");

        // A bundle without inputs.json is corrupt, not merely absent
        let inputs_path = dst.join("inputs.json");
        let inputs = fs::read(&inputs_path)
            .map_err(|e| OmniError::cache_io(format!("reading cache artifact {inputs_path:?}"), e))?;

        let hashes = ConcurrentMap::new();
        hashes.load_hash_set(&inputs)?;
        Ok(StoredFingerprint::loaded(hashes))
    }

    /// Read the cached result for a task out of its unpacked bundle
    pub fn get_cached_result(&self, dir: &str, name: &str) -> OmniResult<TaskResult> {
        let path = self
            .prev_dir
            .join(dir)
            .join("results")
            .join(format!("{name}.json"));

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(OmniError::ResultMissing {
                    id: format!("{dir}:{name}"),
                })
            }
            Err(e) => {
                return Err(OmniError::cache_io(
                    format!("reading cached result {path:?}"),
                    e,
                ))
            }
        };

        Ok(serde_json::from_slice(&bytes)?)
    }
}
