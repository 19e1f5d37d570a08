//! Content-addressed cache for task pipelines
//!
//! Persisted layout, per workspace:
//!
//! - `workspace.json`: JSON object whose keys are the hashes of
//!   workspace asset inputs (values are empty objects)
//! - `<dir>-meta.tar.zst`: bundle of all cache assets for one target
//!   - `inputs.json`: same hash-set shape, covering target inputs
//!   - `outputs/<rel-path>`: files produced by the target's tasks
//!   - `results/<task>.json`: captured logs and pass/fail status
//!
//! Reading: the first validation that needs a target's fingerprints
//! unpacks its bundle into the previous-run temp directory and loads
//! `inputs.json`. Cached results and outputs are served from that
//! unpacked tree.
//!
//! Writing: task results are written into the next-run temp directory
//! as they arrive. Once the graph drains, bundles for invalidated
//! targets are packed from there and published through the transport,
//! and cached outputs are copied back into the workspace.

pub mod archive;
pub mod hash;
pub mod map;
pub mod path;
pub mod reader;
pub mod writer;

pub use hash::Hasher;
pub use map::{ConcurrentMap, NestedConcurrentMap};
pub use reader::CacheReader;
pub use writer::CacheWriter;

use crate::error::{OmniError, OmniResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Transport key of the workspace fingerprint
pub const WORKSPACE_KEY: &str = "workspace.json";

/// The persisted outcome of one task execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Merged stdout/stderr, trailing whitespace trimmed
    pub logs: String,

    /// True when the command exited non-zero
    pub failed: bool,
}

impl TaskResult {
    pub fn new(logs: impl Into<String>, failed: bool) -> Self {
        Self {
            logs: logs.into(),
            failed,
        }
    }
}

/// Temporary directories backing one run of the cache.
///
/// `prev` receives unpacked bundles from the previous run; `next`
/// accumulates the artifacts of this run until finalize packs them.
/// Both are wiped at creation so leftovers from an interrupted run are
/// never trusted.
pub struct CacheDirs {
    pub prev: PathBuf,
    pub next: PathBuf,
}

impl CacheDirs {
    /// Create the run directories under the system temp dir
    pub fn create() -> OmniResult<Self> {
        Self::at(&env::temp_dir())
    }

    /// Create the run directories under an explicit base
    pub fn at(base: &Path) -> OmniResult<Self> {
        let prev = base.join("omni-prev-cache");
        let next = base.join("omni-next-cache");

        for dir in [&prev, &next] {
            if dir.exists() {
                fs::remove_dir_all(dir).map_err(|e| {
                    OmniError::cache_io(format!("clearing cache directory {dir:?}"), e)
                })?;
            }
            fs::create_dir_all(dir)
                .map_err(|e| OmniError::cache_io(format!("creating cache directory {dir:?}"), e))?;
        }

        Ok(Self { prev, next })
    }
}
