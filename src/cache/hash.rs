//! Memoized file hashing for cache fingerprints
//!
//! Each file contributes `SHA-256(path bytes || file contents)`. The
//! path participates in the digest so renaming a file invalidates the
//! fingerprint even when its contents are unchanged.

use crate::cache::map::ConcurrentMap;
use crate::error::{OmniError, OmniResult};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Stateful hasher that hashes each path at most once per run.
///
/// Paths are workspace-relative; the hasher opens them against its
/// root. A path raced by two workers may be computed twice, but the
/// memoized value is identical either way.
pub struct Hasher {
    root: PathBuf,
    memo: ConcurrentMap<String>,
}

impl Hasher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            memo: ConcurrentMap::new(),
        }
    }

    /// Hash every path, returning digests in input order
    pub fn hash(&self, paths: &[String]) -> OmniResult<Vec<String>> {
        let mut hashes = Vec::with_capacity(paths.len());

        for path in paths {
            if let Some(hash) = self.memo.get(path) {
                hashes.push(hash);
                continue;
            }

            let hash = self.compute(path)?;
            self.memo.put(path.clone(), hash.clone());
            hashes.push(hash);
        }

        Ok(hashes)
    }

    fn compute(&self, path: &str) -> OmniResult<String> {
        let file = File::open(self.root.join(path)).map_err(|e| OmniError::HashIo {
            path: Path::new(path).to_path_buf(),
            source: e,
        })?;

        let mut digest = Sha256::new();
        digest.update(path.as_bytes());

        let mut reader = io::BufReader::new(file);
        io::copy(&mut reader, &mut digest).map_err(|e| OmniError::HashIo {
            path: Path::new(path).to_path_buf(),
            source: e,
        })?;

        Ok(hex::encode(digest.finalize()))
    }
}
