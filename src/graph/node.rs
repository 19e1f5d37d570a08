//! Task instances in the dependency graph

use crate::config::PipelineConfig;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An instantiated (target directory, task name) pair.
///
/// The indegree counter is the only state that mutates during
/// execution: it starts at the number of distinct prerequisites and is
/// decremented as they complete. The node becomes ready at zero.
pub struct Node {
    pub id: String,
    pub name: String,
    pub dir: String,
    pub pipeline: PipelineConfig,
    indegree: AtomicUsize,
}

impl Node {
    pub fn new(name: &str, dir: &str, pipeline: PipelineConfig) -> Self {
        Self {
            id: format!("{dir}:{name}"),
            name: name.to_string(),
            dir: dir.to_string(),
            pipeline,
            indegree: AtomicUsize::new(0),
        }
    }

    pub fn indegree(&self) -> usize {
        self.indegree.load(Ordering::Acquire)
    }

    pub(crate) fn increment_indegree(&self) {
        self.indegree.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement and return the new value; the decrement and the
    /// reached-zero check are a single atomic operation
    pub(crate) fn decrement_indegree(&self) -> usize {
        self.indegree.fetch_sub(1, Ordering::AcqRel) - 1
    }
}
