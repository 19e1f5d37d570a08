//! Run statistics shared by all task workers

use crate::error::OmniError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Monotonic counters and collections updated during execution and read
/// once at finalize
pub(crate) struct Metrics {
    hits: AtomicUsize,
    total: AtomicUsize,
    failed: Mutex<HashSet<String>>,
    errors: Mutex<Vec<OmniError>>,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self {
            hits: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            failed: Mutex::new(HashSet::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self, id: &str) {
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
    }

    pub(crate) fn is_failed(&self, id: &str) -> bool {
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    pub(crate) fn record_error(&self, err: OmniError) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(err);
    }

    pub(crate) fn summary(&self) -> RunSummary {
        let mut failed: Vec<String> = self
            .failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        failed.sort();

        let errors = self
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.to_string())
            .collect();

        RunSummary {
            hits: self.hits.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            failed,
            errors,
        }
    }
}

/// Snapshot of a finished run's statistics
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub hits: usize,
    pub total: usize,
    pub failed: Vec<String>,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_hit();
        metrics.record_total();
        metrics.record_total();
        metrics.record_failed("foo:test");
        metrics.record_error(OmniError::NoTasks);

        let summary = metrics.summary();
        assert_eq!(summary.hits, 1);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.failed, vec!["foo:test"]);
        assert_eq!(summary.errors.len(), 1);
    }

    #[test]
    fn failed_set_deduplicates() {
        let metrics = Metrics::new();
        metrics.record_failed("foo:test");
        metrics.record_failed("foo:test");

        assert!(metrics.is_failed("foo:test"));
        assert_eq!(metrics.summary().failed.len(), 1);
    }
}
