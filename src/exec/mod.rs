//! Cache-aware task execution

mod metrics;

pub use metrics::RunSummary;

use crate::cache::{CacheReader, CacheWriter, TaskResult};
use crate::graph::{Node, TaskExecutor};
use crate::ui::{self, OutputSink};
use async_trait::async_trait;
use metrics::Metrics;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

/// Runs task nodes against the cache: hits replay their stored logs,
/// misses spawn a shell and persist the outcome
pub struct Executor {
    reader: Arc<CacheReader>,
    writer: Arc<CacheWriter>,
    sink: Arc<dyn OutputSink>,
    metrics: Metrics,
}

impl Executor {
    pub fn new(
        reader: Arc<CacheReader>,
        writer: Arc<CacheWriter>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            reader,
            writer,
            sink,
            metrics: Metrics::new(),
        }
    }

    /// Statistics snapshot; read after the graph has drained
    pub fn summary(&self) -> RunSummary {
        self.metrics.summary()
    }

    fn has_failed_dependency(&self, deps: &HashSet<String>) -> bool {
        deps.iter().any(|id| self.metrics.is_failed(id))
    }

    async fn execute_inner(&self, node: &Node, deps: &HashSet<String>) -> crate::OmniResult<()> {
        let valid = self.reader.validate(node, deps).await?;

        let result = if valid {
            debug!("cache hit for {}", node.id);
            self.metrics.record_hit();
            self.reader.get_cached_result(&node.dir, &node.name)?
        } else {
            debug!("cache miss for {}", node.id);
            run_task_command(&node.pipeline.command, &self.reader.root().join(&node.dir)).await
        };

        if result.failed {
            self.metrics.record_failed(&node.id);
        }
        if !valid {
            self.writer.write_task_result(&node.dir, &node.name, &result)?;
        }

        let banner = if valid {
            "cache hit, replaying logs..."
        } else {
            "cache miss, executing task..."
        };
        let display = if result.logs.is_empty() {
            banner.to_string()
        } else {
            format!("{banner}\n{}", result.logs)
        };
        self.sink.task_output(&node.id, &display);

        self.metrics.record_total();
        Ok(())
    }
}

#[async_trait]
impl TaskExecutor for Executor {
    async fn execute(&self, node: Arc<Node>, deps: HashSet<String>) {
        // A failed prerequisite silently skips the whole subtree; the
        // node still signals completion so dependents can settle.
        if self.has_failed_dependency(&deps) {
            debug!("skipping {} due to failed dependency", node.id);
            return;
        }

        if let Err(err) = self.execute_inner(&node, &deps).await {
            self.metrics.record_error(err);
        }
    }

    async fn finalize(&self, started: Instant) {
        let spinner = self.writer.needs_update().then(|| {
            println!();
            ui::cache_spinner()
        });

        if let Err(err) = self.writer.finalize().await {
            self.metrics.record_error(err);
        }

        if let Some(spinner) = spinner {
            spinner.finish_with_message("Cache update complete.");
        }

        let summary = self.metrics.summary();
        ui::print_metrics(
            summary.hits,
            summary.total,
            summary.failed.len(),
            started.elapsed(),
        );
        for message in &summary.errors {
            println!();
            ui::error(&message);
        }
    }
}

/// Spawn a shell for the command with the target directory as its
/// working directory, capturing combined output
async fn run_task_command(command: &str, dir: &Path) -> TaskResult {
    let output = if cfg!(windows) {
        Command::new("powershell")
            .args(["-NoProfile", "-Command", command])
            .current_dir(dir)
            .output()
            .await
    } else {
        Command::new("bash")
            .args(["-c", command])
            .current_dir(dir)
            .output()
            .await
    };

    match output {
        Ok(out) => {
            let mut logs = String::from_utf8_lossy(&out.stdout).into_owned();
            logs.push_str(&String::from_utf8_lossy(&out.stderr));
            TaskResult::new(logs.trim_end(), !out.status.success())
        }
        Err(err) => TaskResult::new(format!("failed to spawn shell: {err}"), true),
    }
}
