//! Tree command - print the dependency graph as JSON

use crate::cli::RunOptions;
use crate::config::{self, WorkspaceConfig};
use crate::error::OmniResult;
use crate::graph::DependencyGraph;
use std::path::Path;

/// Build the graph without locking or touching any cache, then print
/// `node id -> [prerequisite ids]` as pretty JSON
pub fn execute(tasks: &[String], options: &RunOptions) -> OmniResult<()> {
    let root = Path::new(".");
    let workspace = WorkspaceConfig::load(root)?;
    let target_configs = config::load_target_configs(root, &workspace, options.target.as_deref())?;

    let mut graph = DependencyGraph::new(target_configs);
    graph.populate(tasks, options.target.as_deref())?;

    println!("{}", serde_json::to_string_pretty(&graph.to_json())?);
    Ok(())
}
