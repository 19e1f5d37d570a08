//! Task dependency graph construction and topological execution

pub mod node;

pub use node::Node;

use crate::config::{clean_path, PipelineConfig, TargetConfig};
use crate::error::{OmniError, OmniResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;

/// Executes one task instance and finalizes the run once the graph has
/// drained. Implemented by the cache-aware executor; tests substitute
/// their own.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run a single node. `deps` holds the ids of its direct
    /// prerequisites.
    async fn execute(&self, node: Arc<Node>, deps: HashSet<String>);

    /// Called exactly once after every worker has finished
    async fn finalize(&self, started: Instant);
}

/// The graph of task instances for one run
pub struct DependencyGraph {
    nodes: HashMap<String, Arc<Node>>,
    /// Node id to the ids of its prerequisites
    dependencies: HashMap<String, HashSet<String>>,
    target_configs: HashMap<String, TargetConfig>,
}

impl DependencyGraph {
    pub fn new(target_configs: HashMap<String, TargetConfig>) -> Self {
        Self {
            nodes: HashMap::new(),
            dependencies: HashMap::new(),
            target_configs,
        }
    }

    pub fn nodes(&self) -> &HashMap<String, Arc<Node>> {
        &self.nodes
    }

    pub fn dependencies(&self) -> &HashMap<String, HashSet<String>> {
        &self.dependencies
    }

    /// Instantiate nodes for the requested task names.
    ///
    /// Each configured target (or only `filter`, when set) seeds a node
    /// per requested task it defines; `dependsOn` patterns are expanded
    /// recursively, so dependency nodes exist even when their target
    /// was filtered out of the seed set. Cycles are rejected as they
    /// would form.
    pub fn populate(&mut self, tasks: &[String], filter: Option<&str>) -> OmniResult<()> {
        let filter = filter.map(clean_path);
        let mut dirs: Vec<String> = self.target_configs.keys().cloned().collect();
        dirs.sort();

        for dir in dirs {
            if filter.as_deref().is_some_and(|f| f != dir) {
                continue;
            }
            for task in tasks {
                self.populate_task(task, &dir)?;
            }
        }

        self.validate_nodes()
    }

    fn populate_task(&mut self, task: &str, dir: &str) -> OmniResult<()> {
        let Some(pipeline) = self
            .target_configs
            .get(dir)
            .and_then(|cfg| cfg.pipeline.get(task))
            .cloned()
        else {
            // Task names a target doesn't define are skipped silently
            return Ok(());
        };

        let id = format!("{dir}:{task}");
        if self.nodes.contains_key(&id) {
            return Ok(());
        }

        debug!("adding task node {id}");
        self.nodes
            .insert(id.clone(), Arc::new(Node::new(task, dir, pipeline.clone())));
        self.dependencies.entry(id.clone()).or_default();

        self.populate_dependencies(&id, dir, &pipeline)
    }

    fn populate_dependencies(
        &mut self,
        id: &str,
        dir: &str,
        pipeline: &PipelineConfig,
    ) -> OmniResult<()> {
        for pattern in &pipeline.depends_on {
            match pattern.strip_prefix('^') {
                Some(task) => {
                    let dep_dirs: Vec<String> = self
                        .target_configs
                        .get(dir)
                        .map(|cfg| cfg.dependencies.iter().map(|d| clean_path(d)).collect())
                        .unwrap_or_default();
                    for dep_dir in dep_dirs {
                        self.populate_dependency(id, task, &dep_dir)?;
                    }
                }
                None => self.populate_dependency(id, pattern, dir)?,
            }
        }

        Ok(())
    }

    fn populate_dependency(&mut self, prev_id: &str, task: &str, dir: &str) -> OmniResult<()> {
        let Some(cfg) = self.target_configs.get(dir) else {
            return Err(OmniError::UnknownDependencyTarget(dir.to_string()));
        };
        let Some(pipeline) = cfg.pipeline.get(task).cloned() else {
            return Ok(());
        };

        let dep_id = format!("{dir}:{task}");
        let existed = self.nodes.contains_key(&dep_id);
        if !existed {
            self.nodes
                .insert(dep_id.clone(), Arc::new(Node::new(task, dir, pipeline.clone())));
        }
        self.dependencies.entry(dep_id.clone()).or_default();

        let inserted = self
            .dependencies
            .entry(prev_id.to_string())
            .or_default()
            .insert(dep_id.clone());
        if inserted {
            if let Some(prev) = self.nodes.get(prev_id) {
                prev.increment_indegree();
            }
        }

        if let Some(deps) = self.dependencies.get(prev_id) {
            self.check_cycle(prev_id, deps)?;
        }

        if !existed {
            self.populate_dependencies(&dep_id, dir, &pipeline)?;
        }

        Ok(())
    }

    fn check_cycle(&self, origin: &str, deps: &HashSet<String>) -> OmniResult<()> {
        for dep_id in deps {
            if dep_id == origin {
                return Err(OmniError::CircularDependency(origin.to_string()));
            }
            if let Some(transitive) = self.dependencies.get(dep_id) {
                self.check_cycle(origin, transitive)?;
            }
        }

        Ok(())
    }

    fn validate_nodes(&self) -> OmniResult<()> {
        if self.nodes.is_empty() {
            return Err(OmniError::NoTasks);
        }

        for node in self.nodes.values() {
            if node.name.contains(':') {
                return Err(OmniError::BadTaskName(node.name.clone()));
            }
        }

        Ok(())
    }

    /// The dependency map as a JSON object, ids and lists sorted
    pub fn to_json(&self) -> serde_json::Value {
        let mut ids: Vec<&String> = self.dependencies.keys().collect();
        ids.sort();

        let mut map = serde_json::Map::new();
        for id in ids {
            let mut deps: Vec<String> = self.dependencies[id].iter().cloned().collect();
            deps.sort();
            map.insert(id.clone(), serde_json::json!(deps));
        }

        serde_json::Value::Object(map)
    }

    /// Execute every node in topological order with dynamic readiness.
    ///
    /// Nodes with indegree zero spawn immediately; each completion
    /// decrements its dependents' indegrees and spawns any that reach
    /// zero. The completion channel orders a prerequisite's side
    /// effects before its dependents observe them.
    pub async fn execute(self, executor: Arc<dyn TaskExecutor>) {
        let started = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let dependents = self.invert_dependencies();
        let mut workers = JoinSet::new();
        let mut active = 0usize;

        for node in self.nodes.values() {
            if node.indegree() == 0 {
                self.spawn_node(&mut workers, node.clone(), executor.clone(), tx.clone());
                active += 1;
            }
        }

        while active > 0 {
            let Some(id) = rx.recv().await else { break };
            active -= 1;

            let Some(ids) = dependents.get(&id) else {
                continue;
            };
            for dep_id in ids {
                let Some(node) = self.nodes.get(dep_id) else {
                    continue;
                };
                if node.decrement_indegree() == 0 {
                    self.spawn_node(&mut workers, node.clone(), executor.clone(), tx.clone());
                    active += 1;
                }
            }
        }

        drop(tx);
        while workers.join_next().await.is_some() {}

        executor.finalize(started).await;
    }

    fn spawn_node(
        &self,
        workers: &mut JoinSet<()>,
        node: Arc<Node>,
        executor: Arc<dyn TaskExecutor>,
        tx: mpsc::UnboundedSender<String>,
    ) {
        let deps = self.dependencies.get(&node.id).cloned().unwrap_or_default();
        debug!("spawning task {}", node.id);

        workers.spawn(async move {
            let id = node.id.clone();
            executor.execute(node, deps).await;
            let _ = tx.send(id);
        });
    }

    /// Invert prerequisite edges into dependent edges
    fn invert_dependencies(&self) -> HashMap<String, HashSet<String>> {
        let mut dependents: HashMap<String, HashSet<String>> = HashMap::new();

        for (id, deps) in &self.dependencies {
            for dep_id in deps {
                dependents
                    .entry(dep_id.clone())
                    .or_default()
                    .insert(id.clone());
            }
        }

        dependents
    }
}
